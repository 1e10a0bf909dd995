pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

use axum::Router;
use log::info;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{EngineError, EngineResult};

// Export logic types
pub use logic::{
    BatchExecutor, BindingPipeline, EngineSettings, EntityEngine, EntityPolicy, IdentityResolver,
    OpenPolicy, QueryFacade, RevisionDiffEngine, SharedServices, TokenGuard, ValidationRuleCompiler,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use crate::config::AppConfig;
use crate::domain::DomainStore;

/// Mount the demo entities over `store`, seeding it first when configured.
pub async fn build_app<S: DomainStore>(store: Arc<S>, config: &AppConfig) -> anyhow::Result<Router> {
    if config.engine.load_seed_data {
        info!("Loading seed data...");
        seed::load_seed_data(&*store).await?;
    }

    let shared = SharedServices {
        settings: config.engine_settings(),
        tokens: Arc::new(config.token_guard()),
        ..SharedServices::default()
    };
    let app = routes::create_router(store, shared)?;

    if config.server.cors_permissive {
        Ok(app.layer(ServiceBuilder::new().layer(CorsLayer::permissive())))
    } else {
        Ok(app)
    }
}

/// Build the application on PostgreSQL when a connection string is
/// configured, otherwise on a fresh in-memory store.
pub async fn build_configured_app(config: &AppConfig) -> anyhow::Result<Router> {
    match config.database_url() {
        Some(database_url) => {
            info!("Connecting to PostgreSQL...");
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;
            store.migrate().await?;
            build_app(Arc::new(store), config).await
        }
        None => {
            info!("No database configured, using the in-memory store");
            build_app(Arc::new(MemoryStore::new()), config).await
        }
    }
}
