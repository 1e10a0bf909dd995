use axum::serve;
use entity_admin_rust::build_configured_app;
use entity_admin_rust::config::AppConfig;
use log::info;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)      // Default to Info for everything
        .filter_module("sqlx", LevelFilter::Warn)  // Suppress sqlx Debug logs
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    let app = build_configured_app(&config).await?;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    info!("Entity admin server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
