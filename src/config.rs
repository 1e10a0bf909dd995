use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::logic::token_guard::{DEFAULT_SESSION_IDLE, DEFAULT_SESSION_LIMIT};
use crate::logic::{EngineSettings, TokenGuard};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Answer cross-origin requests from any origin.
    pub cors_permissive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub load_seed_data: bool,
    /// Sessions the duplicate-submission guard tracks at once.
    pub token_session_limit: usize,
    pub token_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            cors_permissive: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            max_connections: Some(20),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let settings = EngineSettings::default();
        Self {
            default_page_size: settings.default_page_size,
            max_page_size: settings.max_page_size,
            load_seed_data: false,
            token_session_limit: DEFAULT_SESSION_LIMIT,
            token_idle_secs: DEFAULT_SESSION_IDLE.as_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "ADMIN_"
        config = config.add_source(
            config::Environment::with_prefix("ADMIN")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Connection string from config, then `DATABASE_URL`. `None` selects
    /// the in-memory store.
    pub fn database_url(&self) -> Option<String> {
        if let Some(connection_string) = &self.database.connection_string {
            if !connection_string.trim().is_empty() {
                return Some(connection_string.clone());
            }
        }

        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
    }

    pub fn max_connections(&self) -> u32 {
        self.database.max_connections.unwrap_or(20)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            default_page_size: self.engine.default_page_size.max(1),
            max_page_size: self.engine.max_page_size.max(self.engine.default_page_size.max(1)),
        }
    }

    pub fn token_guard(&self) -> TokenGuard {
        TokenGuard::with_limits(
            self.engine.token_session_limit,
            Duration::from_secs(self.engine.token_idle_secs),
        )
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_settings() {
        let config = AppConfig::default();
        let settings = config.engine_settings();
        assert_eq!(settings.default_page_size, 20);
        assert_eq!(settings.max_page_size, 500);
        assert_eq!(config.server_address(), "127.0.0.1:3001");
        assert!(!config.engine.load_seed_data);
        assert_eq!(config.engine.token_session_limit, 10_000);
        assert_eq!(config.engine.token_idle_secs, 1800);
    }

    #[test]
    fn page_bounds_are_kept_consistent() {
        let mut config = AppConfig::default();
        config.engine.default_page_size = 0;
        config.engine.max_page_size = 0;
        let settings = config.engine_settings();
        assert_eq!(settings.default_page_size, 1);
        assert_eq!(settings.max_page_size, 1);
    }
}
