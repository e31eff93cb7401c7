use bigdecimal::BigDecimal;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Defaults used when a matching request leaves tolerances unspecified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub amount_tolerance: BigDecimal,
    pub date_tolerance_days: i64,
    pub auto_match_min_confidence: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: BigDecimal::from(1) / BigDecimal::from(100),
            date_tolerance_days: 3,
            auto_match_min_confidence: 0.90,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/hesaab".to_string(),
                max_connections: 20,
            },
            matching: MatchingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then `SECTION__KEY` environment variables, then the legacy
    /// `DATABASE_URL` / `SERVER_HOST` / `SERVER_PORT` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("database.url", defaults.database.url)?
            .set_default(
                "database.max_connections",
                i64::from(defaults.database.max_connections),
            )?
            .set_default(
                "matching.amount_tolerance",
                defaults.matching.amount_tolerance.to_string(),
            )?
            .set_default(
                "matching.date_tolerance_days",
                defaults.matching.date_tolerance_days,
            )?
            .set_default(
                "matching.auto_match_min_confidence",
                defaults.matching.auto_match_min_confidence,
            )?
            .add_source(Environment::default().separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option(
                "server.port",
                std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse::<i64>().ok()),
            )?
            .build()?;

        settings.try_deserialize()
    }
}
