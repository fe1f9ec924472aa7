//! Server configuration

use anyhow::bail;

/// Server configuration, loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port
    pub http_port: u16,
    /// Directory holding the database file
    pub data_dir: String,
    /// Environment: development | staging | production
    pub environment: String,
    /// JWT signing secret
    pub jwt_secret: String,
    /// Token lifetime in minutes
    pub jwt_expiration_minutes: i64,
    /// Default commission per order, minor currency units
    pub default_commission_amount: i64,
    /// Default minimum wallet balance to accept orders (may be negative)
    pub default_min_wallet_floor: i64,
}

impl Config {
    /// Require a secret env var: must be set and non-empty outside development
    fn require_secret(name: &str, environment: &str) -> anyhow::Result<String> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    bail!("{name} must be set in {environment} environment");
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            bail!("{name} must not be empty in {environment} environment");
        }
        Ok(val)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        Ok(Self {
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into()),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            jwt_expiration_minutes: std::env::var("JWT_EXPIRATION_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1440),
            default_commission_amount: std::env::var("DEFAULT_COMMISSION_AMOUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5000),
            default_min_wallet_floor: std::env::var("MIN_WALLET_FLOOR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            environment,
        })
    }

    /// Path of the database file
    pub fn db_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("mishwar.redb")
    }
}
