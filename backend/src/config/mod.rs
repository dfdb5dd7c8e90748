//! Configuration module for the Bamboo Forest backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key the upstream gateway must send (required in production)
    pub api_psk: Option<String>,
    /// Separate key for administrative endpoints such as verification
    pub admin_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AddrParseError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("BAMBOO_API_PSK").ok().filter(|k| !k.is_empty());
        let admin_psk = env::var("BAMBOO_ADMIN_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("BAMBOO_DB_PATH")
            .unwrap_or_else(|_| "./data/bamboo.sqlite".to_string())
            .into();

        let bind_addr = env::var("BAMBOO_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = env::var("BAMBOO_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("BAMBOO_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Self {
            api_psk,
            admin_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("BAMBOO_API_PSK");
        env::remove_var("BAMBOO_ADMIN_PSK");
        env::remove_var("BAMBOO_DB_PATH");
        env::remove_var("BAMBOO_BIND_ADDR");
        env::remove_var("BAMBOO_LOG_LEVEL");
        env::remove_var("BAMBOO_LOG_FORMAT");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert!(config.admin_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/bamboo.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
    }
}
