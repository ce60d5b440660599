/// Configuration management for the autowire server
/// 
/// Handles server bind address and log verbosity.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Maximum level emitted: "error", "warn", "info", "debug" or "trace"
    pub level: String,
}

impl LoggingConfig {
    /// Parsed level, falling back to INFO for anything unrecognised
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("AUTOWIRE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("AUTOWIRE_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            logging: LoggingConfig {
                level: std::env::var("AUTOWIRE_LOG").unwrap_or_else(|_| "info".to_string()),
            },
        }
    }
}
