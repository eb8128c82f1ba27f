use tracing::Level;
use uuid::Uuid;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub user_id: String,
    pub use_tls: bool,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port_str = std::env::var("SERVER_PORT").unwrap_or_else(|_| "8000".to_string());
        let port = port_str
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue("SERVER_PORT".to_string(), e.to_string()))?;

        let user_id = std::env::var("USER_ID").unwrap_or_else(|_| "console".to_string());

        let use_tls_str = std::env::var("USE_TLS").unwrap_or_else(|_| "false".to_string());
        let use_tls = match use_tls_str.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "USE_TLS".to_string(),
                    format!("'{}' is not a boolean", other),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            host,
            port,
            user_id,
            use_tls,
            log_level,
        })
    }

    /// The channel URL for one session, derived from the configured endpoint
    /// and the session identifiers.
    pub fn ws_url(&self, session_id: Uuid) -> String {
        let scheme = if self.use_tls { "wss" } else { "ws" };
        format!(
            "{}://{}:{}/ws/{}/{}",
            scheme, self.host, self.port, self.user_id, session_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("SERVER_HOST");
            env::remove_var("SERVER_PORT");
            env::remove_var("USER_ID");
            env::remove_var("USE_TLS");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert_eq!(config.user_id, "console");
        assert!(!config.use_tls);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_HOST", "chat.example.com");
            env::set_var("SERVER_PORT", "9443");
            env::set_var("USER_ID", "alice");
            env::set_var("USE_TLS", "true");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.host, "chat.example.com");
        assert_eq!(config.port, 9443);
        assert_eq!(config.user_id, "alice");
        assert!(config.use_tls);
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_invalid_port() {
        clear_env_vars();
        unsafe {
            env::set_var("SERVER_PORT", "not-a-port");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SERVER_PORT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_tls_flag() {
        clear_env_vars();
        unsafe {
            env::set_var("USE_TLS", "maybe");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "USE_TLS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_ws_url_shape() {
        clear_env_vars();
        let config = Config::from_env().unwrap();
        let session_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();

        assert_eq!(
            config.ws_url(session_id),
            "ws://127.0.0.1:8000/ws/console/550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    #[serial]
    fn test_ws_url_tls_scheme() {
        clear_env_vars();
        unsafe {
            env::set_var("USE_TLS", "yes");
        }
        let config = Config::from_env().unwrap();
        assert!(config.ws_url(Uuid::nil()).starts_with("wss://"));
    }
}
