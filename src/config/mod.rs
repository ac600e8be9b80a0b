// Configuration module entry point
// Loads server, logging, performance and HTTP settings

mod types;

use std::net::SocketAddr;
use std::path::PathBuf;

// Re-export public types
pub use types::{Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

type Builder = config::ConfigBuilder<config::builder::DefaultState>;

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SERVER"));

        with_defaults(builder)?.build()?.try_deserialize()
    }

    /// Load configuration from the default `config` file
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Build configuration from an inline TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));

        with_defaults(builder)?.build()?.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

impl HttpConfig {
    /// Directory multipart uploads are spooled into
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .as_ref()
            .map_or_else(std::env::temp_dir, PathBuf::from)
    }
}

fn with_defaults(builder: Builder) -> Result<Builder, config::ConfigError> {
    builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 3000)?
        .set_default("logging.level", "info")?
        .set_default("logging.access_log", true)?
        .set_default("performance.keep_alive_timeout", 75)?
        .set_default("performance.read_timeout", 30)?
        .set_default("performance.write_timeout", 30)?
        .set_default("http.server_name", "expressway/0.1")?
        .set_default("http.max_body_size", 10_485_760)? // 10MB
        .set_default("http.debug_mode", false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 3000);
        assert!(cfg.logging.access_log);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert_eq!(cfg.http.max_body_size, 10_485_760);
        assert!(!cfg.http.debug_mode);
        assert!(cfg.performance.max_connections.is_none());
    }

    #[test]
    fn test_missing_default_file_is_optional() {
        let cfg = Config::load().unwrap();
        assert!(cfg.get_socket_addr().is_ok());
        assert_eq!(cfg.logging.access_log_format, "combined");
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_toml_str(
            r#"
            [server]
            port = 8081
            workers = 2

            [http]
            debug_mode = true
            upload_dir = "/tmp/uploads"

            [performance]
            max_connections = 64
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 8081);
        assert_eq!(cfg.server.workers, Some(2));
        assert!(cfg.http.debug_mode);
        assert_eq!(cfg.http.upload_dir(), PathBuf::from("/tmp/uploads"));
        assert_eq!(cfg.performance.max_connections, Some(64));
    }

    #[test]
    fn test_socket_addr() {
        let cfg = Config::from_toml_str("[server]\nhost = \"0.0.0.0\"\nport = 9000").unwrap();
        assert_eq!(cfg.get_socket_addr().unwrap().port(), 9000);

        let cfg = Config::from_toml_str("[server]\nhost = \"not a host\"").unwrap();
        assert!(cfg.get_socket_addr().is_err());
    }
}
