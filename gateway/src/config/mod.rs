//! Configuration module for the voicelist gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Example
//! ```rust,no_run
//! use voicelist_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroize;

use crate::core::upstream::gemini::{DEFAULT_GEMINI_MODEL, GEMINI_LIVE_URL, GeminiConfig};

mod yaml;

pub use yaml::{SecurityYaml, ServerYaml, TlsYaml, UpstreamYaml, YamlConfig};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    ReadFile(String),

    #[error("{0}")]
    InvalidYaml(String),

    #[error("Invalid PORT value '{0}': must be a number between 0 and 65535")]
    InvalidPort(String),

    #[error("TLS requires both TLS_CERT_PATH and TLS_KEY_PATH")]
    IncompleteTls,

    #[error("GEMINI_API_KEY is required")]
    MissingApiKey,
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// TLS configuration; `None` serves plain HTTP
    pub tls: Option<TlsConfig>,

    /// Key for the upstream streaming API
    pub gemini_api_key: String,
    /// Upstream WebSocket endpoint
    pub upstream_url: String,
    /// Model declared in the upstream handshake
    pub upstream_model: String,
    /// Overrides the built-in system instruction
    pub system_instruction: Option<String>,

    /// `*` or a comma-separated list; `None` allows same-origin only
    pub cors_allowed_origins: Option<String>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("gemini_api_key", &"<redacted>")
            .field("upstream_url", &self.upstream_url)
            .field("upstream_model", &self.upstream_model)
            .field("system_instruction", &self.system_instruction.is_some())
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

/// Zeroize the API key when the config is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        self.gemini_api_key.zeroize();
    }
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ServerConfig {
    /// Configuration with defaults for everything but the API key.
    pub fn new(gemini_api_key: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            gemini_api_key: gemini_api_key.into(),
            upstream_url: GEMINI_LIVE_URL.to_string(),
            upstream_model: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: None,
            cors_allowed_origins: None,
        }
    }

    /// Load configuration from environment variables
    ///
    /// The .env file is loaded in main.rs at application startup, so its
    /// values are already visible here as environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        Self::load(Some(yaml_config))
    }

    fn load(yaml: Option<YamlConfig>) -> Result<Self, ConfigError> {
        let yaml = yaml.unwrap_or_default();
        let server = yaml.server.unwrap_or_default();
        let tls_yaml = server.tls.unwrap_or_default();
        let upstream = yaml.upstream.unwrap_or_default();
        let security = yaml.security.unwrap_or_default();

        let port = match server.port {
            Some(port) => port,
            None => match env_var("PORT") {
                Some(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
                None => DEFAULT_PORT,
            },
        };

        let cert_path = tls_yaml.cert_path.or_else(|| env_var("TLS_CERT_PATH"));
        let key_path = tls_yaml.key_path.or_else(|| env_var("TLS_KEY_PATH"));
        let tls = match (cert_path, key_path) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let gemini_api_key = upstream
            .api_key
            .filter(|k| !k.is_empty())
            .or_else(|| env_var("GEMINI_API_KEY"))
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = Self::new(gemini_api_key);
        config.port = port;
        config.tls = tls;
        if let Some(host) = server.host.or_else(|| env_var("HOST")) {
            config.host = host;
        }
        if let Some(url) = upstream.url.or_else(|| env_var("UPSTREAM_URL")) {
            config.upstream_url = url;
        }
        if let Some(model) = upstream.model.or_else(|| env_var("UPSTREAM_MODEL")) {
            config.upstream_model = model;
        }
        config.system_instruction = upstream
            .system_instruction
            .or_else(|| env_var("UPSTREAM_SYSTEM_INSTRUCTION"));
        config.cors_allowed_origins = security
            .cors_allowed_origins
            .or_else(|| env_var("CORS_ALLOWED_ORIGINS"));

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Whether an upstream API key is present
    pub fn has_upstream_credentials(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }

    /// Connection settings for the upstream transport
    pub fn gemini_config(&self) -> GeminiConfig {
        let mut config = GeminiConfig::new(self.gemini_api_key.clone());
        config.url = self.upstream_url.clone();
        config.model = self.upstream_model.clone();
        if let Some(instruction) = &self.system_instruction {
            config.system_instruction = instruction.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "HOST",
        "PORT",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "GEMINI_API_KEY",
        "UPSTREAM_URL",
        "UPSTREAM_MODEL",
        "UPSTREAM_SYSTEM_INSTRUCTION",
        "CORS_ALLOWED_ORIGINS",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        for name in ENV_VARS {
            unsafe {
                env::remove_var(name);
            }
        }
    }

    #[test]
    fn test_new_defaults() {
        let config = ServerConfig::new("key");
        assert_eq!(config.address(), "0.0.0.0:8000");
        assert!(!config.is_tls_enabled());
        assert!(config.has_upstream_credentials());
        assert_eq!(config.upstream_model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = ServerConfig::new("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_gemini_config_carries_overrides() {
        let mut config = ServerConfig::new("key");
        config.upstream_model = "models/other".to_string();
        config.system_instruction = Some("Only fruit".to_string());

        let gemini = config.gemini_config();
        assert_eq!(gemini.api_key, "key");
        assert_eq!(gemini.model, "models/other");
        assert_eq!(gemini.system_instruction, "Only fruit");
        assert_eq!(gemini.url, GEMINI_LIVE_URL);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "env-key");
            env::set_var("PORT", "9100");
            env::set_var("CORS_ALLOWED_ORIGINS", "*");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.gemini_api_key, "env-key");
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.cors_allowed_origins.as_deref(), Some("*"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_key() {
        cleanup_env_vars();
        let result = ServerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::MissingApiKey)));
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        cleanup_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "env-key");
            env::set_var("PORT", "eighty");
        }

        let result = ServerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidPort(p)) if p == "eighty"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_half_tls() {
        cleanup_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "env-key");
            env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
        }

        let result = ServerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::IncompleteTls)));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  tls:
    cert_path: "/tmp/cert.pem"
    key_path: "/tmp/key.pem"

upstream:
  api_key: "yaml-key"
  model: "models/yaml-model"
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.gemini_api_key, "yaml-key");
        assert_eq!(config.upstream_model, "models/yaml-model");
        assert_eq!(
            config.tls,
            Some(TlsConfig {
                cert_path: PathBuf::from("/tmp/cert.pem"),
                key_path: PathBuf::from("/tmp/key.pem"),
            })
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "server:\n  host: \"127.0.0.1\"\nupstream:\n  api_key: \"yaml-key\"\n",
        )
        .unwrap();

        unsafe {
            env::set_var("HOST", "10.0.0.1");
            env::set_var("PORT", "9200");
            env::set_var("GEMINI_API_KEY", "env-key");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.gemini_api_key, "yaml-key");
        // Not in YAML, so ENV wins over the default
        assert_eq!(config.port, 9200);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();
        let result = ServerConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadFile(_))));
    }
}
