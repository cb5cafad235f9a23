//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    pub gate: GateConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a multipart upload, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

/// Shared-secret authentication. Disabled when no key is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Admission control for the resource gate
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GateConfig {
    /// Tickets allowed to wait behind the running one
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    /// Deadline applied to every ticket, measured from arrival
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_queue_depth() -> usize {
    16
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl GateConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Synthesis engine worker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_engine_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_load_poll_interval_secs")]
    pub load_poll_interval_secs: u64,
    #[serde(default = "default_load_max_attempts")]
    pub load_max_attempts: u32,
}

fn default_engine_endpoint() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_model_dir() -> String {
    "/mnt/models".to_string()
}

fn default_device() -> String {
    "cuda".to_string()
}

fn default_engine_timeout_secs() -> u64 {
    900
}

fn default_load_poll_interval_secs() -> u64 {
    5
}

fn default_load_max_attempts() -> u32 {
    120
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_str().ok_or_else(|| {
            AppError::Config(config::ConfigError::Message(
                "Configuration path is not valid UTF-8".to_string(),
            ))
        })?;

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("server.max_body_bytes", default_max_body_bytes() as i64)?
            .set_default("gate.max_queue_depth", default_max_queue_depth() as i64)?
            .set_default("gate.request_timeout_secs", default_request_timeout_secs() as i64)?
            .set_default("engine.endpoint", default_engine_endpoint())?
            .set_default("engine.model_dir", default_model_dir())?
            .set_default("engine.device", default_device())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            // Load from configuration file
            .add_source(File::with_name(path).required(false))
            // Override with environment variables (prefixed with IMAGE_EDIT_)
            .add_source(
                Environment::with_prefix("IMAGE_EDIT")
                    .separator("__")
                    .try_parsing(true),
            )
            // Flat variables understood by existing deployments
            .set_override_option("server.host", std::env::var("HOST").ok())?
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .set_override_option("logging.level", std::env::var("LOG_LEVEL").ok())?
            .set_override_option("engine.model_dir", std::env::var("QWEN_MODEL_DIR").ok())?
            .set_override_option("engine.device", std::env::var("DEVICE").ok())?
            .set_override_option("auth.api_key", std::env::var("API_KEY").ok())?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(config_error("Server port cannot be 0"));
        }
        if self.gate.max_queue_depth == 0 {
            return Err(config_error("gate.max_queue_depth must be at least 1"));
        }
        if self.gate.request_timeout_secs == 0 {
            return Err(config_error("gate.request_timeout_secs must be at least 1"));
        }
        if self.engine.endpoint.trim().is_empty() {
            return Err(config_error("engine.endpoint cannot be empty"));
        }
        if matches!(&self.auth.api_key, Some(key) if key.is_empty()) {
            return Err(config_error(
                "auth.api_key is set but empty; unset it to disable authentication",
            ));
        }

        Ok(())
    }
}

fn config_error(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                max_body_bytes: default_max_body_bytes(),
            },
            auth: AuthConfig::default(),
            gate: GateConfig {
                max_queue_depth: default_max_queue_depth(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            engine: EngineConfig {
                endpoint: default_engine_endpoint(),
                model_dir: default_model_dir(),
                device: default_device(),
                timeout_secs: default_engine_timeout_secs(),
                load_poll_interval_secs: default_load_poll_interval_secs(),
                load_max_attempts: default_load_max_attempts(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}
