//! Configuration for the game sandbox service
//!
//! Environment-driven configuration with defaults and startup validation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main configuration structure for the sandbox service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub scanner: ScannerConfig,
    pub sandbox: SandboxSettings,
    pub reaper: ReaperConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            server: ServerConfig::from_env()?,
            scanner: ScannerConfig::from_env()?,
            sandbox: SandboxSettings::from_env()?,
            reaper: ReaperConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.scanner.validate()?;
        self.sandbox.validate()?;
        self.reaper.validate()?;
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8004".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
            enable_cors: env::var("ENABLE_CORS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8004,
            enable_cors: true,
        }
    }
}

/// Content scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub max_file_size_mb: u64,
}

impl ScannerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_file_size_mb: env::var("SCANNER_MAX_FILE_SIZE_MB")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid SCANNER_MAX_FILE_SIZE_MB")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_mb == 0 {
            anyhow::bail!("Scanner max file size must be greater than 0");
        }
        Ok(())
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { max_file_size_mb: 5 }
    }
}

/// Sandbox provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Fixed lifetime granted at creation; never extended.
    pub ttl_hours: i64,
    pub provision_timeout_seconds: u64,
    pub deploy_timeout_seconds: u64,
    pub container_image: String,
    pub public_url_base: String,
    pub metrics_poll_seconds: u64,
}

impl SandboxSettings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ttl_hours: env::var("SANDBOX_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("Invalid SANDBOX_TTL_HOURS")?,
            provision_timeout_seconds: env::var("SANDBOX_PROVISION_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid SANDBOX_PROVISION_TIMEOUT")?,
            deploy_timeout_seconds: env::var("SANDBOX_DEPLOY_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid SANDBOX_DEPLOY_TIMEOUT")?,
            container_image: env::var("SANDBOX_CONTAINER_IMAGE")
                .unwrap_or_else(|_| "playcade/game-sandbox:latest".to_string()),
            public_url_base: env::var("SANDBOX_PUBLIC_URL_BASE")
                .unwrap_or_else(|_| "https://play.playcade.io".to_string()),
            metrics_poll_seconds: env::var("SANDBOX_METRICS_POLL_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid SANDBOX_METRICS_POLL_SECONDS")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl_hours <= 0 {
            anyhow::bail!("Sandbox TTL must be greater than 0");
        }
        if self.provision_timeout_seconds == 0 || self.deploy_timeout_seconds == 0 {
            anyhow::bail!("Sandbox timeouts must be greater than 0");
        }
        if self.container_image.is_empty() {
            anyhow::bail!("Container image cannot be empty");
        }
        if self.public_url_base.is_empty() {
            anyhow::bail!("Public URL base cannot be empty");
        }
        Ok(())
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_seconds)
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_seconds)
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            provision_timeout_seconds: 60,
            deploy_timeout_seconds: 30,
            container_image: "playcade/game-sandbox:latest".to_string(),
            public_url_base: "https://play.playcade.io".to_string(),
            metrics_poll_seconds: 60,
        }
    }
}

/// Reaper sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    pub sweep_interval_seconds: u64,
    pub idle_minutes: i64,
}

impl ReaperConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            sweep_interval_seconds: env::var("REAPER_SWEEP_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid REAPER_SWEEP_INTERVAL")?,
            idle_minutes: env::var("REAPER_IDLE_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid REAPER_IDLE_MINUTES")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_seconds == 0 {
            anyhow::bail!("Reaper sweep interval must be greater than 0");
        }
        if self.idle_minutes <= 0 {
            anyhow::bail!("Reaper idle threshold must be greater than 0");
        }
        Ok(())
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 300,
            idle_minutes: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
