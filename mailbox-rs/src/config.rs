use crate::error::{MailError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `MAILBOX__SMTP__LISTEN_ADDR`.
const ENV_PREFIX: &str = "MAILBOX";

/// Largest attachment stored at intake (5 MiB).
pub const DEFAULT_MAX_ATTACHMENT_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub smtp: SmtpConfig,
    pub storage: StorageConfig,
    pub intake: IntakeConfig,
    pub relay: RelayConfig,
    pub cloudflare: CloudflareConfig,
    pub brevo: BrevoConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub hostname: String,
    pub api_listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub max_message_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntakeConfig {
    pub max_attachment_size: usize,
}

/// Smarthost used to forward a received message to the destination address
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    pub smarthost: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CloudflareConfig {
    pub base_url: String,
    /// Name of the worker the catch-all rule routes to
    pub worker_name: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrevoConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Config {
    /// Load configuration: defaults, then the optional TOML file, then
    /// `MAILBOX__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(MailError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(::config::File::from(path));
        }

        let config: Config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MailError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.smtp.max_message_size == 0 {
            return Err(MailError::Config(
                "smtp.max_message_size must be greater than zero".to_string(),
            ));
        }

        if self.intake.max_attachment_size == 0 {
            return Err(MailError::Config(
                "intake.max_attachment_size must be greater than zero".to_string(),
            ));
        }

        if self.relay.smarthost.trim().is_empty() {
            return Err(MailError::Config("relay.smarthost is empty".to_string()));
        }

        for (name, url) in [
            ("cloudflare.base_url", &self.cloudflare.base_url),
            ("brevo.base_url", &self.brevo.base_url),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| MailError::Config(format!("Invalid {} '{}': {}", name, url, e)))?;
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(MailError::Config(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                hostname: "mail.localhost".to_string(),
                api_listen_addr: "127.0.0.1:8787".to_string(),
            },
            smtp: SmtpConfig {
                enabled: true,
                listen_addr: "0.0.0.0:2525".to_string(),
                max_message_size: 25 * 1024 * 1024, // 25MB
            },
            storage: StorageConfig {
                database_url: "sqlite://mailbox.db?mode=rwc".to_string(),
            },
            intake: IntakeConfig {
                max_attachment_size: DEFAULT_MAX_ATTACHMENT_SIZE,
            },
            relay: RelayConfig {
                smarthost: "127.0.0.1:25".to_string(),
            },
            cloudflare: CloudflareConfig {
                base_url: "https://api.cloudflare.com/client/v4".to_string(),
                worker_name: "mailbox".to_string(),
                timeout_seconds: 30,
            },
            brevo: BrevoConfig {
                base_url: "https://api.brevo.com/v3".to_string(),
                timeout_seconds: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
