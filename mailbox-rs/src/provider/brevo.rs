//! Brevo sending-provider client
//!
//! Only used to verify an API key before it is stored.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{MailError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.brevo.com/v3";

const PROVIDER: &str = "Brevo";

/// Account owning a sending-provider API key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendingAccount {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SendingProvider: Send + Sync {
    /// Fetch the account behind the API key; fails if the key is rejected
    async fn account(&self) -> Result<SendingAccount>;
}

#[derive(Debug, Deserialize)]
struct BrevoErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct BrevoClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl BrevoClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }
}

#[async_trait]
impl SendingProvider for BrevoClient {
    async fn account(&self) -> Result<SendingAccount> {
        let url = format!("{}/account", self.base_url);
        debug!("Brevo: GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error: Option<BrevoErrorBody> = serde_json::from_slice(&body).ok();
            let message = error
                .as_ref()
                .and_then(|e| e.message.clone())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });

            warn!(
                "Brevo: account request failed with status {} ({})",
                status,
                error.and_then(|e| e.code).unwrap_or_default()
            );

            return Err(MailError::Provider {
                provider: PROVIDER,
                message,
                codes: vec![i64::from(status.as_u16())],
            });
        }

        serde_json::from_slice(&body).map_err(|e| MailError::UnexpectedResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })
    }
}
