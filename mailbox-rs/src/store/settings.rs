use serde::Serialize;
use std::collections::HashMap;

use super::SettingsStore;
use crate::error::Result;
use crate::provider::RoutingCredentials;

/// Settings table keys
pub mod keys {
    pub const DOMAIN: &str = "domain";
    pub const DESTINATION_EMAIL: &str = "destination_email";
    pub const CLOUDFLARE_API_KEY: &str = "cloudflare_api_key";
    pub const CLOUDFLARE_ACCOUNT_ID: &str = "cloudflare_account_id";
    pub const CLOUDFLARE_ZONE_ID: &str = "cloudflare_zone_id";
    pub const BREVO_API_KEY: &str = "brevo_api_key";
    pub const SETUP_COMPLETED: &str = "setup_completed";
}

/// Overall setup progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupState {
    Unconfigured,
    PartiallyConfigured,
    Completed,
}

/// Domain routing configuration as stored in the settings table
///
/// Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupConfig {
    pub domain: Option<String>,
    pub destination_email: Option<String>,
    pub cloudflare_api_key: Option<String>,
    pub cloudflare_account_id: Option<String>,
    pub cloudflare_zone_id: Option<String>,
    pub brevo_api_key: Option<String>,
    completed_flag: bool,
}

impl SetupConfig {
    pub async fn load(store: &dyn SettingsStore) -> Result<Self> {
        Ok(Self::from_map(&store.get_all().await?))
    }

    pub fn from_map(settings: &HashMap<String, String>) -> Self {
        let value = |key: &str| {
            settings
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };

        Self {
            domain: value(keys::DOMAIN),
            destination_email: value(keys::DESTINATION_EMAIL),
            cloudflare_api_key: value(keys::CLOUDFLARE_API_KEY),
            cloudflare_account_id: value(keys::CLOUDFLARE_ACCOUNT_ID),
            cloudflare_zone_id: value(keys::CLOUDFLARE_ZONE_ID),
            brevo_api_key: value(keys::BREVO_API_KEY),
            completed_flag: value(keys::SETUP_COMPLETED).as_deref() == Some("true"),
        }
    }

    /// Labels of the required fields that are not set, in a fixed order
    pub fn missing(&self) -> Vec<String> {
        [
            (&self.cloudflare_api_key, "Cloudflare API Key"),
            (&self.cloudflare_account_id, "Cloudflare Account ID"),
            (&self.cloudflare_zone_id, "Cloudflare Zone ID"),
            (&self.brevo_api_key, "Brevo API Key"),
            (&self.domain, "Domain"),
        ]
        .into_iter()
        .filter(|(value, _)| value.is_none())
        .map(|(_, label)| label.to_string())
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// The completed flag only counts while every required field is set
    pub fn is_completed(&self) -> bool {
        self.completed_flag && self.is_complete()
    }

    pub fn routing_configured(&self) -> bool {
        self.cloudflare_api_key.is_some()
            && self.cloudflare_account_id.is_some()
            && self.cloudflare_zone_id.is_some()
    }

    pub fn sending_configured(&self) -> bool {
        self.brevo_api_key.is_some()
    }

    /// Stored routing credentials, if both key and account are set
    pub fn routing_credentials(&self) -> Option<RoutingCredentials> {
        match (&self.cloudflare_api_key, &self.cloudflare_account_id) {
            (Some(api_key), Some(account_id)) => {
                Some(RoutingCredentials::new(api_key.clone(), account_id.clone()))
            }
            _ => None,
        }
    }

    /// Any provider credential stored, routing or sending
    pub fn has_credentials(&self) -> bool {
        self.cloudflare_api_key.is_some()
            || self.cloudflare_account_id.is_some()
            || self.cloudflare_zone_id.is_some()
            || self.brevo_api_key.is_some()
    }

    /// Domain and destination alone do not move setup past `Unconfigured`
    pub fn state(&self) -> SetupState {
        if self.is_completed() {
            SetupState::Completed
        } else if self.has_credentials() {
            SetupState::PartiallyConfigured
        } else {
            SetupState::Unconfigured
        }
    }
}
