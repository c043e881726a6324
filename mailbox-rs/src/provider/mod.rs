//! External provider clients
//!
//! - [`cloudflare`]: zones and email routing (where inbound mail is sent)
//! - [`brevo`]: sending-provider key verification

pub mod brevo;
pub mod cloudflare;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BrevoConfig, CloudflareConfig};
use crate::error::Result;

pub use brevo::{BrevoClient, SendingAccount, SendingProvider};
pub use cloudflare::{CloudflareClient, RoutingProvider};
#[cfg(test)]
pub use brevo::MockSendingProvider;
pub use types::{
    CatchAllAction, DestinationAddress, NewRule, RoutingCredentials, RoutingRule,
    RoutingSettings, Zone, CATCH_ALL_RULE_ID,
};

/// Builds a routing provider for a set of credentials
///
/// Credentials are supplied per request (setup) or read from the settings
/// table (repair), so clients are created on demand.
pub trait RoutingConnector: Send + Sync {
    fn connect(&self, credentials: &RoutingCredentials) -> Result<Arc<dyn RoutingProvider>>;
}

impl<F> RoutingConnector for F
where
    F: Fn(&RoutingCredentials) -> Result<Arc<dyn RoutingProvider>> + Send + Sync,
{
    fn connect(&self, credentials: &RoutingCredentials) -> Result<Arc<dyn RoutingProvider>> {
        self(credentials)
    }
}

/// Builds a sending provider for an API key
pub trait SendingConnector: Send + Sync {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn SendingProvider>>;
}

impl<F> SendingConnector for F
where
    F: Fn(&str) -> Result<Arc<dyn SendingProvider>> + Send + Sync,
{
    fn connect(&self, api_key: &str) -> Result<Arc<dyn SendingProvider>> {
        self(api_key)
    }
}

/// Connects [`CloudflareClient`]s using the configured endpoint and timeout
pub struct CloudflareConnector {
    base_url: String,
    timeout: Duration,
}

impl CloudflareConnector {
    pub fn new(config: &CloudflareConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

impl RoutingConnector for CloudflareConnector {
    fn connect(&self, credentials: &RoutingCredentials) -> Result<Arc<dyn RoutingProvider>> {
        let client = CloudflareClient::new(credentials.clone())
            .with_base_url(&self.base_url)
            .with_timeout(self.timeout)?;
        Ok(Arc::new(client))
    }
}

/// Connects [`BrevoClient`]s using the configured endpoint and timeout
pub struct BrevoConnector {
    base_url: String,
    timeout: Duration,
}

impl BrevoConnector {
    pub fn new(config: &BrevoConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

impl SendingConnector for BrevoConnector {
    fn connect(&self, api_key: &str) -> Result<Arc<dyn SendingProvider>> {
        let client = BrevoClient::new(api_key)
            .with_base_url(&self.base_url)
            .with_timeout(self.timeout)?;
        Ok(Arc::new(client))
    }
}
