//! Cloudflare zone and Email Routing client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{
    CatchAllAction, CatchAllUpdate, DestinationAddress, Envelope, NewRule, RoutingCredentials,
    RoutingRule, RoutingSettings, Zone, CATCH_ALL_RULE_ID,
};
use crate::error::{MailError, Result};
use crate::utils::normalize_domain;

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

const PROVIDER: &str = "Cloudflare";

/// Zone, DNS and email-routing operations of the routing provider
///
/// Every call is a single request: nothing is retried.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Zone whose name is exactly `domain`, if the account has one
    async fn find_zone_by_domain(&self, domain: &str) -> Result<Option<Zone>>;

    async fn create_zone(&self, domain: &str) -> Result<Zone>;

    /// Existing zone for `domain`, or a newly created one
    async fn ensure_zone(&self, domain: &str) -> Result<Zone> {
        if let Some(zone) = self.find_zone_by_domain(domain).await? {
            debug!("Zone for {} already exists: {}", domain, zone.id);
            return Ok(zone);
        }

        self.create_zone(domain).await
    }

    async fn routing_settings(&self, zone_id: &str) -> Result<RoutingSettings>;

    async fn enable_routing(&self, zone_id: &str) -> Result<RoutingSettings>;

    async fn disable_routing(&self, zone_id: &str) -> Result<RoutingSettings>;

    /// DNS records the zone needs for routing, passed through as returned
    async fn routing_dns_records(&self, zone_id: &str) -> Result<Vec<serde_json::Value>>;

    async fn list_rules(&self, zone_id: &str) -> Result<Vec<RoutingRule>>;

    async fn create_rule(&self, zone_id: &str, rule: &NewRule) -> Result<RoutingRule>;

    async fn delete_rule(&self, zone_id: &str, rule_id: &str) -> Result<()>;

    async fn catch_all_rule(&self, zone_id: &str) -> Result<RoutingRule>;

    /// Overwrite the zone's catch-all rule
    async fn set_catch_all_rule(&self, zone_id: &str, action: &CatchAllAction)
        -> Result<RoutingRule>;

    async fn list_destination_addresses(&self) -> Result<Vec<DestinationAddress>>;

    /// Register a forwarding target; the provider mails the owner a
    /// verification link
    async fn create_destination_address(&self, email: &str) -> Result<DestinationAddress>;

    async fn delete_destination_address(&self, address_id: &str) -> Result<()>;

    /// Existing destination for `email`, or a newly created one
    async fn ensure_destination_address(&self, email: &str) -> Result<DestinationAddress> {
        let existing = self
            .list_destination_addresses()
            .await?
            .into_iter()
            .find(|d| d.email.eq_ignore_ascii_case(email));

        match existing {
            Some(address) => {
                if !address.is_verified() {
                    warn!(
                        "Destination address {} exists but is not verified, forwarding stays inactive until the owner confirms it",
                        email
                    );
                }
                Ok(address)
            }
            None => {
                let address = self.create_destination_address(email).await?;
                info!("Created destination address {} ({})", email, address.id);
                Ok(address)
            }
        }
    }
}

/// reqwest client for the Cloudflare v4 API
pub struct CloudflareClient {
    base_url: String,
    credentials: RoutingCredentials,
    client: Client,
}

impl CloudflareClient {
    pub fn new(credentials: RoutingCredentials) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
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

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn account_path(&self, suffix: &str) -> String {
        self.url(&format!(
            "/accounts/{}/email/routing/addresses{}",
            self.credentials.account_id, suffix
        ))
    }

    fn routing_path(&self, zone_id: &str, suffix: &str) -> String {
        self.url(&format!("/zones/{}/email/routing{}", zone_id, suffix))
    }

    /// Send an authenticated request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = request
            .bearer_auth(&self.credentials.api_key)
            .send()
            .await?;

        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.bytes().await?;

        debug!("Cloudflare {} -> {}", url, status);

        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|e| MailError::UnexpectedResponse {
                provider: PROVIDER,
                detail: format!("HTTP {} from {}: {}", status, url, e),
            })?;

        envelope.into_result(PROVIDER).map_err(|e| {
            warn!("Cloudflare request to {} failed: {}", url, e);
            e
        })
    }

    /// Like [`send`](Self::send), but the envelope must carry a result
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .ok_or_else(|| MailError::UnexpectedResponse {
                provider: PROVIDER,
                detail: "response has no result".to_string(),
            })
    }
}

#[async_trait]
impl RoutingProvider for CloudflareClient {
    async fn find_zone_by_domain(&self, domain: &str) -> Result<Option<Zone>> {
        let domain = normalize_domain(domain);
        let zones: Vec<Zone> = self
            .send(self.client.get(self.url("/zones")).query(&[("name", domain.as_str())]))
            .await?
            .unwrap_or_default();

        Ok(zones
            .into_iter()
            .find(|z| normalize_domain(&z.name) == domain))
    }

    async fn create_zone(&self, domain: &str) -> Result<Zone> {
        let body = json!({
            "name": normalize_domain(domain),
            "account": { "id": self.credentials.account_id },
            "jump_start": true,
            "type": "full",
        });

        let zone: Zone = self
            .fetch(self.client.post(self.url("/zones")).json(&body))
            .await?;

        info!("Created zone {} for {} ({})", zone.id, zone.name, zone.status);
        Ok(zone)
    }

    async fn routing_settings(&self, zone_id: &str) -> Result<RoutingSettings> {
        self.fetch(self.client.get(self.routing_path(zone_id, ""))).await
    }

    async fn enable_routing(&self, zone_id: &str) -> Result<RoutingSettings> {
        self.fetch(self.client.post(self.routing_path(zone_id, "/enable")).json(&json!({})))
            .await
    }

    async fn disable_routing(&self, zone_id: &str) -> Result<RoutingSettings> {
        self.fetch(self.client.post(self.routing_path(zone_id, "/disable")).json(&json!({})))
            .await
    }

    async fn routing_dns_records(&self, zone_id: &str) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .send(self.client.get(self.routing_path(zone_id, "/dns")))
            .await?
            .unwrap_or_default())
    }

    async fn list_rules(&self, zone_id: &str) -> Result<Vec<RoutingRule>> {
        Ok(self
            .send(self.client.get(self.routing_path(zone_id, "/rules")))
            .await?
            .unwrap_or_default())
    }

    async fn create_rule(&self, zone_id: &str, rule: &NewRule) -> Result<RoutingRule> {
        self.fetch(self.client.post(self.routing_path(zone_id, "/rules")).json(rule))
            .await
    }

    async fn delete_rule(&self, zone_id: &str, rule_id: &str) -> Result<()> {
        self.send::<serde_json::Value>(
            self.client
                .delete(self.routing_path(zone_id, &format!("/rules/{}", rule_id))),
        )
        .await?;
        Ok(())
    }

    async fn catch_all_rule(&self, zone_id: &str) -> Result<RoutingRule> {
        self.fetch(
            self.client
                .get(self.routing_path(zone_id, &format!("/rules/{}", CATCH_ALL_RULE_ID))),
        )
        .await
    }

    async fn set_catch_all_rule(
        &self,
        zone_id: &str,
        action: &CatchAllAction,
    ) -> Result<RoutingRule> {
        debug!("Setting catch-all rule for zone {} to {:?}", zone_id, action);

        self.fetch(
            self.client
                .put(self.routing_path(zone_id, &format!("/rules/{}", CATCH_ALL_RULE_ID)))
                .json(&CatchAllUpdate::from(action)),
        )
        .await
    }

    async fn list_destination_addresses(&self) -> Result<Vec<DestinationAddress>> {
        Ok(self
            .send(self.client.get(self.account_path("")))
            .await?
            .unwrap_or_default())
    }

    async fn create_destination_address(&self, email: &str) -> Result<DestinationAddress> {
        self.fetch(
            self.client
                .post(self.account_path(""))
                .json(&json!({ "email": email })),
        )
        .await
    }

    async fn delete_destination_address(&self, address_id: &str) -> Result<()> {
        self.send::<serde_json::Value>(
            self.client
                .delete(self.account_path(&format!("/{}", address_id))),
        )
        .await?;
        Ok(())
    }
}
