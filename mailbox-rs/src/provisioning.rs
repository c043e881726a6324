//! Domain provisioning workflow
//!
//! Configures the routing provider so that mail for a domain is delivered
//! to this system, records the resulting credentials, and tracks the
//! overall setup state.
//!
//! Every step is idempotent, so a failed run is repaired by running it
//! again. Already applied steps are never rolled back.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{MailError, Result};
use crate::provider::{
    CatchAllAction, RoutingConnector, RoutingCredentials, RoutingRule, SendingConnector,
    CATCH_ALL_RULE_ID,
};
use crate::store::{keys, SettingsStore, SetupConfig, SetupState};
use crate::utils::{normalize_domain, validate_domain, validate_email};

/// A step of [`Provisioner::setup_domain`] (or of the smaller operations)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    EnsureDestination,
    EnsureZone,
    EnableRouting,
    FetchDnsRecords,
    SetCatchAll,
    SaveSettings,
    VerifySendingKey,
}

impl SetupStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupStep::EnsureDestination => "ensure_destination",
            SetupStep::EnsureZone => "ensure_zone",
            SetupStep::EnableRouting => "enable_routing",
            SetupStep::FetchDnsRecords => "fetch_dns_records",
            SetupStep::SetCatchAll => "set_catch_all",
            SetupStep::SaveSettings => "save_settings",
            SetupStep::VerifySendingKey => "verify_sending_key",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub name_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingSummary {
    pub enabled: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub id: String,
    pub enabled: bool,
}

impl From<&RoutingRule> for RuleSummary {
    fn from(rule: &RoutingRule) -> Self {
        Self {
            id: rule.identifier().unwrap_or(CATCH_ALL_RULE_ID).to_string(),
            enabled: rule.enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSummary {
    pub email: String,
    pub verified: bool,
}

/// Result of a successful [`Provisioner::setup_domain`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupReport {
    pub zone: ZoneSummary,
    pub routing: RoutingSummary,
    pub catch_all_rule: RuleSummary,
    /// Records the operator must publish at the domain's DNS host
    pub dns_records: Vec<serde_json::Value>,
    pub destination: Option<DestinationSummary>,
    pub message: String,
}

/// Result of a successful [`Provisioner::fix_worker_routing`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRoutingReport {
    pub catch_all_rule: RuleSummary,
    pub worker_name: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendingAccountSummary {
    pub email: String,
    pub company_name: Option<String>,
}

/// Result of a successful [`Provisioner::configure_sending`]
#[derive(Debug, Clone, Serialize)]
pub struct SendingReport {
    pub account: SendingAccountSummary,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingStatus {
    pub configured: bool,
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendingStatus {
    pub configured: bool,
}

/// Snapshot of the stored setup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupStatus {
    pub state: SetupState,
    pub setup_completed: bool,
    pub domain: Option<String>,
    pub destination_email: Option<String>,
    pub cloudflare: RoutingStatus,
    pub brevo: SendingStatus,
    pub missing: Vec<String>,
}

/// Runs the provisioning operations against the configured providers
pub struct Provisioner {
    settings: Arc<dyn SettingsStore>,
    routing: Arc<dyn RoutingConnector>,
    sending: Arc<dyn SendingConnector>,
    worker_name: String,
}

impl Provisioner {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        routing: Arc<dyn RoutingConnector>,
        sending: Arc<dyn SendingConnector>,
        worker_name: String,
    ) -> Self {
        Self {
            settings,
            routing,
            sending,
            worker_name,
        }
    }

    /// Route all mail for `domain` to this system
    ///
    /// Registers `destination` as a forwarding target when given, makes
    /// sure the zone exists with routing enabled, points the catch-all rule
    /// at the worker and stores the credentials. The catch-all always
    /// targets the worker: the destination only receives relayed copies.
    pub async fn setup_domain(
        &self,
        domain: &str,
        credentials: RoutingCredentials,
        destination: Option<&str>,
    ) -> Result<SetupReport> {
        let domain = normalize_domain(domain);
        validate_domain(&domain)?;

        if credentials.api_key.trim().is_empty() || credentials.account_id.trim().is_empty() {
            return Err(MailError::InvalidRequest(
                "apiKey, accountId, and domain are required".to_string(),
            ));
        }

        let destination = destination.map(str::trim).filter(|d| !d.is_empty());
        if let Some(destination) = destination {
            validate_email(destination)?;
        }

        info!("Provisioning email routing for {}", domain);
        let provider = self.routing.connect(&credentials)?;

        let destination_summary = match destination {
            Some(email) => {
                let address = provider
                    .ensure_destination_address(email)
                    .await
                    .map_err(|e| e.at_step(SetupStep::EnsureDestination))?;
                Some(DestinationSummary {
                    email: address.email.clone(),
                    verified: address.is_verified(),
                })
            }
            None => None,
        };

        let zone = provider
            .ensure_zone(&domain)
            .await
            .map_err(|e| e.at_step(SetupStep::EnsureZone))?;

        let routing = provider
            .enable_routing(&zone.id)
            .await
            .map_err(|e| e.at_step(SetupStep::EnableRouting))?;

        let dns_records = provider
            .routing_dns_records(&zone.id)
            .await
            .map_err(|e| e.at_step(SetupStep::FetchDnsRecords))?;

        let rule = provider
            .set_catch_all_rule(&zone.id, &CatchAllAction::Worker(self.worker_name.clone()))
            .await
            .map_err(|e| e.at_step(SetupStep::SetCatchAll))?;

        let mut entries = vec![
            (keys::CLOUDFLARE_API_KEY.to_string(), credentials.api_key.clone()),
            (
                keys::CLOUDFLARE_ACCOUNT_ID.to_string(),
                credentials.account_id.clone(),
            ),
            (keys::CLOUDFLARE_ZONE_ID.to_string(), zone.id.clone()),
            (keys::DOMAIN.to_string(), domain.clone()),
        ];
        if let Some(destination) = destination {
            entries.push((keys::DESTINATION_EMAIL.to_string(), destination.to_string()));
        }

        self.settings
            .set_many(&entries)
            .await
            .map_err(|e| e.at_step(SetupStep::SaveSettings))?;

        let message = if zone.is_active() {
            "Cloudflare Email Routing configured successfully".to_string()
        } else {
            "Zone added. Please update your domain nameservers to complete setup.".to_string()
        };

        info!(
            "Provisioned {} (zone {}, status {}), catch-all routed to worker {}",
            domain, zone.id, zone.status, self.worker_name
        );

        Ok(SetupReport {
            zone: ZoneSummary {
                id: zone.id,
                name: zone.name,
                status: zone.status,
                name_servers: zone.name_servers,
            },
            routing: RoutingSummary {
                enabled: routing.enabled,
                status: routing.status,
            },
            catch_all_rule: RuleSummary::from(&rule),
            dns_records,
            destination: destination_summary,
            message,
        })
    }

    /// Point the catch-all rule back at the worker using stored settings
    ///
    /// Fails with [`MailError::NotConfigured`] before any provider call when
    /// the credentials or zone id are missing.
    pub async fn fix_worker_routing(&self, worker_name: Option<&str>) -> Result<WorkerRoutingReport> {
        let config = SetupConfig::load(self.settings.as_ref()).await?;

        let (credentials, zone_id) =
            match (config.routing_credentials(), config.cloudflare_zone_id.clone()) {
                (Some(credentials), Some(zone_id)) => (credentials, zone_id),
                _ => return Err(MailError::NotConfigured("Cloudflare".to_string())),
            };

        let worker_name = worker_name
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .unwrap_or(&self.worker_name)
            .to_string();

        let provider = self.routing.connect(&credentials)?;
        let rule = provider
            .set_catch_all_rule(&zone_id, &CatchAllAction::Worker(worker_name.clone()))
            .await
            .map_err(|e| e.at_step(SetupStep::SetCatchAll))?;

        info!("Catch-all rule of zone {} routed to worker {}", zone_id, worker_name);

        Ok(WorkerRoutingReport {
            catch_all_rule: RuleSummary::from(&rule),
            worker_name,
            message: "Email routing updated to forward to worker".to_string(),
        })
    }

    /// Verify a sending-provider API key and store it
    pub async fn configure_sending(&self, api_key: &str) -> Result<SendingReport> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(MailError::InvalidRequest("apiKey is required".to_string()));
        }

        let provider = self.sending.connect(api_key)?;
        let account = provider
            .account()
            .await
            .map_err(|e| e.at_step(SetupStep::VerifySendingKey))?;

        self.settings
            .set(keys::BREVO_API_KEY, api_key)
            .await
            .map_err(|e| e.at_step(SetupStep::SaveSettings))?;

        info!("Sending provider configured for account {}", account.email);

        Ok(SendingReport {
            account: SendingAccountSummary {
                email: account.email,
                company_name: account.company_name,
            },
            message: "Brevo configured successfully. Add your sending domain in Brevo dashboard."
                .to_string(),
        })
    }

    /// Mark setup as completed once every required setting is present
    pub async fn complete_setup(&self) -> Result<SetupStatus> {
        let config = SetupConfig::load(self.settings.as_ref()).await?;

        let missing = config.missing();
        if !missing.is_empty() {
            warn!("Setup completion refused, missing: {}", missing.join(", "));
            return Err(MailError::SetupIncomplete { missing });
        }

        self.settings.set(keys::SETUP_COMPLETED, "true").await?;
        info!("Setup completed");

        self.status().await
    }

    pub async fn status(&self) -> Result<SetupStatus> {
        let config = SetupConfig::load(self.settings.as_ref()).await?;

        Ok(SetupStatus {
            state: config.state(),
            setup_completed: config.is_completed(),
            domain: config.domain.clone(),
            destination_email: config.destination_email.clone(),
            cloudflare: RoutingStatus {
                configured: config.routing_configured(),
                zone_id: config.cloudflare_zone_id.clone(),
            },
            brevo: SendingStatus {
                configured: config.sending_configured(),
            },
            missing: config.missing(),
        })
    }
}
