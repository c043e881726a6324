//! Records exchanged with the routing provider API

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MailError, Result};

/// Identifier the provider uses for a zone's single catch-all rule
pub const CATCH_ALL_RULE_ID: &str = "catch_all";

/// API key and account used to talk to the routing provider
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RoutingCredentials {
    pub api_key: String,
    pub account_id: String,
}

impl RoutingCredentials {
    pub fn new(api_key: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Debug for RoutingCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingCredentials")
            .field("api_key", &"***")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// `{code, message}` entry of an envelope's `errors` / `messages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// The provider's `{success, errors, messages, result}` response wrapper
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    /// Check `success`, turning a failed envelope into a provider error
    ///
    /// A failed envelope without any error entry is reported as an
    /// unexpected response.
    pub fn into_result(self, provider: &'static str) -> Result<Option<T>> {
        if self.success {
            return Ok(self.result);
        }

        if self.errors.is_empty() {
            return Err(MailError::UnexpectedResponse {
                provider,
                detail: "success=false without any error entries".to_string(),
            });
        }

        let message = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Err(MailError::Provider {
            provider,
            message,
            codes: self.errors.iter().map(|e| e.code).collect(),
        })
    }
}

/// A managed domain on the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    /// `active` once nameservers point at the provider, `pending` before
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub name_servers: Vec<String>,
}

impl Zone {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Email routing state of a zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSettings {
    pub enabled: bool,
    #[serde(default)]
    pub name: Option<String>,
    /// e.g. `ready`, `unconfigured`, `misconfigured`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub skip_wizard: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Literal,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(rename = "type")]
    pub kind: MatcherKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Matcher {
    pub fn all() -> Self {
        Self {
            kind: MatcherKind::All,
            field: None,
            value: None,
        }
    }

    /// Match a literal recipient address
    pub fn to(address: impl Into<String>) -> Self {
        Self {
            kind: MatcherKind::Literal,
            field: Some("to".to_string()),
            value: Some(address.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Forward,
    Worker,
    Drop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
}

/// A routing rule as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub matchers: Vec<Matcher>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

impl RoutingRule {
    /// Provider identifier, falling back to the tag
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().or(self.tag.as_deref())
    }
}

/// Body of a rule creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRule {
    pub name: String,
    pub enabled: bool,
    pub matchers: Vec<Matcher>,
    pub actions: Vec<RuleAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl NewRule {
    /// Forward one literal address to another
    pub fn forward(from: &str, to: &str) -> Self {
        Self {
            name: format!("Forward {}", from),
            enabled: true,
            matchers: vec![Matcher::to(from)],
            actions: vec![CatchAllAction::ForwardTo(to.to_string()).to_action()],
            priority: None,
        }
    }
}

/// What the catch-all rule does with mail for unknown recipients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchAllAction {
    ForwardTo(String),
    Worker(String),
    Drop,
}

impl CatchAllAction {
    pub fn to_action(&self) -> RuleAction {
        match self {
            CatchAllAction::ForwardTo(email) => RuleAction {
                kind: ActionKind::Forward,
                value: vec![email.clone()],
            },
            CatchAllAction::Worker(name) => RuleAction {
                kind: ActionKind::Worker,
                value: vec![name.clone()],
            },
            CatchAllAction::Drop => RuleAction {
                kind: ActionKind::Drop,
                value: Vec::new(),
            },
        }
    }
}

/// Body of a catch-all update: always matches everything
#[derive(Debug, Clone, Serialize)]
pub struct CatchAllUpdate {
    pub matchers: Vec<Matcher>,
    pub enabled: bool,
    pub actions: Vec<RuleAction>,
}

impl From<&CatchAllAction> for CatchAllUpdate {
    fn from(action: &CatchAllAction) -> Self {
        Self {
            matchers: vec![Matcher::all()],
            enabled: true,
            actions: vec![action.to_action()],
        }
    }
}

/// An account-level forwarding target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAddress {
    pub id: String,
    pub email: String,
    /// Verification timestamp, absent until the owner confirms
    #[serde(default)]
    pub verified: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

impl DestinationAddress {
    pub fn is_verified(&self) -> bool {
        self.verified.as_deref().is_some_and(|v| !v.is_empty())
    }
}
