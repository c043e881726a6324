//! API request handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

use crate::error::MailError;
use crate::intake::IntakePipeline;
use crate::provider::RoutingCredentials;
use crate::provisioning::Provisioner;
use crate::utils::normalize_domain;

pub const ENVELOPE_FROM_HEADER: &str = "x-envelope-from";
pub const ENVELOPE_TO_HEADER: &str = "x-envelope-to";

/// Shared application state
pub struct AppState {
    pub provisioner: Provisioner,
    pub intake: IntakePipeline,
    /// Largest raw message accepted by `POST /api/inbound`
    pub max_message_size: usize,
    /// Domains with a setup currently running
    in_flight: Mutex<HashSet<String>>,
}

impl AppState {
    pub fn new(provisioner: Provisioner, intake: IntakePipeline, max_message_size: usize) -> Self {
        Self {
            provisioner,
            intake,
            max_message_size,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `domain` for one setup run; `None` when another run holds it
    fn claim(&self, domain: &str) -> Option<InFlight<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.insert(domain.to_string()).then(|| InFlight {
            set: &self.in_flight,
            domain: domain.to_string(),
        })
    }
}

/// Releases the domain claim when the request finishes, even on error
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    domain: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.domain);
    }
}

/// Body of `POST /api/setup/cloudflare`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupDomainRequest {
    pub api_key: String,
    pub account_id: String,
    pub domain: String,
    pub destination_email: Option<String>,
}

/// Body of `POST /api/setup/cloudflare/worker-routing`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerRoutingRequest {
    pub worker_name: Option<String>,
}

/// Body of `POST /api/setup/brevo`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendingKeyRequest {
    pub api_key: String,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(msg: &str) -> Self {
        Self {
            error: msg.to_string(),
            step: None,
            details: None,
            missing: None,
        }
    }
}

impl IntoResponse for MailError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            MailError::InvalidEmail(_)
            | MailError::InvalidDomain(_)
            | MailError::InvalidRequest(_)
            | MailError::NotConfigured(_) => (StatusCode::BAD_REQUEST, ApiError::new(&self.to_string())),
            MailError::SetupIncomplete { missing } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    missing: Some(missing),
                    ..ApiError::new("Setup incomplete")
                },
            ),
            MailError::SetupInProgress(_) => (StatusCode::CONFLICT, ApiError::new(&self.to_string())),
            MailError::NotFound(_) => (StatusCode::NOT_FOUND, ApiError::new(&self.to_string())),
            MailError::StepFailed { step, source } => {
                // Local storage failures stay server errors; anything else came from a provider
                let status = match *source {
                    MailError::Database(_) | MailError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    ApiError {
                        step: Some(step.to_string()),
                        details: Some(source.to_string()),
                        ..ApiError::new("Setup failed")
                    },
                )
            }
            MailError::Provider { .. } | MailError::UnexpectedResponse { .. } | MailError::Http(_) => {
                (StatusCode::BAD_GATEWAY, ApiError::new(&self.to_string()))
            }
            other => {
                error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Serialize `payload` and mark it successful
fn success<T: Serialize>(payload: &T) -> Response {
    match serde_json::to_value(payload) {
        Ok(mut value) => {
            if let Some(object) = value.as_object_mut() {
                object.insert("success".to_string(), serde_json::Value::Bool(true));
            }
            (StatusCode::OK, Json(value)).into_response()
        }
        Err(e) => MailError::from(e).into_response(),
    }
}

/// GET /api/health - Liveness and settings store check
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_healthy = state.provisioner.status().await.is_ok();
    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(serde_json::json!({
            "status": if db_healthy { "healthy" } else { "unhealthy" },
            "service": "mailbox-rs",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "checks": {
                "database": if db_healthy { "ok" } else { "failed" }
            }
        })),
    )
}

/// GET /api/setup/status
pub async fn setup_status(State(state): State<Arc<AppState>>) -> Response {
    match state.provisioner.status().await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/setup/cloudflare - Provision email routing for a domain
pub async fn setup_cloudflare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetupDomainRequest>,
) -> Response {
    let domain = normalize_domain(&req.domain);

    let _guard = match state.claim(&domain) {
        Some(guard) => guard,
        None => {
            warn!("Setup for {} already in progress", domain);
            return MailError::SetupInProgress(domain).into_response();
        }
    };

    let credentials = RoutingCredentials::new(req.api_key, req.account_id);
    match state
        .provisioner
        .setup_domain(&domain, credentials, req.destination_email.as_deref())
        .await
    {
        Ok(report) => success(&report),
        Err(e) => {
            warn!("Setup for {} failed: {}", domain, e);
            e.into_response()
        }
    }
}

/// POST /api/setup/cloudflare/worker-routing - Re-point the catch-all at the worker
pub async fn fix_worker_routing(
    State(state): State<Arc<AppState>>,
    body: Option<Json<WorkerRoutingRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    match state
        .provisioner
        .fix_worker_routing(req.worker_name.as_deref())
        .await
    {
        Ok(report) => success(&report),
        Err(e) => e.into_response(),
    }
}

/// POST /api/setup/brevo - Verify and store the sending key
pub async fn setup_brevo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendingKeyRequest>,
) -> Response {
    match state.provisioner.configure_sending(&req.api_key).await {
        Ok(report) => success(&report),
        Err(e) => e.into_response(),
    }
}

/// POST /api/setup/complete
pub async fn complete_setup(State(state): State<Arc<AppState>>) -> Response {
    match state.provisioner.complete_setup().await {
        Ok(status) => success(&status),
        Err(e) => e.into_response(),
    }
}

/// POST /api/inbound - Intake of a raw message pushed over HTTP
///
/// The envelope travels in `X-Envelope-From` / `X-Envelope-To`. Intake
/// failures answer 503 so the pushing side retries.
pub async fn inbound(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    };

    let to = match header(ENVELOPE_TO_HEADER).filter(|t| !t.is_empty()) {
        Some(to) => to,
        None => {
            return MailError::InvalidRequest("X-Envelope-To header is required".to_string())
                .into_response()
        }
    };
    let from = header(ENVELOPE_FROM_HEADER).unwrap_or_default();

    match state.intake.handle_inbound(&body, &from, &to).await {
        Ok(receipt) => success(&receipt),
        Err(e) => {
            error!("Inbound intake for {} failed: {}", to, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError {
                    details: Some(e.to_string()),
                    ..ApiError::new("Intake failed, retry later")
                }),
            )
                .into_response()
        }
    }
}
