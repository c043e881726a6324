//! Local stand-ins for the provider APIs
#![allow(dead_code)]

use axum::{
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use mailbox_rs::config::{BrevoConfig, CloudflareConfig};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Notify;

pub const CATCH_ALL_TAG: &str = "a7e6fb77503c41d8a7f3113c6918f10c";
pub const NAME_SERVERS: [&str; 2] = ["ada.ns.cloudflare.com", "bob.ns.cloudflare.com"];

/// Serve `app` on an ephemeral local port and return its address
async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn envelope(result: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
    }))
}

#[derive(Default)]
pub struct CloudflareState {
    pub zones: Vec<Value>,
    pub addresses: Vec<Value>,
    pub routing_enabled: HashSet<String>,
    pub catch_all: HashMap<String, Value>,
    /// Custom routing rules per zone
    pub rules: HashMap<String, Vec<Value>>,
    /// `METHOD /path` of every request received
    pub requests: Vec<String>,
    /// `Authorization` header of every request received
    pub authorizations: Vec<String>,
    /// Status given to newly created zones
    pub new_zone_status: String,
    /// Canned reply returned for every request when set
    pub failure: Option<(StatusCode, Value)>,
    /// Holds the next request until notified
    pub gate: Option<Arc<Notify>>,
    next_id: usize,
}

impl CloudflareState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

type Shared = Arc<Mutex<CloudflareState>>;

/// In-memory Cloudflare v4 API covering zones and email routing
pub struct CloudflareStub {
    pub base_url: String,
    state: Shared,
}

impl CloudflareStub {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(CloudflareState {
            new_zone_status: "pending".to_string(),
            ..Default::default()
        }));

        let routes = Router::new()
            .route("/zones", get(list_zones).post(create_zone))
            .route("/zones/:zone/email/routing", get(routing_settings))
            .route("/zones/:zone/email/routing/enable", post(enable_routing))
            .route("/zones/:zone/email/routing/disable", post(disable_routing))
            .route("/zones/:zone/email/routing/dns", get(dns_records))
            .route(
                "/zones/:zone/email/routing/rules",
                get(list_rules).post(create_rule),
            )
            .route(
                "/zones/:zone/email/routing/rules/catch_all",
                get(get_catch_all).put(put_catch_all),
            )
            .route("/zones/:zone/email/routing/rules/:rule", delete(delete_rule))
            .route(
                "/accounts/:account/email/routing/addresses",
                get(list_addresses).post(create_address),
            )
            .route(
                "/accounts/:account/email/routing/addresses/:address",
                delete(delete_address),
            );

        let app = Router::new()
            .nest("/client/v4", routes)
            .layer(middleware::from_fn_with_state(state.clone(), record))
            .with_state(state.clone());

        let base_url = format!("{}/client/v4", spawn(app).await);
        Self { base_url, state }
    }

    pub fn config(&self) -> CloudflareConfig {
        CloudflareConfig {
            base_url: self.base_url.clone(),
            worker_name: "mailbox".to_string(),
            timeout_seconds: 5,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.state.lock().unwrap().authorizations.clone()
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == request).count()
    }

    pub fn zones(&self) -> Vec<Value> {
        self.state.lock().unwrap().zones.clone()
    }

    pub fn catch_all(&self, zone_id: &str) -> Option<Value> {
        self.state.lock().unwrap().catch_all.get(zone_id).cloned()
    }

    pub fn rules(&self, zone_id: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(zone_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn addresses(&self) -> Vec<Value> {
        self.state.lock().unwrap().addresses.clone()
    }

    pub fn routing_enabled(&self, zone_id: &str) -> bool {
        self.state.lock().unwrap().routing_enabled.contains(zone_id)
    }

    pub fn set_new_zone_status(&self, status: &str) {
        self.state.lock().unwrap().new_zone_status = status.to_string();
    }

    pub fn seed_zone(&self, id: &str, name: &str, status: &str) {
        self.state.lock().unwrap().zones.push(json!({
            "id": id,
            "name": name,
            "status": status,
            "paused": false,
            "name_servers": NAME_SERVERS,
        }));
    }

    /// Block the next request until the returned handle is notified
    pub fn hold_next_request(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    pub fn fail_with(&self, status: StatusCode, body: Value) {
        self.state.lock().unwrap().failure = Some((status, body));
    }
}

async fn record(State(state): State<Shared>, req: Request, next: Next) -> Response {
    let (failure, gate) = {
        let mut state = state.lock().unwrap();
        state
            .requests
            .push(format!("{} {}", req.method(), req.uri().path()));
        let authorization = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        state.authorizations.push(authorization);
        (state.failure.clone(), state.gate.take())
    };

    if let Some(gate) = gate {
        gate.notified().await;
    }

    match failure {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => next.run(req).await,
    }
}

async fn list_zones(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let state = state.lock().unwrap();
    let zones: Vec<Value> = state
        .zones
        .iter()
        .filter(|z| query.get("name").map_or(true, |name| z["name"] == name.as_str()))
        .cloned()
        .collect();
    envelope(json!(zones))
}

async fn create_zone(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let zone = json!({
        "id": state.next_id("zone"),
        "name": body["name"],
        "status": state.new_zone_status,
        "paused": false,
        "name_servers": NAME_SERVERS,
        "account": body["account"],
    });
    state.zones.push(zone.clone());
    envelope(zone)
}

async fn routing_settings(State(state): State<Shared>, Path(zone): Path<String>) -> Json<Value> {
    let state = state.lock().unwrap();
    let enabled = state.routing_enabled.contains(&zone);
    envelope(json!({
        "enabled": enabled,
        "name": "example.com",
        "status": if enabled { "ready" } else { "unconfigured" },
    }))
}

async fn enable_routing(State(state): State<Shared>, Path(zone): Path<String>) -> Json<Value> {
    state.lock().unwrap().routing_enabled.insert(zone);
    envelope(json!({
        "enabled": true,
        "name": "example.com",
        "status": "ready",
        "skip_wizard": true,
    }))
}

async fn disable_routing(State(state): State<Shared>, Path(zone): Path<String>) -> Json<Value> {
    state.lock().unwrap().routing_enabled.remove(&zone);
    envelope(json!({
        "enabled": false,
        "name": "example.com",
        "status": "disabled",
    }))
}

/// Cloudflare's reply when a path id does not exist
fn not_found(code: i64, message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "errors": [{"code": code, "message": message}],
            "messages": [],
            "result": null,
        })),
    )
        .into_response()
}

async fn list_rules(State(state): State<Shared>, Path(zone): Path<String>) -> Json<Value> {
    let state = state.lock().unwrap();
    envelope(json!(state.rules.get(&zone).cloned().unwrap_or_default()))
}

async fn create_rule(
    State(state): State<Shared>,
    Path(zone): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let tag = state.next_id("rule");
    let rule = json!({
        "id": tag,
        "tag": tag,
        "name": body["name"],
        "enabled": body["enabled"],
        "priority": body.get("priority").cloned().unwrap_or(json!(0)),
        "matchers": body["matchers"],
        "actions": body["actions"],
    });
    state.rules.entry(zone).or_default().push(rule.clone());
    envelope(rule)
}

async fn delete_rule(
    State(state): State<Shared>,
    Path((zone, rule)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    let rules = state.rules.entry(zone).or_default();
    match rules.iter().position(|r| r["tag"] == rule.as_str()) {
        Some(index) => envelope(rules.remove(index)).into_response(),
        None => not_found(2020, "Rule not found"),
    }
}

async fn dns_records(Path(_zone): Path<String>) -> Json<Value> {
    envelope(json!([
        {"type": "MX", "name": "example.com", "content": "route1.mx.cloudflare.net", "priority": 13},
        {"type": "MX", "name": "example.com", "content": "route2.mx.cloudflare.net", "priority": 86},
        {"type": "TXT", "name": "example.com", "content": "v=spf1 include:_spf.mx.cloudflare.net ~all"},
    ]))
}

async fn get_catch_all(State(state): State<Shared>, Path(zone): Path<String>) -> Json<Value> {
    let state = state.lock().unwrap();
    let rule = state.catch_all.get(&zone).cloned().unwrap_or_else(|| {
        json!({
            "tag": CATCH_ALL_TAG,
            "name": "catch-all",
            "enabled": false,
            "matchers": [{"type": "all"}],
            "actions": [{"type": "drop"}],
        })
    });
    envelope(rule)
}

async fn put_catch_all(
    State(state): State<Shared>,
    Path(zone): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let rule = json!({
        "tag": CATCH_ALL_TAG,
        "name": "catch-all",
        "enabled": body["enabled"],
        "matchers": body["matchers"],
        "actions": body["actions"],
    });
    state.lock().unwrap().catch_all.insert(zone, rule.clone());
    envelope(rule)
}

async fn list_addresses(State(state): State<Shared>, Path(_account): Path<String>) -> Json<Value> {
    envelope(json!(state.lock().unwrap().addresses))
}

async fn create_address(
    State(state): State<Shared>,
    Path(_account): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let address = json!({
        "id": state.next_id("addr"),
        "email": body["email"],
        "verified": null,
        "created": "2024-01-01T00:00:00Z",
        "modified": "2024-01-01T00:00:00Z",
    });
    state.addresses.push(address.clone());
    envelope(address)
}

async fn delete_address(
    State(state): State<Shared>,
    Path((_account, address)): Path<(String, String)>,
) -> Response {
    let mut state = state.lock().unwrap();
    match state.addresses.iter().position(|a| a["id"] == address.as_str()) {
        Some(index) => {
            let removed = state.addresses.remove(index);
            envelope(json!({"id": removed["id"]})).into_response()
        }
        None => not_found(2024, "Destination address not found"),
    }
}

pub const BREVO_GOOD_KEY: &str = "xkeysib-good";

/// Brevo account endpoint accepting only [`BREVO_GOOD_KEY`]
pub struct BrevoStub {
    pub base_url: String,
}

impl BrevoStub {
    pub async fn start() -> Self {
        let app = Router::new().route("/v3/account", get(brevo_account));
        let base_url = format!("{}/v3", spawn(app).await);
        Self { base_url }
    }

    pub fn config(&self) -> BrevoConfig {
        BrevoConfig {
            base_url: self.base_url.clone(),
            timeout_seconds: 5,
        }
    }
}

async fn brevo_account(headers: HeaderMap) -> Response {
    let key = headers.get("api-key").and_then(|v| v.to_str().ok());
    if key != Some(BREVO_GOOD_KEY) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"code": "unauthorized", "message": "Key not found"})),
        )
            .into_response();
    }

    Json(json!({
        "email": "owner@example.com",
        "firstName": "Ada",
        "lastName": "Lovelace",
        "companyName": "Example Ltd",
        "plan": [{"type": "free", "credits": 300}],
    }))
    .into_response()
}
