//! Provisioning workflow end to end: real clients, stub providers, SQLite settings

mod common;

use axum::http::StatusCode;
use common::{BrevoStub, CloudflareStub, BREVO_GOOD_KEY, CATCH_ALL_TAG};
use mailbox_rs::provider::{BrevoConnector, CloudflareConnector, RoutingCredentials};
use mailbox_rs::provisioning::{Provisioner, SetupStep};
use mailbox_rs::store::{keys, SettingsStore, SetupState, SqliteStore};
use mailbox_rs::MailError;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    cloudflare: CloudflareStub,
    store: SqliteStore,
    provisioner: Provisioner,
}

async fn harness() -> Harness {
    let cloudflare = CloudflareStub::start().await;
    let brevo = BrevoStub::start().await;
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();

    let provisioner = Provisioner::new(
        Arc::new(store.clone()),
        Arc::new(CloudflareConnector::new(&cloudflare.config())),
        Arc::new(BrevoConnector::new(&brevo.config())),
        "mailbox".to_string(),
    );

    Harness {
        cloudflare,
        store,
        provisioner,
    }
}

fn credentials() -> RoutingCredentials {
    RoutingCredentials::new("cf-token", "acct-1")
}

#[tokio::test]
async fn test_setup_domain_creates_zone_and_routes_to_worker() {
    let h = harness().await;

    let report = h
        .provisioner
        .setup_domain("example.com", credentials(), Some("ops@example.com"))
        .await
        .unwrap();

    // Zone was created, routing enabled, destination registered
    assert_eq!(h.cloudflare.zones().len(), 1);
    assert_eq!(report.zone.name, "example.com");
    assert_eq!(report.zone.name_servers.len(), 2);
    assert!(report.routing.enabled);
    assert_eq!(report.dns_records.len(), 3);
    assert_eq!(report.destination.as_ref().unwrap().email, "ops@example.com");
    assert!(!report.destination.as_ref().unwrap().verified);
    assert_eq!(report.catch_all_rule.id, CATCH_ALL_TAG);
    assert_eq!(
        report.message,
        "Zone added. Please update your domain nameservers to complete setup."
    );

    // The catch-all goes to the worker, never straight to the destination
    let rule = h.cloudflare.catch_all(&report.zone.id).unwrap();
    assert_eq!(rule["actions"], json!([{"type": "worker", "value": ["mailbox"]}]));

    let settings = h.store.get_all().await.unwrap();
    assert_eq!(settings[keys::CLOUDFLARE_API_KEY], "cf-token");
    assert_eq!(settings[keys::CLOUDFLARE_ACCOUNT_ID], "acct-1");
    assert_eq!(settings[keys::CLOUDFLARE_ZONE_ID], report.zone.id);
    assert_eq!(settings[keys::DOMAIN], "example.com");
    assert_eq!(settings[keys::DESTINATION_EMAIL], "ops@example.com");
}

#[tokio::test]
async fn test_setup_domain_rerun_reuses_zone_and_rule() {
    let h = harness().await;
    h.cloudflare.set_new_zone_status("active");

    let first = h
        .provisioner
        .setup_domain("example.com", credentials(), None)
        .await
        .unwrap();
    let second = h
        .provisioner
        .setup_domain("EXAMPLE.com.", credentials(), None)
        .await
        .unwrap();

    assert_eq!(first.zone.id, second.zone.id);
    assert_eq!(first.catch_all_rule.id, second.catch_all_rule.id);
    assert_eq!(h.cloudflare.count("POST /client/v4/zones"), 1);
    assert_eq!(second.message, "Cloudflare Email Routing configured successfully");
    assert!(second.destination.is_none());
}

#[tokio::test]
async fn test_setup_domain_failure_reports_step_and_saves_nothing() {
    let h = harness().await;
    h.cloudflare.fail_with(
        StatusCode::FORBIDDEN,
        json!({
            "success": false,
            "errors": [{"code": 10000, "message": "Authentication error"}],
            "messages": [],
            "result": null
        }),
    );

    let err = h
        .provisioner
        .setup_domain("example.com", credentials(), None)
        .await
        .unwrap_err();

    match err {
        MailError::StepFailed { step, source } => {
            assert_eq!(step, SetupStep::EnsureZone);
            assert_eq!(source.to_string(), "Cloudflare API error: Authentication error");
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert!(h.store.get_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fix_worker_routing_without_setup_makes_no_calls() {
    let h = harness().await;

    let err = h.provisioner.fix_worker_routing(None).await.unwrap_err();

    assert!(matches!(err, MailError::NotConfigured(ref what) if what == "Cloudflare"));
    assert!(h.cloudflare.requests().is_empty());
}

#[tokio::test]
async fn test_fix_worker_routing_repairs_catch_all() {
    let h = harness().await;
    let report = h
        .provisioner
        .setup_domain("example.com", credentials(), None)
        .await
        .unwrap();

    let fixed = h
        .provisioner
        .fix_worker_routing(Some("inbox-worker"))
        .await
        .unwrap();

    assert_eq!(fixed.worker_name, "inbox-worker");
    assert_eq!(fixed.message, "Email routing updated to forward to worker");
    let rule = h.cloudflare.catch_all(&report.zone.id).unwrap();
    assert_eq!(rule["actions"][0]["value"], json!(["inbox-worker"]));
}

#[tokio::test]
async fn test_full_setup_reaches_completed() {
    let h = harness().await;

    let status = h.provisioner.status().await.unwrap();
    assert_eq!(status.state, SetupState::Unconfigured);

    h.provisioner
        .setup_domain("example.com", credentials(), None)
        .await
        .unwrap();

    let err = h.provisioner.complete_setup().await.unwrap_err();
    assert!(matches!(err, MailError::SetupIncomplete { ref missing } if missing == &["Brevo API Key"]));
    assert_eq!(
        h.provisioner.status().await.unwrap().state,
        SetupState::PartiallyConfigured
    );

    let err = h.provisioner.configure_sending("wrong-key").await.unwrap_err();
    assert!(matches!(
        err,
        MailError::StepFailed {
            step: SetupStep::VerifySendingKey,
            ..
        }
    ));

    let sending = h.provisioner.configure_sending(BREVO_GOOD_KEY).await.unwrap();
    assert_eq!(sending.account.email, "owner@example.com");

    let status = h.provisioner.complete_setup().await.unwrap();
    assert_eq!(status.state, SetupState::Completed);
    assert!(status.setup_completed);
    assert!(status.missing.is_empty());
    assert_eq!(status.domain.as_deref(), Some("example.com"));
}
