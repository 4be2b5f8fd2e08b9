//! Storage metering and hourly overage billing integration tests.
//!
//! Requires PostgreSQL; run with `cargo test -- --ignored` and
//! `TEST_DATABASE_URL` set.

mod common;

use chrono::{TimeZone, Utc};
use common::{fresh_org, TestApp};
use metering_service::models::{
    HourlyChargeOutcome, StorageGate, StorageUsage, Wallet, BYTES_PER_GB,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

async fn record_bytes(app: &TestApp, org: uuid::Uuid, delta: i64, adjust: bool) -> StorageUsage {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/orgs/{}/storage/bytes", app.address, org))
        .json(&json!({ "delta": delta, "adjust": adjust }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid storage usage JSON")
}

async fn check_access(app: &TestApp, org: uuid::Uuid) -> StorageGate {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/orgs/{}/storage", app.address, org))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid storage gate JSON")
}

async fn charge_hour(
    app: &TestApp,
    org: uuid::Uuid,
    now: chrono::DateTime<Utc>,
) -> HourlyChargeOutcome {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/orgs/{}/storage/charge", app.address, org))
        .json(&json!({ "now": now }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid charge outcome JSON")
}

async fn credit_wallet(app: &TestApp, owner: uuid::Uuid, amount: Decimal) -> Wallet {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/wallets/{}/credits", app.address, owner))
        .json(&json!({ "amount": amount }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid wallet JSON")
}

async fn get_wallet(app: &TestApp, owner: uuid::Uuid) -> Wallet {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/wallets/{}", app.address, owner))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid wallet JSON")
}

fn assert_close(actual: Decimal, expected: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff < dec!(0.000001),
        "expected {} to be within 1e-6 of {}",
        actual,
        expected
    );
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn one_byte_over_the_allowance_bills_a_full_gb() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 5 * BYTES_PER_GB + 1, false).await;

    let gate = check_access(&app, org).await;
    assert_eq!(gate.access.overage_gb, 1);

    let hours = metering_service::models::hours_in_utc_month(Utc::now());
    assert_close(gate.access.hourly_charge, dec!(50) / Decimal::from(hours));

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn six_gb_with_empty_wallet_flips_read_only() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 6 * BYTES_PER_GB, false).await;

    let gate = check_access(&app, org).await;
    assert!(!gate.ok);
    assert_eq!(gate.access.overage_gb, 1);
    assert!(gate.access.read_only);
    assert_eq!(
        gate.error.as_deref(),
        Some("Недостаточно средств для оплаты хранения")
    );

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn usage_within_the_allowance_keeps_writes_open() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 3 * BYTES_PER_GB, false).await;

    let gate = check_access(&app, org).await;
    assert!(gate.ok);
    assert_eq!(gate.access.overage_gb, 0);
    assert_eq!(gate.access.hourly_charge, Decimal::ZERO);
    assert!(!gate.access.read_only);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn adjustments_clamp_at_zero() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 1024, false).await;
    let usage = record_bytes(&app, org, -10 * BYTES_PER_GB, true).await;
    assert_eq!(usage.bytes_used, 0);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn negative_delta_without_adjust_flag_is_rejected() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/orgs/{}/storage/bytes", app.address, org))
        .json(&json!({ "delta": -1024 }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn the_same_hour_is_never_charged_twice() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 6 * BYTES_PER_GB, false).await;
    // Signup bonus (100) plus the top-up comfortably covers one hour.
    credit_wallet(&app, org, dec!(1000)).await;
    let before = get_wallet(&app, org).await;

    let now = Utc.with_ymd_and_hms(2026, 8, 6, 14, 30, 0).unwrap();

    let first = charge_hour(&app, org, now).await;
    assert!(first.ok);
    assert!(!first.skipped);

    let second = charge_hour(&app, org, now).await;
    assert!(second.ok);
    assert!(second.skipped);
    assert_eq!(second.reason.as_deref(), Some("already_charged"));

    // Exactly one hourly charge left the wallet.
    let hours = metering_service::models::hours_in_utc_month(now);
    let expected = before.balance + before.bonus_balance - dec!(50) / Decimal::from(hours);
    let after = get_wallet(&app, org).await;
    assert_close(after.balance + after.bonus_balance, expected);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn insufficient_funds_skip_the_charge_and_flip_read_only() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 6 * BYTES_PER_GB, false).await;
    // No wallet exists for the organization at all.

    let now = Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap();
    let outcome = charge_hour(&app, org, now).await;
    assert!(!outcome.ok);
    assert!(outcome.skipped);
    assert_eq!(outcome.reason.as_deref(), Some("insufficient_funds"));

    let gate = check_access(&app, org).await;
    assert!(!gate.ok);
    assert!(gate.access.read_only);

    // No billing row was written for the failed attempt: once funded, the
    // same hour charges successfully and clears read-only.
    credit_wallet(&app, org, dec!(500)).await;
    let retry = charge_hour(&app, org, now).await;
    assert!(retry.ok);
    assert!(!retry.skipped);

    let gate = check_access(&app, org).await;
    assert!(gate.ok);
    assert!(!gate.access.read_only);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn no_overage_marks_the_org_writable_and_skips() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    record_bytes(&app, org, 1 * BYTES_PER_GB, false).await;

    let now = Utc.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap();
    let outcome = charge_hour(&app, org, now).await;
    assert!(outcome.ok);
    assert!(outcome.skipped);
    assert_eq!(outcome.reason.as_deref(), Some("no_overage"));

    app.cleanup().await;
}
