//! Limit enforcement integration tests.
//!
//! Requires PostgreSQL; run with `cargo test -- --ignored` and
//! `TEST_DATABASE_URL` set.

mod common;

use common::{fresh_org, TestApp};
use metering_service::models::{
    LimitOverrides, PlanCode, PlanLimits, SlotOutcome, UpsertOrgSubscription,
};

async fn consume(app: &TestApp, org: uuid::Uuid, kind: &str) -> SlotOutcome {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/orgs/{}/usage/{}", app.address, org, kind))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    response.json().await.expect("Invalid slot outcome JSON")
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn two_concurrent_requests_take_exactly_one_slot() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    // Basic plan: one project per month.
    app.db
        .upsert_org_subscription(&UpsertOrgSubscription {
            org_id: org,
            plan: PlanCode::Basic,
            overrides: LimitOverrides::default(),
        })
        .await
        .expect("Failed to seed subscription");

    let (a, b) = tokio::join!(consume(&app, org, "projects"), consume(&app, org, "projects"));

    let granted = [&a, &b].iter().filter(|o| o.ok).count();
    assert_eq!(granted, 1, "exactly one of two racers may win the last slot");

    let refused = if a.ok { &b } else { &a };
    assert_eq!(refused.limit, Some(1));
    assert_eq!(refused.used, 1);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn sequential_consumption_counts_every_slot() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    app.db
        .upsert_org_subscription(&UpsertOrgSubscription {
            org_id: org,
            plan: PlanCode::Basic,
            overrides: LimitOverrides::default(),
        })
        .await
        .expect("Failed to seed subscription");

    // Basic allows 5 publications per month.
    for expected in 1..=5 {
        let outcome = consume(&app, org, "publications").await;
        assert!(outcome.ok, "slot {} should be granted", expected);
        assert_eq!(outcome.used, expected);
    }

    let refused = consume(&app, org, "publications").await;
    assert!(!refused.ok);
    assert_eq!(refused.used, 5);
    assert_eq!(refused.limit, Some(5));
    assert_eq!(refused.reason.as_deref(), Some("Лимит исчерпан: 5/5"));

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn zero_override_blocks_the_first_slot() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    // An explicit zero override must not fall back to the tier default.
    app.db
        .upsert_org_subscription(&UpsertOrgSubscription {
            org_id: org,
            plan: PlanCode::Pro,
            overrides: LimitOverrides {
                projects: Some(0),
                ..Default::default()
            },
        })
        .await
        .expect("Failed to seed subscription");

    let outcome = consume(&app, org, "projects").await;
    assert!(!outcome.ok);
    assert_eq!(outcome.limit, Some(0));
    assert_eq!(outcome.used, 0);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn enterprise_is_unlimited_but_still_counted() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    app.db
        .upsert_org_subscription(&UpsertOrgSubscription {
            org_id: org,
            plan: PlanCode::Enterprise,
            overrides: LimitOverrides::default(),
        })
        .await
        .expect("Failed to seed subscription");

    for expected in 1..=3 {
        let outcome = consume(&app, org, "projects").await;
        assert!(outcome.ok);
        assert_eq!(outcome.limit, None);
        assert_eq!(outcome.used, expected);
    }

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn weekly_task_counter_is_independent_of_monthly_counters() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    app.db
        .upsert_org_subscription(&UpsertOrgSubscription {
            org_id: org,
            plan: PlanCode::Basic,
            overrides: LimitOverrides {
                tasks_weekly: Some(2),
                ..Default::default()
            },
        })
        .await
        .expect("Failed to seed subscription");

    // Exhaust the monthly project limit first.
    let project = consume(&app, org, "projects").await;
    assert!(project.ok);

    // Task slots live in their own weekly bucket.
    assert!(consume(&app, org, "tasks").await.ok);
    assert!(consume(&app, org, "tasks").await.ok);
    let refused = consume(&app, org, "tasks").await;
    assert!(!refused.ok);
    assert_eq!(refused.used, 2);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn organizations_without_subscription_default_to_basic() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    let outcome = consume(&app, org, "projects").await;
    assert!(outcome.ok);
    assert_eq!(outcome.plan, PlanCode::Basic);
    assert_eq!(outcome.limit, Some(1));

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn stored_plan_config_overrides_builtin_defaults() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    // Tighten the Pro tier to 2 projects via the stored config.
    app.db
        .upsert_plan_limit_config(
            PlanCode::Pro,
            &PlanLimits {
                seats: Some(5),
                projects: Some(2),
                publications: Some(50),
                tasks_weekly: Some(50),
            },
        )
        .await
        .expect("Failed to seed plan config");

    app.db
        .upsert_org_subscription(&UpsertOrgSubscription {
            org_id: org,
            plan: PlanCode::Pro,
            overrides: LimitOverrides::default(),
        })
        .await
        .expect("Failed to seed subscription");

    assert!(consume(&app, org, "projects").await.ok);
    assert!(consume(&app, org, "projects").await.ok);
    let refused = consume(&app, org, "projects").await;
    assert!(!refused.ok);
    assert_eq!(refused.limit, Some(2));

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (set TEST_DATABASE_URL)"]
async fn unknown_usage_kind_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let org = fresh_org();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/orgs/{}/usage/widgets", app.address, org))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}
