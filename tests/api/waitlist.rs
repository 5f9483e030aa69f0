use std::net::TcpListener;
use std::time::Duration;

use reqwest::StatusCode;

use serde_json::Value;

use sqlx::PgPool;

use waitlist::app;
use waitlist::service::WaitlistService;

use crate::helpers::{TestAdmin, TestApp};

#[sqlx::test]
async fn join_returns_success_for_valid_email(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .waitlist_join("test@example.com")
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CREATED, res.status());

    let body: Value = res.json().await.expect("Failed to parse response body");
    assert_eq!(Some(true), body["success"].as_bool());

    let row: (String, String) =
        sqlx::query_as("select email, status from waitlist_emails")
            .fetch_one(&pool)
            .await
            .expect("Failed to fetch inserted row");

    assert_eq!("test@example.com", row.0);
    assert_eq!("active", row.1);

    Ok(())
}

#[sqlx::test]
async fn join_deduplicates_across_casing_and_whitespace(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .waitlist_join("Test@Example.com ")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, res.status());

    let res = app
        .waitlist_join("test@example.com")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CONFLICT, res.status());

    let body: Value = res.json().await.expect("Failed to parse response body");
    assert_eq!(Some(false), body["success"].as_bool());
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("already on our waitlist"));

    let count: (i64,) = sqlx::query_as("select count(*) from waitlist_emails")
        .fetch_one(&pool)
        .await
        .expect("Failed to count rows");
    assert_eq!(1, count.0);

    Ok(())
}

#[sqlx::test]
async fn join_rejects_malformed_emails(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    for bad_email in ["", "   ", "invalid-email", "@example.com", "test@", "test@.com"] {
        let res = app
            .waitlist_join(bad_email)
            .await
            .expect("Failed to execute request");

        assert_eq!(
            StatusCode::BAD_REQUEST,
            res.status(),
            "API did not reject email {:?}",
            bad_email
        );
    }

    let count: (i64,) = sqlx::query_as("select count(*) from waitlist_emails")
        .fetch_one(&pool)
        .await
        .expect("Failed to count rows");
    assert_eq!(0, count.0);

    Ok(())
}

#[sqlx::test]
async fn unsubscribe_then_rejoin_reactivates(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    app.waitlist_join("test@example.com")
        .await
        .expect("Failed to execute request");

    let res = app
        .waitlist_unsubscribe("Test@Example.com")
        .await
        .expect("Failed to execute request");
    assert!(res.status().is_success());

    let row: (String,) =
        sqlx::query_as("select status from waitlist_emails where email = 'test@example.com'")
            .fetch_one(&pool)
            .await
            .expect("Failed to fetch updated row");
    assert_eq!("unsubscribed", row.0);

    let res = app
        .waitlist_join("test@example.com")
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::OK, res.status());

    let body: Value = res.json().await.expect("Failed to parse response body");
    assert_eq!(Some(true), body["success"].as_bool());
    assert!(body["message"].as_str().unwrap().contains("Welcome back"));

    let row: (String,) =
        sqlx::query_as("select status from waitlist_emails where email = 'test@example.com'")
            .fetch_one(&pool)
            .await
            .expect("Failed to fetch updated row");
    assert_eq!("active", row.0);

    Ok(())
}

#[sqlx::test]
async fn bounced_addresses_may_not_rejoin(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    sqlx::query("insert into waitlist_emails(email, status) values ('test@example.com', 'bounced')")
        .execute(&pool)
        .await
        .expect("Failed to seed bounced row");

    let res = app
        .waitlist_join("test@example.com")
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CONFLICT, res.status());

    let row: (String,) =
        sqlx::query_as("select status from waitlist_emails where email = 'test@example.com'")
            .fetch_one(&pool)
            .await
            .expect("Failed to fetch row");
    assert_eq!("bounced", row.0);

    Ok(())
}

#[sqlx::test]
async fn join_captures_utm_parameters(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .request(reqwest::Method::POST, "waitlist?utm_source=launch&utm_medium=social")
        .form(&[("email", "test@example.com")])
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, res.status());

    let row: (Option<String>, Option<String>, Option<String>) = sqlx::query_as(
        "select utm_source, utm_medium, utm_campaign from waitlist_emails where email = 'test@example.com'",
    )
    .fetch_one(&pool)
    .await
    .expect("Failed to fetch inserted row");

    assert_eq!(Some("launch".to_string()), row.0);
    assert_eq!(Some("social".to_string()), row.1);
    assert_eq!(None, row.2);

    Ok(())
}

#[sqlx::test]
async fn stats_require_authentication(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;

    let res = app
        .waitlist_stats(None)
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::UNAUTHORIZED, res.status());

    let admin = TestAdmin::register(&pool, "admin@test.com", "test_password").await;
    let mut bad_credentials = admin.credentials();
    bad_credentials.password = "wrong_password".into();

    let res = app
        .waitlist_stats(Some(&bad_credentials))
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::UNAUTHORIZED, res.status());

    Ok(())
}

#[sqlx::test]
async fn stats_count_signups_by_status(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    let admin = TestAdmin::register(&pool, "admin@test.com", "test_password").await;

    app.waitlist_join("a@test.com")
        .await
        .expect("Failed to execute request");
    app.waitlist_join("b@test.com")
        .await
        .expect("Failed to execute request");
    app.waitlist_unsubscribe("b@test.com")
        .await
        .expect("Failed to execute request");

    let res = app
        .waitlist_stats(Some(&admin.credentials()))
        .await
        .expect("Failed to execute request");
    assert!(res.status().is_success());

    let body: Value = res.json().await.expect("Failed to parse response body");
    let data = &body["data"];

    assert_eq!(Some(2), data["total_emails"].as_i64());
    assert_eq!(Some(1), data["active_emails"].as_i64());
    assert_eq!(Some(1), data["unsubscribed_emails"].as_i64());
    assert_eq!(Some(2), data["signups_today"].as_i64());
    assert_eq!(Some(2), data["signups_this_week"].as_i64());

    Ok(())
}

#[sqlx::test]
async fn listing_is_paginated_newest_first(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    let admin = TestAdmin::register(&pool, "admin@test.com", "test_password").await;

    app.waitlist_join("first@test.com")
        .await
        .expect("Failed to execute request");
    tokio::time::sleep(Duration::from_millis(20)).await;
    app.waitlist_join("second@test.com")
        .await
        .expect("Failed to execute request");

    let res = app
        .waitlist_list(Some(&admin.credentials()), "limit=1&offset=0")
        .await
        .expect("Failed to execute request");
    assert!(res.status().is_success());

    let body: Value = res.json().await.expect("Failed to parse response body");
    assert_eq!(Some(2), body["count"].as_i64());

    let data = body["data"].as_array().expect("data should be an array");
    assert_eq!(1, data.len());
    assert_eq!(Some("second@test.com"), data[0]["email"].as_str());

    Ok(())
}

#[sqlx::test]
async fn export_contains_only_active_rows(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    let admin = TestAdmin::register(&pool, "admin@test.com", "test_password").await;

    app.waitlist_join("a@test.com")
        .await
        .expect("Failed to execute request");
    app.waitlist_join("b@test.com")
        .await
        .expect("Failed to execute request");
    app.waitlist_unsubscribe("b@test.com")
        .await
        .expect("Failed to execute request");

    let res = app
        .waitlist_export(Some(&admin.credentials()))
        .await
        .expect("Failed to execute request");
    assert!(res.status().is_success());
    assert!(res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/csv"))
        .unwrap_or(false));

    let csv = res.text().await.expect("Failed to read response body");
    let lines: Vec<&str> = csv.lines().collect();

    assert_eq!(2, lines.len());
    assert_eq!(
        "\"Email\",\"Status\",\"Signup Date\",\"UTM Source\",\"UTM Medium\",\"UTM Campaign\"",
        lines[0]
    );
    assert!(lines[1].starts_with("\"a@test.com\",\"active\","));

    Ok(())
}

#[tokio::test]
async fn demo_mode_serves_without_a_database() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to listen on random port");
    let port = listener.local_addr().unwrap().port();

    // Port 1 guarantees nothing is listening; the demo path must never
    // open a connection
    let pool = sqlx::PgPool::connect_lazy("postgres://127.0.0.1:1/waitlist_offline")
        .expect("Failed to create lazy pool");
    let service = WaitlistService::new(pool.clone(), true);

    let server = app::run(listener, pool, service).expect("Failed to spawn app instance");
    let _ = tokio::spawn(server);

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/waitlist", port);

    let res = client
        .post(&url)
        .form(&[("email", "test@example.com")])
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CREATED, res.status());

    let res = client
        .post(&url)
        .form(&[("email", "Test@Example.com ")])
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(StatusCode::CONFLICT, res.status());
}

#[sqlx::test]
async fn export_with_no_active_rows_is_not_found(pool: PgPool) -> sqlx::Result<()> {
    let app = TestApp::spawn(&pool).await;
    let admin = TestAdmin::register(&pool, "admin@test.com", "test_password").await;

    let res = app
        .waitlist_export(Some(&admin.credentials()))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::NOT_FOUND, res.status());

    Ok(())
}
