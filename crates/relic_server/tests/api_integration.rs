//! Integration tests for the Relic admin HTTP API.

mod support;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use relic_core::backup::SnapshotStore;
use relic_core::{CLEANUP_JOB_ID, MANUAL_BACKUP_JOB_ID};
use serde_json::Value;
use std::sync::atomic::Ordering;
use support::{seed_backup, setup_test_server};

#[tokio::test]
async fn health_and_version_respond() {
    let ctx = setup_test_server();

    let health = ctx.server.get("/health").await;
    assert_eq!(health.status_code(), StatusCode::OK);
    assert_eq!(health.json::<Value>()["status"], "ok");

    let version = ctx.server.get("/api/v1/version").await;
    assert_eq!(version.status_code(), StatusCode::OK);
    assert_eq!(
        version.json::<Value>()["version"],
        env!("CARGO_PKG_VERSION")
    );
    version.assert_header("x-content-type-options", "nosniff");
}

#[tokio::test]
async fn list_backups_is_newest_first_and_paginated() {
    let ctx = setup_test_server();
    let now = Utc::now();
    let newest = seed_backup(&ctx.store, now - Duration::days(1), 10).await;
    let middle = seed_backup(&ctx.store, now - Duration::days(2), 20).await;
    let oldest = seed_backup(&ctx.store, now - Duration::days(3), 30).await;
    ctx.store
        .upload("db/readme.txt", b"not a backup".to_vec())
        .await
        .expect("seed foreign object");

    let page = ctx
        .server
        .get("/api/v1/admin/backups")
        .add_query_param("limit", 2)
        .await;
    assert_eq!(page.status_code(), StatusCode::OK);
    let body: Value = page.json();
    assert_eq!(body["total"], 3);
    assert_eq!(body["total_size_bytes"], 60);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["offset"], 0);
    let backups = body["backups"].as_array().expect("backups array");
    assert_eq!(backups.len(), 2);
    assert_eq!(backups[0]["key"], newest.as_str());
    assert_eq!(backups[1]["key"], middle.as_str());
    assert_eq!(
        backups[0]["filename"],
        newest.trim_start_matches("db/")
    );
    assert!(backups[0]["last_modified"].is_string());

    let rest: Value = ctx
        .server
        .get("/api/v1/admin/backups")
        .add_query_param("limit", 2)
        .add_query_param("offset", 2)
        .await
        .json();
    let rest = rest["backups"].as_array().expect("backups array");
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0]["key"], oldest.as_str());
}

#[tokio::test]
async fn listing_and_retention_share_tie_order() {
    let ctx = setup_test_server();
    let keys = [
        "db/backup-2024-01-15-12-00-00.sql.gz",
        "db/backup-2024-01-15-shutdown.sql.gz",
        "db/backup-2024-01-15-startup.sql.gz",
    ];
    for key in keys.iter().rev() {
        ctx.store
            .upload(key, vec![0x1f; 4])
            .await
            .expect("seed backup");
    }

    let listed: Value = ctx.server.get("/api/v1/admin/backups").await.json();
    let listed: Vec<&str> = listed["backups"]
        .as_array()
        .expect("backups array")
        .iter()
        .filter_map(|item| item["key"].as_str())
        .collect();
    assert_eq!(listed, keys);

    let preview: Value = ctx
        .server
        .get("/api/v1/admin/backups/retention")
        .await
        .json();
    let previewed: Vec<&str> = preview["backups"]
        .as_array()
        .expect("backups array")
        .iter()
        .filter_map(|item| item["key"].as_str())
        .collect();
    assert_eq!(previewed, keys);
    assert_eq!(preview["backups"][0]["tier"], "monthly");
}

#[tokio::test]
async fn list_limit_is_capped() {
    let ctx = setup_test_server();
    let body: Value = ctx
        .server
        .get("/api/v1/admin/backups")
        .add_query_param("limit", 5000)
        .await
        .json();
    assert_eq!(body["limit"], 100);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn manual_backup_uploads_a_snapshot() {
    let ctx = setup_test_server();

    let response = ctx.server.post("/api/v1/admin/backups").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    let key = body["key"].as_str().expect("key");
    assert!(key.starts_with("db/backup-"), "{key}");
    assert!(key.ends_with(".sql.gz"), "{key}");

    let listed = ctx.store.list("db/").await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, key);
}

#[tokio::test]
async fn failed_manual_backup_reports_success_false() {
    let ctx = setup_test_server();
    ctx.dump.fail.store(true, Ordering::SeqCst);

    let body: Value = ctx.server.post("/api/v1/admin/backups").await.json();
    assert_eq!(body["success"], false);
    assert!(body.get("key").is_none());
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("Backup failed after 1 attempts"));
    assert!(ctx.store.list("db/").await.expect("list").is_empty());
}

#[tokio::test]
async fn manual_backup_conflicts_while_one_is_running() {
    let ctx = setup_test_server();
    let _running = ctx.jobs.try_acquire(MANUAL_BACKUP_JOB_ID).expect("guard");

    let response = ctx.server.post("/api/v1/admin/backups").await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert!(response.json::<Value>()["error"].is_string());
}

#[tokio::test]
async fn download_returns_gzip_attachment() {
    let ctx = setup_test_server();
    let key = seed_backup(&ctx.store, Utc::now(), 64).await;
    let filename = key.trim_start_matches("db/");

    let response = ctx
        .server
        .get(&format!("/api/v1/admin/backups/{}/download", filename))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    response.assert_header("content-type", "application/gzip");
    response.assert_header(
        "content-disposition",
        format!("attachment; filename=\"{}\"", filename),
    );
    assert_eq!(response.as_bytes().as_ref(), vec![0x1f; 64].as_slice());
}

#[tokio::test]
async fn download_rejects_invalid_and_missing_names() {
    let ctx = setup_test_server();

    let invalid = ctx
        .server
        .get("/api/v1/admin/backups/notes.txt/download")
        .await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(invalid.json::<Value>()["error"], "Invalid backup filename");

    let missing = ctx
        .server
        .get("/api/v1/admin/backups/backup-2024-01-15-02-00-00.sql.gz/download")
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retention_preview_tags_every_backup_without_deleting() {
    let ctx = setup_test_server();
    let now = Utc::now();
    for days_ago in 0..60 {
        seed_backup(&ctx.store, now - Duration::days(days_ago), 8).await;
    }

    let body: Value = ctx
        .server
        .get("/api/v1/admin/backups/retention")
        .await
        .json();
    assert_eq!(body["summary"]["total"], 60);
    assert_eq!(body["policy"]["retention_days"], 7);
    assert_eq!(body["policy"]["retention_weeks"], 30);
    let backups = body["backups"].as_array().expect("backups array");
    assert_eq!(backups.len(), 60);
    assert!(backups
        .iter()
        .all(|item| ["monthly", "weekly", "daily", "expired"]
            .contains(&item["tier"].as_str().unwrap_or_default())));
    assert_eq!(backups[0]["tier"], "monthly");
    assert!(body["summary"]["expired"].as_u64().unwrap_or_default() > 0);

    assert_eq!(ctx.store.list("db/").await.expect("list").len(), 60);
}

#[tokio::test]
async fn cleanup_deletes_expired_backups_and_is_idempotent() {
    let ctx = setup_test_server();
    let now = Utc::now();
    for days_ago in 0..60 {
        seed_backup(&ctx.store, now - Duration::days(days_ago), 8).await;
    }
    let expected_expired = ctx
        .server
        .get("/api/v1/admin/backups/retention")
        .await
        .json::<Value>()["summary"]["expired"]
        .as_u64()
        .expect("expired count");

    let first: Value = ctx.server.post("/api/v1/admin/backups/cleanup").await.json();
    assert_eq!(first["deleted"].as_u64(), Some(expected_expired));
    assert_eq!(first["deleted_bytes"].as_u64(), Some(expected_expired * 8));
    assert_eq!(first["failures"].as_array().map(Vec::len), Some(0));
    let remaining = ctx.store.list("db/").await.expect("list").len() as u64;
    assert_eq!(remaining, 60 - expected_expired);

    let second: Value = ctx.server.post("/api/v1/admin/backups/cleanup").await.json();
    assert_eq!(second["deleted"], 0);
    assert_eq!(second["retained"].as_u64(), Some(remaining));
}

#[tokio::test]
async fn cleanup_conflicts_while_a_pass_is_running() {
    let ctx = setup_test_server();
    let _running = ctx.jobs.try_acquire(CLEANUP_JOB_ID).expect("guard");

    let response = ctx.server.post("/api/v1/admin/backups/cleanup").await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn config_endpoint_redacts_credentials() {
    let ctx = setup_test_server();
    let response = ctx.server.get("/api/v1/admin/config").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["backup"]["enabled"], true);
    assert_eq!(body["backup"]["times"][0], "02:00");
    assert_eq!(body["backup"]["timezone"], "UTC");
    assert_eq!(body["database"]["host"], "db");
    assert!(!response.text().contains("hunter2"));
}
