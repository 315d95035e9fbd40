//! Health, config, scheduler, event and metrics endpoint tests.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

use common::TestFixture;

/// Poll the event log until at least `min` events match the query.
async fn wait_for_events(fixture: &TestFixture, query: &str, min: i64) -> Value {
    for _ in 0..200 {
        let response = fixture.get(&format!("/api/v1/events?{}", query)).await;
        if response.body["total"].as_i64().unwrap_or(0) >= min {
            return response.body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Expected at least {} events for {}", min, query);
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_stage_api_key() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["stages"]["api_key_configured"], false);
    assert!(response.body["stages"].get("api_key").is_none());
    assert_eq!(response.body["engine"]["max_iterations"], 3);
    assert_eq!(response.body["scheduler"]["max_concurrent"], 6);
}

#[tokio::test]
async fn test_scheduler_status() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/scheduler/status").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["running"], true);
    assert_eq!(response.body["active_tasks"], 0);
    assert_eq!(response.body["limiter"]["max_concurrent"], 2);
    assert_eq!(response.body["limiter"]["active"], 0);
}

#[tokio::test]
async fn test_events_filtered_by_job_public_id() {
    let fixture = TestFixture::new().await;
    let job = fixture.submit(&["Count words", "Sort lines"]).await;
    let public_id = job["public_id"].as_str().unwrap();
    fixture.wait_for_job(public_id).await;

    let created = wait_for_events(
        &fixture,
        &format!("job_id={}&event_type=job_created", public_id),
        1,
    )
    .await;
    assert_eq!(created["total"], 1);
    assert_eq!(created["events"][0]["data"]["owner"], "alice");
    assert_eq!(created["events"][0]["job_id"], job["id"]);

    let finished = wait_for_events(
        &fixture,
        &format!("job_id={}&event_type=task_finished", public_id),
        2,
    )
    .await;
    assert_eq!(finished["total"], 2);
    for event in finished["events"].as_array().unwrap() {
        assert_eq!(event["data"]["success"], true);
    }

    let paged = fixture
        .get(&format!("/api/v1/events?job_id={}&limit=1", public_id))
        .await;
    assert_eq!(paged.body["events"].as_array().unwrap().len(), 1);
    assert!(paged.body["total"].as_i64().unwrap() > 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("forge_http_requests_total"));
    assert!(body.contains("forge_scheduler_running"));
    assert!(body.contains("forge_limiter_queued"));
}
