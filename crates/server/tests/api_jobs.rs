//! Job endpoint tests.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestFixture;
use forge_core::testing::MockStages;

#[tokio::test]
async fn test_submit_job_returns_created_job() {
    let fixture = TestFixture::new().await;

    let job = fixture.submit(&["Count words", "Sort lines"]).await;

    assert!(job["public_id"].as_str().unwrap().starts_with("job_"));
    assert_eq!(job["owner"], "alice");
    assert_eq!(job["total"], 2);
    assert_eq!(job["specifications"].as_array().unwrap().len(), 2);
    assert_ne!(job["status"], "failed");
}

#[tokio::test]
async fn test_submit_without_owner_uses_anonymous() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({ "specifications": [{ "description": "Count words" }] }),
        )
        .await;

    assert_status!(response, StatusCode::CREATED);
    assert_eq!(response.body["owner"], "anonymous");
}

#[tokio::test]
async fn test_submit_empty_job_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post("/api/v1/jobs", json!({ "specifications": [] }))
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("at least one specification"));
}

#[tokio::test]
async fn test_submit_malformed_json_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_raw("/api/v1/jobs", "{ not json").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_after_shutdown_is_unavailable() {
    let fixture = TestFixture::new().await;
    fixture.scheduler.shutdown().await;

    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({ "specifications": [{ "description": "Count words" }] }),
        )
        .await;

    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_job_completes_with_all_tasks_approved() {
    let fixture = TestFixture::new().await;

    let job = fixture.submit(&["Count words", "Sort lines", "Strip tags"]).await;
    let finished = fixture
        .wait_for_job(job["public_id"].as_str().unwrap())
        .await;

    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["completed"], 3);
    assert_eq!(finished["failed"], 0);
    assert_eq!(finished["in_progress"], 0);
    assert!(finished["completed_at"].is_string());
}

#[tokio::test]
async fn test_job_completes_when_every_task_fails() {
    let fixture = TestFixture::with_stages(MockStages::new().never_approve(), 2, 2).await;

    let job = fixture.submit(&["Count words", "Sort lines"]).await;
    let finished = fixture.wait_for_job(job["id"].as_str().unwrap()).await;

    // A job whose tasks all failed is still completed
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["completed"], 0);
    assert_eq!(finished["failed"], 2);
}

#[tokio::test]
async fn test_get_job_by_either_id() {
    let fixture = TestFixture::new().await;
    let job = fixture.submit(&["Count words"]).await;

    let by_id = fixture
        .get(&format!("/api/v1/jobs/{}", job["id"].as_str().unwrap()))
        .await;
    let by_public_id = fixture
        .get(&format!("/api/v1/jobs/{}", job["public_id"].as_str().unwrap()))
        .await;

    assert_status!(by_id, StatusCode::OK);
    assert_status!(by_public_id, StatusCode::OK);
    assert_eq!(by_id.body["id"], by_public_id.body["id"]);
}

#[tokio::test]
async fn test_get_unknown_job_returns_404() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/jobs/job_00000000").await;

    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(response.body["error"].as_str().unwrap().contains("job_00000000"));
}

#[tokio::test]
async fn test_list_jobs_with_filters() {
    let fixture = TestFixture::new().await;

    let first = fixture.submit(&["Count words"]).await;
    fixture.wait_for_job(first["id"].as_str().unwrap()).await;
    let response = fixture
        .post(
            "/api/v1/jobs",
            json!({ "owner": "bob", "specifications": [{ "description": "Sort lines" }] }),
        )
        .await;
    fixture
        .wait_for_job(response.body["id"].as_str().unwrap())
        .await;

    let all = fixture.get("/api/v1/jobs").await;
    assert_status!(all, StatusCode::OK);
    assert_eq!(all.body["total"], 2);
    assert_eq!(all.body["limit"], 100);

    let bobs = fixture.get("/api/v1/jobs?owner=bob").await;
    assert_eq!(bobs.body["total"], 1);
    assert_eq!(bobs.body["jobs"][0]["owner"], "bob");

    let completed = fixture.get("/api/v1/jobs?status=completed&limit=1").await;
    assert_eq!(completed.body["total"], 2);
    assert_eq!(completed.body["jobs"].as_array().unwrap().len(), 1);

    let pending = fixture.get("/api/v1/jobs?status=pending").await;
    assert_eq!(pending.body["total"], 0);
}

#[tokio::test]
async fn test_list_jobs_rejects_unknown_status() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/jobs?status=sleeping").await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_job_tasks() {
    let fixture = TestFixture::new().await;
    let job = fixture.submit(&["Count words", "Sort lines"]).await;
    let public_id = job["public_id"].as_str().unwrap();
    fixture.wait_for_job(public_id).await;

    let response = fixture.get(&format!("/api/v1/jobs/{}/tasks", public_id)).await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["job_id"], job["id"]);
    let tasks = response.body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    for task in tasks {
        assert_eq!(task["status"], "completed");
        assert_eq!(task["outcome"]["type"], "success");
        assert_eq!(task["iteration"], 1);
    }
}

#[tokio::test]
async fn test_cancel_job_cancels_running_tasks() {
    let fixture = TestFixture::with_stages(MockStages::new().block_verify(), 1, 3).await;
    let entered = fixture.stages.verify_entered();

    let job = fixture.submit(&["Count words", "Sort lines"]).await;
    let public_id = job["public_id"].as_str().unwrap();
    entered.notified().await;

    let response = fixture
        .delete_with_body(
            &format!("/api/v1/jobs/{}", public_id),
            json!({ "reason": "no longer needed" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cancelled"], 2);

    let finished = fixture.wait_for_job(public_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["failed"], 2);

    let tasks = fixture.get(&format!("/api/v1/jobs/{}/tasks", public_id)).await;
    for task in tasks.body["tasks"].as_array().unwrap() {
        assert_eq!(task["outcome"]["category"], "cancelled");
        assert_eq!(task["outcome"]["message"], "Cancelled: no longer needed");
    }
}

#[tokio::test]
async fn test_cancel_unknown_job_returns_404() {
    let fixture = TestFixture::new().await;

    let response = fixture.delete("/api/v1/jobs/job_00000000").await;

    assert_status!(response, StatusCode::NOT_FOUND);
}
