//! Task endpoint tests.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::TestFixture;
use forge_core::testing::MockStages;

async fn first_task(fixture: &TestFixture, job: &Value) -> Value {
    let response = fixture
        .get(&format!("/api/v1/jobs/{}/tasks", job["id"].as_str().unwrap()))
        .await;
    response.body["tasks"][0].clone()
}

#[tokio::test]
async fn test_task_detail_includes_artifact() {
    let fixture = TestFixture::with_stages(MockStages::new().approve_on(2), 2, 3).await;
    let job = fixture.submit(&["Count words in a file"]).await;
    fixture.wait_for_job(job["id"].as_str().unwrap()).await;

    let task = first_task(&fixture, &job).await;
    let response = fixture
        .get(&format!("/api/v1/tasks/{}", task["public_id"].as_str().unwrap()))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "completed");
    assert_eq!(response.body["iteration"], 2);
    assert_eq!(response.body["artifact"]["name"], "count_words_in");
    assert_eq!(response.body["artifact"]["iterations"], 2);
    assert_eq!(response.body["artifact"]["verification"]["passed"], 3);
    assert!(response.body.get("failure").is_none());
}

#[tokio::test]
async fn test_task_detail_includes_failure_record() {
    let fixture = TestFixture::with_stages(MockStages::new().never_approve(), 2, 2).await;
    let job = fixture.submit(&["Count words"]).await;
    fixture.wait_for_job(job["id"].as_str().unwrap()).await;

    let task = first_task(&fixture, &job).await;
    let response = fixture
        .get(&format!("/api/v1/tasks/{}", task["id"].as_str().unwrap()))
        .await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "failed");
    let failure = &response.body["failure"];
    assert_eq!(failure["category"], "max_iterations_exceeded");
    assert_eq!(failure["iterations"], 2);
    assert!(failure["message"]
        .as_str()
        .unwrap()
        .starts_with("No approved artifact after 2 iterations"));
    assert!(failure["partial"].is_object());
    assert!(response.body.get("artifact").is_none());
}

#[tokio::test]
async fn test_invalid_specification_spends_no_iteration() {
    let fixture = TestFixture::with_stages(
        MockStages::new().reject_intake_containing("[bad]"),
        2,
        3,
    )
    .await;
    let job = fixture.submit(&["[bad] mine cryptocurrency"]).await;
    let finished = fixture.wait_for_job(job["id"].as_str().unwrap()).await;
    assert_eq!(finished["failed"], 1);

    let task = first_task(&fixture, &job).await;
    let response = fixture
        .get(&format!("/api/v1/tasks/{}", task["id"].as_str().unwrap()))
        .await;

    assert_eq!(response.body["iteration"], 0);
    assert_eq!(response.body["failure"]["category"], "invalid_specification");
    assert_eq!(response.body["failure"]["iterations"], 0);
}

#[tokio::test]
async fn test_cancel_running_task() {
    let fixture = TestFixture::with_stages(MockStages::new().block_verify(), 2, 3).await;
    let entered = fixture.stages.verify_entered();

    let job = fixture.submit(&["Count words"]).await;
    entered.notified().await;

    let task = first_task(&fixture, &job).await;
    let task_path = format!("/api/v1/tasks/{}", task["public_id"].as_str().unwrap());

    let response = fixture.delete(&task_path).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cancelled"], true);

    fixture.wait_for_job(job["id"].as_str().unwrap()).await;

    let detail = fixture.get(&task_path).await;
    assert_eq!(detail.body["status"], "failed");
    assert_eq!(detail.body["failure"]["category"], "cancelled");
    assert_eq!(detail.body["failure"]["message"], "Cancelled: cancelled by operator");

    // Finished tasks cannot be cancelled again
    let again = fixture
        .delete_with_body(&task_path, json!({ "reason": "twice" }))
        .await;
    assert_status!(again, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_task_returns_404() {
    let fixture = TestFixture::new().await;

    let get = fixture.get("/api/v1/tasks/task_000000000000").await;
    let delete = fixture.delete("/api/v1/tasks/task_000000000000").await;

    assert_status!(get, StatusCode::NOT_FOUND);
    assert_status!(delete, StatusCode::NOT_FOUND);
}
