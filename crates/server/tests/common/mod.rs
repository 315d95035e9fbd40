//! Common test utilities for in-process API testing.
//!
//! The fixture wires the real router, scheduler and stores to mock stage
//! collaborators so whole jobs run end to end without a stage service.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use forge_core::testing::fixtures::TestStores;
use forge_core::testing::MockStages;
use forge_core::{Config, TaskScheduler};

/// Re-export fixtures for test convenience
pub use forge_core::testing::fixtures;

/// Test fixture for in-process API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_job_submission() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/jobs", json!({
///         "specifications": [{ "description": "Count words" }]
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock stages - control approval, failures and blocking
    pub stages: Arc<MockStages>,
    /// Scheduler behind the router
    pub scheduler: Arc<TaskScheduler>,
    /// Stores behind the router
    pub stores: TestStores,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a fixture whose stages approve on the first iteration.
    pub async fn new() -> Self {
        Self::with_stages(MockStages::new(), 2, 3).await
    }

    /// Create a fixture with custom mock stages and limits.
    pub async fn with_stages(stages: MockStages, max_concurrent: usize, max_iterations: u32) -> Self {
        let stages = Arc::new(stages);
        let (scheduler, stores) =
            fixtures::scheduler(Arc::clone(&stages), max_concurrent, max_iterations);

        let state = Arc::new(forge_server::state::AppState::new(
            Config::default(),
            Arc::clone(&scheduler),
            stores.jobs.clone(),
            stores.tasks.clone(),
            stores.outcomes.clone(),
            stores.progress.clone(),
        ));

        let router = forge_server::api::create_router(state);

        Self {
            router,
            stages,
            scheduler,
            stores,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a DELETE request with JSON body.
    pub async fn delete_with_body(&self, path: &str, body: Value) -> TestResponse {
        self.request("DELETE", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch the raw text body of a GET request.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Submit a job and return its JSON.
    pub async fn submit(&self, descriptions: &[&str]) -> Value {
        let specifications: Vec<Value> = descriptions
            .iter()
            .map(|d| serde_json::json!({ "description": d }))
            .collect();
        let response = self
            .post(
                "/api/v1/jobs",
                serde_json::json!({ "owner": "alice", "specifications": specifications }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body
    }

    /// Poll a job until it reaches a terminal status.
    pub async fn wait_for_job(&self, id: &str) -> Value {
        for _ in 0..500 {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            let status = response.body["status"].as_str().unwrap_or_default();
            if status == "completed" || status == "failed" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Job {} did not finish in time", id);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
