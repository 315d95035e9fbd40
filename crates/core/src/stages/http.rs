//! Stage collaborators backed by a remote HTTP service.
//!
//! Every stage is a JSON `POST {base_url}/{stage}`; the response body is the
//! stage result in the same shape as the corresponding Rust type.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::traits::{
    ImplementStage, IntakeStage, PlanStage, ReviewStage, SearchStage, SummarizeStage, VerifyStage,
};
use super::types::{
    Candidate, Exploration, FeedbackSummary, IntakeResult, Plan, Review, Specification,
    StageError, StageKind, Verification,
};
use crate::config::StagesConfig;

/// HTTP client implementing every stage trait.
pub struct HttpStageClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpStageClient {
    pub fn new(config: &StagesConfig) -> Result<Self, StageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn endpoint(&self, stage: StageKind) -> String {
        format!("{}/{}", self.base_url, stage.as_str())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        stage: StageKind,
        body: Value,
    ) -> Result<T, StageError> {
        let mut request = self.client.post(self.endpoint(stage)).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StageError::Transport(format!("{} request timed out: {}", stage, e))
            } else {
                StageError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(StageError::Failed(format!(
                "{} returned {}: {}",
                stage,
                status.as_u16(),
                error_text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| StageError::Transport(e.to_string()))?;

        serde_json::from_str(&text)
            .map_err(|e| StageError::Malformed(format!("{} response: {}", stage, e)))
    }
}

#[async_trait]
impl IntakeStage for HttpStageClient {
    async fn intake(&self, spec: &Specification) -> Result<IntakeResult, StageError> {
        self.call(StageKind::Intake, json!({ "specification": spec }))
            .await
    }
}

#[async_trait]
impl SearchStage for HttpStageClient {
    async fn search(&self, spec: &Specification) -> Result<Exploration, StageError> {
        self.call(StageKind::Search, json!({ "specification": spec }))
            .await
    }
}

#[async_trait]
impl PlanStage for HttpStageClient {
    async fn plan(
        &self,
        spec: &Specification,
        exploration: &Exploration,
    ) -> Result<Plan, StageError> {
        self.call(
            StageKind::Plan,
            json!({ "specification": spec, "exploration": exploration }),
        )
        .await
    }
}

#[async_trait]
impl ImplementStage for HttpStageClient {
    async fn implement(
        &self,
        plan: &Plan,
        feedback: Option<&FeedbackSummary>,
    ) -> Result<Candidate, StageError> {
        self.call(
            StageKind::Implement,
            json!({ "plan": plan, "feedback": feedback }),
        )
        .await
    }
}

#[async_trait]
impl VerifyStage for HttpStageClient {
    async fn verify(&self, candidate: &Candidate) -> Result<Verification, StageError> {
        self.call(StageKind::Verify, json!({ "candidate": candidate }))
            .await
    }
}

#[async_trait]
impl ReviewStage for HttpStageClient {
    async fn review(
        &self,
        candidate: &Candidate,
        verification: &Verification,
    ) -> Result<Review, StageError> {
        self.call(
            StageKind::Review,
            json!({ "candidate": candidate, "verification": verification }),
        )
        .await
    }
}

#[async_trait]
impl SummarizeStage for HttpStageClient {
    async fn summarize(
        &self,
        iteration: u32,
        verification: &Verification,
        review: &Review,
    ) -> Result<FeedbackSummary, StageError> {
        self.call(
            StageKind::Summarize,
            json!({
                "iteration": iteration,
                "verification": verification,
                "review": review,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> StagesConfig {
        StagesConfig {
            base_url: base_url.to_string(),
            api_key: Some(String::new()),
            timeout_secs: 2,
        }
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = HttpStageClient::new(&config("http://localhost:9200/")).unwrap();
        assert_eq!(
            client.endpoint(StageKind::Verify),
            "http://localhost:9200/verify"
        );
        assert_eq!(
            client.endpoint(StageKind::Summarize),
            "http://localhost:9200/summarize"
        );
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let client = HttpStageClient::new(&config("http://localhost:9200")).unwrap();
        assert!(client.api_key.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Port 1 on loopback is never listening in the test environment.
        let client = HttpStageClient::new(&config("http://127.0.0.1:1")).unwrap();
        let result = client.intake(&Specification::new("anything")).await;
        assert!(matches!(result, Err(StageError::Transport(_))));
    }
}
