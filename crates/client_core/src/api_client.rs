use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    domain::{Feedback, InterviewId, User},
    protocol::{
        CreateFeedbackRequest, CreateFeedbackResponse, FeedbackReview, LoginRequest,
        LoginResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::FeedbackService;

/// HTTP client for the interview server.
#[derive(Clone)]
pub struct HttpApiClient {
    http: Client,
    base: Url,
}

impl HttpApiClient {
    pub fn new(server_url: &str) -> Result<Self> {
        let mut base =
            Url::parse(server_url).with_context(|| format!("invalid server url '{server_url}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    pub async fn login(&self, name: &str, email: &str) -> Result<LoginResponse> {
        let res = self
            .http
            .post(self.endpoint("login")?)
            .json(&LoginRequest {
                name: name.to_string(),
                email: email.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    /// `None` when the token is missing, expired or unknown to the server.
    pub async fn current_user(&self, session_token: &str) -> Result<Option<User>> {
        let res = self
            .http
            .get(self.endpoint("me")?)
            .bearer_auth(session_token)
            .send()
            .await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        Ok(Some(res.error_for_status()?.json().await?))
    }

    /// The signed-in user's feedback; `None` when there is none or the
    /// session is not accepted.
    pub async fn get_feedback_by_interview_id(
        &self,
        interview_id: &InterviewId,
        session_token: &str,
    ) -> Result<Option<Feedback>> {
        let res = self
            .http
            .get(self.endpoint(&format!("interviews/{interview_id}/feedback"))?)
            .bearer_auth(session_token)
            .send()
            .await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        Ok(Some(res.error_for_status()?.json().await?))
    }

    pub async fn review_feedback(
        &self,
        interview_id: &InterviewId,
        session_token: &str,
    ) -> Result<FeedbackReview> {
        Ok(self
            .http
            .get(self.endpoint(&format!("interviews/{interview_id}/review"))?)
            .bearer_auth(session_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[async_trait]
impl FeedbackService for HttpApiClient {
    async fn create_feedback(
        &self,
        request: CreateFeedbackRequest,
    ) -> Result<CreateFeedbackResponse> {
        debug!(
            interview_id = %request.interview_id,
            messages = request.transcript.len(),
            "api: create feedback"
        );
        let res = self
            .http
            .post(self.endpoint("feedback")?)
            .json(&request)
            .send()
            .await
            .context("feedback request failed")?
            .error_for_status()?;
        Ok(res.json().await?)
    }
}

#[cfg(test)]
#[path = "tests/api_client_tests.rs"]
mod tests;
