use anyhow::Context;
use async_trait::async_trait;
use server_api::scoring::{FeedbackDraft, FeedbackScorer, ScoringRequest};
use tracing::debug;
use url::Url;

/// Talks to an external scoring service: `POST {endpoint}` with a
/// [`ScoringRequest`] body, expecting a [`FeedbackDraft`] back.
pub(crate) struct HttpFeedbackScorer {
    http: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpFeedbackScorer {
    pub(crate) fn new(endpoint: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid scorer url '{endpoint}'"))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl FeedbackScorer for HttpFeedbackScorer {
    async fn score(&self, request: &ScoringRequest) -> anyhow::Result<FeedbackDraft> {
        debug!(endpoint = %self.endpoint, transcript_len = request.transcript.len(), "scorer: requesting evaluation");
        let mut call = self.http.post(self.endpoint.clone()).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }
        let draft = call
            .send()
            .await
            .context("scorer request failed")?
            .error_for_status()
            .context("scorer returned an error status")?
            .json::<FeedbackDraft>()
            .await
            .context("scorer response was not a feedback draft")?;
        Ok(draft)
    }
}
