use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::{CreateFeedbackRequest, CreateFeedbackResponse, Route};
use tracing::info;

mod api_client;
pub mod session;
pub mod settings;

pub use api_client::HttpApiClient;
pub use session::{CallConfig, CallSession, CallSessionError, SessionCommand, SessionEvent};
pub use settings::ClientSettings;

/// Backend operation that turns a finished interview transcript into feedback.
#[async_trait]
pub trait FeedbackService: Send + Sync {
    async fn create_feedback(&self, request: CreateFeedbackRequest)
        -> Result<CreateFeedbackResponse>;
}

pub struct MissingFeedbackService;

#[async_trait]
impl FeedbackService for MissingFeedbackService {
    async fn create_feedback(
        &self,
        _request: CreateFeedbackRequest,
    ) -> Result<CreateFeedbackResponse> {
        Err(anyhow!("feedback service is unavailable"))
    }
}

/// Moves the front end to another page. Fire-and-forget.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: Route) {
        info!(path = %route.path(), "navigate");
    }
}
