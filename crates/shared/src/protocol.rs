use serde::{Deserialize, Serialize};

use crate::domain::{
    Feedback, FeedbackId, Interview, InterviewId, ScoreBand, TranscriptMessage, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedbackRequest {
    pub interview_id: InterviewId,
    pub user_id: UserId,
    pub transcript: Vec<TranscriptMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedbackResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_id: Option<FeedbackId>,
}

impl CreateFeedbackResponse {
    pub fn succeeded(feedback_id: FeedbackId) -> Self {
        Self {
            success: true,
            feedback_id: Some(feedback_id),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            feedback_id: None,
        }
    }

    /// The created id, only when the call reported success and carried one.
    pub fn created_id(&self) -> Option<&FeedbackId> {
        if self.success {
            self.feedback_id.as_ref()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInterviewRequest {
    pub user_id: UserId,
    pub role: String,
    #[serde(rename = "type")]
    pub interview_type: String,
    pub level: String,
    #[serde(default)]
    pub techstack: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub finalized: bool,
}

/// Card-sized view of an interview for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewSummary {
    pub interview_id: InterviewId,
    pub user_id: UserId,
    pub role: String,
    pub interview_type: String,
    pub techstack: Vec<String>,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_assessment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryView {
    pub name: String,
    pub score: u8,
    pub band: ScoreBand,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackView {
    pub interview_id: InterviewId,
    pub role: String,
    pub date: String,
    pub total_score: u8,
    pub total_band: ScoreBand,
    pub categories: Vec<CategoryView>,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FeedbackReview {
    Ready(FeedbackView),
    RedirectHome,
}

/// Pages the client may be sent to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Feedback(InterviewId),
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Feedback(interview_id) => format!("/{interview_id}/feedback"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    InterviewCreated {
        interview: Interview,
    },
    FeedbackCreated {
        feedback: Feedback,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_response_has_no_created_id() {
        let response = CreateFeedbackResponse {
            success: false,
            feedback_id: Some(FeedbackId::new("stale")),
        };
        assert!(response.created_id().is_none());
        assert!(CreateFeedbackResponse::failed().created_id().is_none());
    }

    #[test]
    fn create_feedback_response_uses_camel_case() {
        let json = serde_json::to_value(CreateFeedbackResponse::succeeded(FeedbackId::new("abc")))
            .expect("json");
        assert_eq!(json, serde_json::json!({ "success": true, "feedbackId": "abc" }));
    }

    #[test]
    fn server_events_are_tagged_by_kind() {
        let interview: Interview = serde_json::from_value(serde_json::json!({
            "id": "int1",
            "userId": "u1",
            "role": "Backend Engineer",
            "type": "Technical",
            "level": "Junior",
            "techstack": ["rust"],
            "questions": ["What is a lifetime?"],
            "finalized": true,
            "createdAt": "2025-03-07T10:00:00Z"
        }))
        .expect("interview json");
        let json = serde_json::to_value(ServerEvent::InterviewCreated { interview })
            .expect("json");
        assert_eq!(json["type"], "interview_created");
        assert_eq!(json["payload"]["interview"]["id"], "int1");
    }

    #[test]
    fn routes_render_paths() {
        assert_eq!(Route::Home.path(), "/");
        assert_eq!(
            Route::Feedback(InterviewId::new("int1")).path(),
            "/int1/feedback"
        );
    }
}
