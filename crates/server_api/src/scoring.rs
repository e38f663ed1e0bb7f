use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{CategoryScore, TranscriptMessage, RUBRIC_CATEGORIES};
use thiserror::Error;

/// What the scorer is asked to evaluate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub transcript: String,
    pub categories: Vec<String>,
}

impl ScoringRequest {
    pub fn new(role: Option<String>, transcript: &[TranscriptMessage]) -> Self {
        Self {
            role,
            transcript: format_transcript(transcript),
            categories: RUBRIC_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Rubric evaluation as returned by the scorer, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDraft {
    pub total_score: u8,
    pub category_scores: Vec<CategoryScore>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    pub final_assessment: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedbackValidationError {
    #[error("total score {0} is outside 0-100")]
    TotalScoreOutOfRange(u8),
    #[error("category '{name}' score {score} is outside 0-100")]
    CategoryScoreOutOfRange { name: String, score: u8 },
    #[error("category name must not be empty")]
    UnnamedCategory,
    #[error("feedback has no category scores")]
    NoCategories,
}

impl FeedbackDraft {
    pub fn validate(&self) -> Result<(), FeedbackValidationError> {
        if self.total_score > 100 {
            return Err(FeedbackValidationError::TotalScoreOutOfRange(
                self.total_score,
            ));
        }
        if self.category_scores.is_empty() {
            return Err(FeedbackValidationError::NoCategories);
        }
        for category in &self.category_scores {
            if category.name.trim().is_empty() {
                return Err(FeedbackValidationError::UnnamedCategory);
            }
            if category.score > 100 {
                return Err(FeedbackValidationError::CategoryScoreOutOfRange {
                    name: category.name.clone(),
                    score: category.score,
                });
            }
        }
        Ok(())
    }
}

/// External AI service that grades an interview transcript.
#[async_trait]
pub trait FeedbackScorer: Send + Sync {
    async fn score(&self, request: &ScoringRequest) -> anyhow::Result<FeedbackDraft>;
}

pub struct MissingFeedbackScorer;

#[async_trait]
impl FeedbackScorer for MissingFeedbackScorer {
    async fn score(&self, _request: &ScoringRequest) -> anyhow::Result<FeedbackDraft> {
        Err(anyhow!("feedback scorer is unavailable"))
    }
}

/// Renders the conversation as `- role: content` lines.
pub fn format_transcript(transcript: &[TranscriptMessage]) -> String {
    transcript
        .iter()
        .map(|message| format!("- {}: {}\n", message.role.as_str(), message.content))
        .collect()
}
