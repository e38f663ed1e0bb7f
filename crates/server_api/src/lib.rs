use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{Feedback, FeedbackId, Interview, InterviewId, ScoreBand, User, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        CategoryView, CreateFeedbackRequest, CreateFeedbackResponse, CreateInterviewRequest,
        FeedbackReview, FeedbackView, InterviewSummary, LoginRequest, LoginResponse,
    },
};
use storage::Storage;
use tracing::{error, info, warn};

pub mod scoring;
pub mod session;

use scoring::{FeedbackScorer, ScoringRequest};
use session::{mint_session_token, verify_session_token, SessionConfig};

pub const LATEST_INTERVIEWS_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub scorer: Arc<dyn FeedbackScorer>,
    pub sessions: SessionConfig,
}

pub async fn sign_in(ctx: &ApiContext, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
    let name = request.name.trim();
    let email = request.email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(ApiError::validation("name and email are required"));
    }

    let user = ctx
        .storage
        .upsert_user(name, email)
        .await
        .map_err(internal)?;
    let session_token = mint_session_token(&ctx.sessions, &user.id)
        .map_err(|e| ApiError::internal(format!("session token mint failed: {e}")))?;
    info!(user_id = %user.id, "user signed in");
    Ok(LoginResponse {
        user_id: user.id,
        session_token,
    })
}

/// Resolves the signed-in user from a session token. Any failure reads as
/// "not signed in".
pub async fn current_user(ctx: &ApiContext, session_token: Option<&str>) -> Option<User> {
    let user_id = verify_session_token(&ctx.sessions, session_token?)?;
    match ctx.storage.user_by_id(&user_id).await {
        Ok(user) => user,
        Err(err) => {
            error!(%user_id, %err, "failed to load session user");
            None
        }
    }
}

pub async fn create_interview(
    ctx: &ApiContext,
    request: &CreateInterviewRequest,
) -> Result<Interview, ApiError> {
    if request.role.trim().is_empty() {
        return Err(ApiError::validation("interview role is required"));
    }
    ctx.storage
        .user_by_id(&request.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    ctx.storage
        .create_interview(request)
        .await
        .map_err(internal)
}

pub async fn get_interview_by_id(
    ctx: &ApiContext,
    interview_id: &InterviewId,
) -> Result<Option<Interview>, ApiError> {
    ctx.storage
        .interview_by_id(interview_id)
        .await
        .map_err(internal)
}

pub async fn get_feedback_by_interview_id(
    ctx: &ApiContext,
    interview_id: &InterviewId,
    user_id: &UserId,
) -> Result<Option<Feedback>, ApiError> {
    ctx.storage
        .feedback_by_interview(interview_id, user_id)
        .await
        .map_err(internal)
}

/// Generates and stores feedback for a finished interview.
///
/// Never returns an error: every failure is logged and reported as
/// `success: false` so the caller can move on.
pub async fn create_feedback(
    ctx: &ApiContext,
    request: &CreateFeedbackRequest,
) -> CreateFeedbackResponse {
    match try_create_feedback(ctx, request).await {
        Ok(feedback_id) => CreateFeedbackResponse::succeeded(feedback_id),
        Err(err) => {
            error!(
                interview_id = %request.interview_id,
                user_id = %request.user_id,
                code = ?err.code,
                message = %err.message,
                "failed to create feedback"
            );
            CreateFeedbackResponse::failed()
        }
    }
}

pub async fn try_create_feedback(
    ctx: &ApiContext,
    request: &CreateFeedbackRequest,
) -> Result<FeedbackId, ApiError> {
    if request.interview_id.as_str().trim().is_empty() || request.user_id.as_str().trim().is_empty()
    {
        return Err(ApiError::validation("interview id and user id are required"));
    }
    if request.transcript.is_empty() {
        return Err(ApiError::validation("transcript is empty"));
    }

    let interview = get_interview_by_id(ctx, &request.interview_id)
        .await?
        .ok_or_else(|| ApiError::not_found("interview not found"))?;

    if let Some(existing) =
        get_feedback_by_interview_id(ctx, &request.interview_id, &request.user_id).await?
    {
        info!(
            interview_id = %request.interview_id,
            feedback_id = %existing.id,
            "feedback already exists; returning stored record"
        );
        return Ok(existing.id);
    }

    let scoring = ScoringRequest::new(Some(interview.role.clone()), &request.transcript);
    let draft = ctx
        .scorer
        .score(&scoring)
        .await
        .map_err(|e| ApiError::new(ErrorCode::Unavailable, format!("scoring failed: {e}")))?;
    draft
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let feedback = Feedback {
        id: FeedbackId::generate(),
        interview_id: request.interview_id.clone(),
        user_id: request.user_id.clone(),
        total_score: draft.total_score,
        category_scores: draft.category_scores,
        strengths: draft.strengths,
        areas_for_improvement: draft.areas_for_improvement,
        final_assessment: draft.final_assessment,
        created_at: Utc::now(),
    };

    let inserted = ctx
        .storage
        .insert_feedback(&feedback)
        .await
        .map_err(internal)?;
    if !inserted {
        // Lost a race with a concurrent request for the same interview.
        warn!(interview_id = %request.interview_id, "feedback stored concurrently; using stored record");
        let stored = get_feedback_by_interview_id(ctx, &request.interview_id, &request.user_id)
            .await?
            .ok_or_else(|| ApiError::internal("feedback vanished after conflict"))?;
        return Ok(stored.id);
    }

    info!(
        interview_id = %feedback.interview_id,
        feedback_id = %feedback.id,
        total_score = feedback.total_score,
        "feedback created"
    );
    Ok(feedback.id)
}

/// Data for the feedback page; missing interview or feedback sends the user home.
pub async fn review_feedback(
    ctx: &ApiContext,
    interview_id: &InterviewId,
    user_id: Option<&UserId>,
) -> Result<FeedbackReview, ApiError> {
    let Some(interview) = get_interview_by_id(ctx, interview_id).await? else {
        return Ok(FeedbackReview::RedirectHome);
    };
    let Some(user_id) = user_id else {
        return Ok(FeedbackReview::RedirectHome);
    };
    let Some(feedback) = get_feedback_by_interview_id(ctx, interview_id, user_id).await? else {
        return Ok(FeedbackReview::RedirectHome);
    };

    Ok(FeedbackReview::Ready(feedback_view(&interview, &feedback)))
}

pub async fn list_user_interviews(
    ctx: &ApiContext,
    user_id: &UserId,
) -> Result<Vec<InterviewSummary>, ApiError> {
    let interviews = ctx
        .storage
        .list_interviews_for_user(user_id)
        .await
        .map_err(internal)?;
    summarize(ctx, interviews, user_id).await
}

pub async fn latest_interviews(
    ctx: &ApiContext,
    user_id: &UserId,
) -> Result<Vec<InterviewSummary>, ApiError> {
    let interviews = ctx
        .storage
        .latest_interviews(user_id, LATEST_INTERVIEWS_LIMIT)
        .await
        .map_err(internal)?;
    summarize(ctx, interviews, user_id).await
}

async fn summarize(
    ctx: &ApiContext,
    interviews: Vec<Interview>,
    viewer: &UserId,
) -> Result<Vec<InterviewSummary>, ApiError> {
    let mut summaries = Vec::with_capacity(interviews.len());
    for interview in interviews {
        let feedback = get_feedback_by_interview_id(ctx, &interview.id, viewer).await?;
        let date = format_date(
            feedback
                .as_ref()
                .map(|f| f.created_at)
                .unwrap_or(interview.created_at),
        );
        summaries.push(InterviewSummary {
            interview_type: normalize_interview_type(&interview.interview_type),
            interview_id: interview.id,
            user_id: interview.user_id,
            role: interview.role,
            techstack: interview.techstack,
            date,
            total_score: feedback.as_ref().map(|f| f.total_score),
            final_assessment: feedback.map(|f| f.final_assessment),
        });
    }
    Ok(summaries)
}

pub fn feedback_view(interview: &Interview, feedback: &Feedback) -> FeedbackView {
    FeedbackView {
        interview_id: interview.id.clone(),
        role: interview.role.clone(),
        date: format_date(feedback.created_at),
        total_score: feedback.total_score,
        total_band: ScoreBand::for_score(feedback.total_score),
        categories: feedback
            .category_scores
            .iter()
            .map(|category| CategoryView {
                name: category.name.clone(),
                score: category.score,
                band: ScoreBand::for_score(category.score),
                comment: category.comment.clone(),
            })
            .collect(),
        strengths: feedback.strengths.clone(),
        areas_for_improvement: feedback.areas_for_improvement.clone(),
        final_assessment: feedback.final_assessment.clone(),
    }
}

/// `DD Mon, YYYY`, e.g. `07 Mar, 2025`.
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d %b, %Y").to_string()
}

/// Any type mentioning "mix" is shown as `Mixed`.
pub fn normalize_interview_type(raw: &str) -> String {
    if raw.to_ascii_lowercase().contains("mix") {
        "Mixed".to_string()
    } else {
        raw.to_string()
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
