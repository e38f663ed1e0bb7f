use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::{
    domain::{Feedback, FeedbackId, Interview, InterviewId, User, UserId},
    protocol::CreateInterviewRequest,
};

const INTERVIEW_COLUMNS: &str =
    "id, user_id, role, interview_type, level, techstack, questions, finalized, created_at";
const FEEDBACK_COLUMNS: &str = "id, interview_id, user_id, total_score, category_scores, strengths, areas_for_improvement, final_assessment, created_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Returns the user registered under `email`, creating it on first sign-in.
    pub async fn upsert_user(&self, name: &str, email: &str) -> Result<User> {
        let row = sqlx::query(
            "INSERT INTO users (id, name, email) VALUES (?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET name=excluded.name
             RETURNING id, name, email",
        )
        .bind(UserId::generate().as_str())
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        user_from_row(&row)
    }

    pub async fn user_by_id(&self, user_id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn create_interview(&self, request: &CreateInterviewRequest) -> Result<Interview> {
        let interview = Interview {
            id: InterviewId::generate(),
            user_id: request.user_id.clone(),
            role: request.role.clone(),
            interview_type: request.interview_type.clone(),
            level: request.level.clone(),
            techstack: request.techstack.clone(),
            questions: request.questions.clone(),
            finalized: request.finalized,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO interviews (id, user_id, role, interview_type, level, techstack, questions, finalized, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(interview.id.as_str())
        .bind(interview.user_id.as_str())
        .bind(&interview.role)
        .bind(&interview.interview_type)
        .bind(&interview.level)
        .bind(to_json(&interview.techstack)?)
        .bind(to_json(&interview.questions)?)
        .bind(interview.finalized)
        .bind(interview.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert interview for user {}", interview.user_id))?;

        debug!(interview_id = %interview.id, user_id = %interview.user_id, "storage: interview created");
        Ok(interview)
    }

    pub async fn interview_by_id(&self, interview_id: &InterviewId) -> Result<Option<Interview>> {
        let row = sqlx::query(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interviews WHERE id = ?"
        ))
        .bind(interview_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(interview_from_row).transpose()
    }

    /// Interviews owned by `user_id`, newest first.
    pub async fn list_interviews_for_user(&self, user_id: &UserId) -> Result<Vec<Interview>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interviews
             WHERE user_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interview_from_row).collect()
    }

    /// Finalized interviews created by anyone other than `user_id`, newest first.
    pub async fn latest_interviews(&self, user_id: &UserId, limit: u32) -> Result<Vec<Interview>> {
        let rows = sqlx::query(&format!(
            "SELECT {INTERVIEW_COLUMNS} FROM interviews
             WHERE finalized = 1 AND user_id != ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?"
        ))
        .bind(user_id.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(interview_from_row).collect()
    }

    /// Persists `feedback`; returns `false` when this user already has
    /// feedback for the interview, leaving the existing record untouched.
    pub async fn insert_feedback(&self, feedback: &Feedback) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO feedback (id, interview_id, user_id, total_score, category_scores, strengths, areas_for_improvement, final_assessment, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(interview_id, user_id) DO NOTHING",
        )
        .bind(feedback.id.as_str())
        .bind(feedback.interview_id.as_str())
        .bind(feedback.user_id.as_str())
        .bind(i64::from(feedback.total_score))
        .bind(to_json(&feedback.category_scores)?)
        .bind(to_json(&feedback.strengths)?)
        .bind(to_json(&feedback.areas_for_improvement)?)
        .bind(&feedback.final_assessment)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to insert feedback for interview {}",
                feedback.interview_id
            )
        })?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn feedback_by_interview(
        &self,
        interview_id: &InterviewId,
        user_id: &UserId,
    ) -> Result<Option<Feedback>> {
        let row = sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE interview_id = ? AND user_id = ?"
        ))
        .bind(interview_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(feedback_from_row).transpose()
    }

    pub async fn feedback_by_id(&self, feedback_id: &FeedbackId) -> Result<Option<Feedback>> {
        let row = sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = ?"
        ))
        .bind(feedback_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(feedback_from_row).transpose()
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: UserId(row.try_get::<String, _>(0)?),
        name: row.try_get::<String, _>(1)?,
        email: row.try_get::<String, _>(2)?,
    })
}

fn interview_from_row(row: &SqliteRow) -> Result<Interview> {
    Ok(Interview {
        id: InterviewId(row.try_get::<String, _>(0)?),
        user_id: UserId(row.try_get::<String, _>(1)?),
        role: row.try_get::<String, _>(2)?,
        interview_type: row.try_get::<String, _>(3)?,
        level: row.try_get::<String, _>(4)?,
        techstack: from_json(&row.try_get::<String, _>(5)?)?,
        questions: from_json(&row.try_get::<String, _>(6)?)?,
        finalized: row.try_get::<bool, _>(7)?,
        created_at: row.try_get::<DateTime<Utc>, _>(8)?,
    })
}

fn feedback_from_row(row: &SqliteRow) -> Result<Feedback> {
    let total_score = row.try_get::<i64, _>(3)?;
    Ok(Feedback {
        id: FeedbackId(row.try_get::<String, _>(0)?),
        interview_id: InterviewId(row.try_get::<String, _>(1)?),
        user_id: UserId(row.try_get::<String, _>(2)?),
        total_score: u8::try_from(total_score)
            .with_context(|| format!("stored total score {total_score} out of range"))?,
        category_scores: from_json(&row.try_get::<String, _>(4)?)?,
        strengths: from_json(&row.try_get::<String, _>(5)?)?,
        areas_for_improvement: from_json(&row.try_get::<String, _>(6)?)?,
        final_assessment: row.try_get::<String, _>(7)?,
        created_at: row.try_get::<DateTime<Utc>, _>(8)?,
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("failed to encode json column")
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).context("failed to decode json column")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
