use super::*;
use shared::domain::CategoryScore;

fn interview_request(user_id: &UserId, role: &str, finalized: bool) -> CreateInterviewRequest {
    CreateInterviewRequest {
        user_id: user_id.clone(),
        role: role.to_string(),
        interview_type: "Technical".to_string(),
        level: "Junior".to_string(),
        techstack: vec!["rust".to_string(), "sqlite".to_string()],
        questions: vec!["What is ownership?".to_string()],
        finalized,
    }
}

fn feedback_for(interview: &Interview, total_score: u8) -> Feedback {
    Feedback {
        id: FeedbackId::generate(),
        interview_id: interview.id.clone(),
        user_id: interview.user_id.clone(),
        total_score,
        category_scores: vec![CategoryScore {
            name: "Communication Skills".to_string(),
            score: total_score,
            comment: "Clear answers".to_string(),
        }],
        strengths: vec!["Structured thinking".to_string()],
        areas_for_improvement: vec!["More examples".to_string()],
        final_assessment: "Solid".to_string(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn upsert_user_keeps_id_for_same_email() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let first = storage
        .upsert_user("Alice", "alice@example.com")
        .await
        .expect("user");
    let second = storage
        .upsert_user("Alice Smith", "alice@example.com")
        .await
        .expect("user again");

    assert_eq!(first.id, second.id);
    assert_eq!(second.name, "Alice Smith");
    let loaded = storage.user_by_id(&first.id).await.expect("load");
    assert_eq!(loaded, Some(second));
}

#[tokio::test]
async fn malformed_user_row_is_an_error() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let row = sqlx::query("SELECT 'u1', NULL, 'ghost@example.com'")
        .fetch_one(storage.pool())
        .await
        .expect("row");
    assert!(user_from_row(&row).is_err());
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn interview_round_trips_lists() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.upsert_user("Bob", "bob@example.com").await.expect("user");
    let created = storage
        .create_interview(&interview_request(&user.id, "Backend Engineer", true))
        .await
        .expect("interview");

    let loaded = storage
        .interview_by_id(&created.id)
        .await
        .expect("load")
        .expect("interview exists");
    assert_eq!(loaded.techstack, vec!["rust", "sqlite"]);
    assert_eq!(loaded.questions, created.questions);
    assert!(loaded.finalized);

    let missing = storage
        .interview_by_id(&InterviewId::new("missing"))
        .await
        .expect("load");
    assert!(missing.is_none());
}

#[tokio::test]
async fn lists_user_interviews_newest_first() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.upsert_user("Bob", "bob@example.com").await.expect("user");
    let older = storage
        .create_interview(&interview_request(&user.id, "Frontend", false))
        .await
        .expect("older");
    let newer = storage
        .create_interview(&interview_request(&user.id, "Backend", false))
        .await
        .expect("newer");

    let listed = storage
        .list_interviews_for_user(&user.id)
        .await
        .expect("list");
    let ids: Vec<_> = listed.iter().map(|i| i.id.clone()).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}

#[tokio::test]
async fn latest_interviews_excludes_own_and_unfinalized() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let alice = storage
        .upsert_user("Alice", "alice@example.com")
        .await
        .expect("alice");
    let bob = storage.upsert_user("Bob", "bob@example.com").await.expect("bob");

    storage
        .create_interview(&interview_request(&alice.id, "Own", true))
        .await
        .expect("own");
    storage
        .create_interview(&interview_request(&bob.id, "Draft", false))
        .await
        .expect("draft");
    let visible = storage
        .create_interview(&interview_request(&bob.id, "Published", true))
        .await
        .expect("published");

    let latest = storage.latest_interviews(&alice.id, 20).await.expect("latest");
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, visible.id);
}

#[tokio::test]
async fn feedback_is_stored_once_per_interview_and_user() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let user = storage.upsert_user("Bob", "bob@example.com").await.expect("user");
    let interview = storage
        .create_interview(&interview_request(&user.id, "Backend", true))
        .await
        .expect("interview");

    let first = feedback_for(&interview, 82);
    assert!(storage.insert_feedback(&first).await.expect("insert"));
    let duplicate = feedback_for(&interview, 10);
    assert!(!storage.insert_feedback(&duplicate).await.expect("insert again"));

    let stored = storage
        .feedback_by_interview(&interview.id, &user.id)
        .await
        .expect("load")
        .expect("feedback exists");
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.total_score, 82);
    assert_eq!(stored.category_scores, first.category_scores);

    let by_id = storage.feedback_by_id(&first.id).await.expect("by id");
    assert_eq!(by_id.map(|f| f.interview_id), Some(interview.id));
}

#[tokio::test]
async fn feedback_lookup_is_scoped_to_user() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let owner = storage.upsert_user("Bob", "bob@example.com").await.expect("owner");
    let other = storage
        .upsert_user("Eve", "eve@example.com")
        .await
        .expect("other");
    let interview = storage
        .create_interview(&interview_request(&owner.id, "Backend", true))
        .await
        .expect("interview");
    storage
        .insert_feedback(&feedback_for(&interview, 70))
        .await
        .expect("insert");

    let for_other = storage
        .feedback_by_interview(&interview.id, &other.id)
        .await
        .expect("load");
    assert!(for_other.is_none());
}
