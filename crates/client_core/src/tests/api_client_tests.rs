use super::*;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode as HttpStatus},
    routing::{get, post},
    Json, Router,
};
use shared::{
    domain::{FeedbackId, MessageRole, ScoreBand, TranscriptMessage, UserId},
    protocol::FeedbackView,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct StubState {
    feedback_requests: Arc<Mutex<Vec<CreateFeedbackRequest>>>,
}

async fn stub_create_feedback(
    State(state): State<StubState>,
    Json(request): Json<CreateFeedbackRequest>,
) -> Json<CreateFeedbackResponse> {
    let ok = !request.transcript.is_empty();
    state.feedback_requests.lock().expect("lock").push(request);
    if ok {
        Json(CreateFeedbackResponse::succeeded(FeedbackId::new("fb-1")))
    } else {
        Json(CreateFeedbackResponse::failed())
    }
}

async fn stub_me(headers: HeaderMap) -> Result<Json<User>, HttpStatus> {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some("Bearer good-token") => Ok(Json(User {
            id: UserId::new("u1"),
            name: "Uma".to_string(),
            email: "uma@example.com".to_string(),
        })),
        _ => Err(HttpStatus::UNAUTHORIZED),
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn stub_feedback_lookup(
    Path(interview_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Feedback>, HttpStatus> {
    match bearer(&headers) {
        Some("good-token") if interview_id == "int1" => Ok(Json(sample_feedback())),
        Some("good-token") => Err(HttpStatus::NOT_FOUND),
        _ => Err(HttpStatus::UNAUTHORIZED),
    }
}

async fn stub_review(
    Path(interview_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<FeedbackReview> {
    if query.contains_key("user_id") || bearer(&headers) != Some("good-token") {
        return Json(FeedbackReview::RedirectHome);
    }
    Json(FeedbackReview::Ready(FeedbackView {
        interview_id: InterviewId::new(interview_id),
        role: "Backend Engineer".to_string(),
        date: "Mar 7, 2025".to_string(),
        total_score: 74,
        total_band: ScoreBand::for_score(74),
        final_assessment: "Good".to_string(),
        categories: Vec::new(),
        strengths: vec!["Calm".to_string()],
        areas_for_improvement: vec!["Depth".to_string()],
    }))
}

async fn spawn_stub_server() -> (String, StubState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = StubState::default();
    let app = Router::new()
        .route("/feedback", post(stub_create_feedback))
        .route("/me", get(stub_me))
        .route("/interviews/:interview_id/feedback", get(stub_feedback_lookup))
        .route("/interviews/:interview_id/review", get(stub_review))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn sample_feedback() -> Feedback {
    serde_json::from_value(serde_json::json!({
        "id": "fb-1",
        "interviewId": "int1",
        "userId": "u1",
        "totalScore": 74,
        "categoryScores": [
            { "name": "Communication Skills", "score": 80, "comment": "Clear" }
        ],
        "strengths": ["Calm"],
        "areasForImprovement": ["Depth"],
        "finalAssessment": "Good",
        "createdAt": "2025-03-07T10:00:00Z"
    }))
    .expect("feedback json")
}

#[tokio::test]
async fn create_feedback_posts_transcript() {
    let (server_url, state) = spawn_stub_server().await;
    let client = HttpApiClient::new(&server_url).expect("client");

    let response = client
        .create_feedback(CreateFeedbackRequest {
            interview_id: InterviewId::new("int1"),
            user_id: UserId::new("u1"),
            transcript: vec![TranscriptMessage::new(
                MessageRole::User,
                "I am an engineer",
            )],
        })
        .await
        .expect("response");

    assert_eq!(response.created_id(), Some(&FeedbackId::new("fb-1")));
    let requests = state.feedback_requests.lock().expect("lock").clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].transcript[0].content, "I am an engineer");
}

#[tokio::test]
async fn create_feedback_passes_through_failure_body() {
    let (server_url, _state) = spawn_stub_server().await;
    let client = HttpApiClient::new(&server_url).expect("client");

    let response = client
        .create_feedback(CreateFeedbackRequest {
            interview_id: InterviewId::new("int1"),
            user_id: UserId::new("u1"),
            transcript: Vec::new(),
        })
        .await
        .expect("response");
    assert_eq!(response, CreateFeedbackResponse::failed());
}

#[tokio::test]
async fn create_feedback_errors_when_server_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = HttpApiClient::new(&format!("http://{addr}")).expect("client");
    let result = client
        .create_feedback(CreateFeedbackRequest {
            interview_id: InterviewId::new("int1"),
            user_id: UserId::new("u1"),
            transcript: Vec::new(),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn current_user_maps_unauthorized_to_none() {
    let (server_url, _state) = spawn_stub_server().await;
    let client = HttpApiClient::new(&server_url).expect("client");

    let user = client.current_user("good-token").await.expect("request");
    assert_eq!(user.map(|u| u.id), Some(UserId::new("u1")));
    assert!(client
        .current_user("stale-token")
        .await
        .expect("request")
        .is_none());
}

#[tokio::test]
async fn feedback_lookup_sends_session_and_maps_misses_to_none() {
    let (server_url, _state) = spawn_stub_server().await;
    let client = HttpApiClient::new(&server_url).expect("client");

    let found = client
        .get_feedback_by_interview_id(&InterviewId::new("int1"), "good-token")
        .await
        .expect("request");
    assert_eq!(found.map(|f| f.total_score), Some(74));

    let missing = client
        .get_feedback_by_interview_id(&InterviewId::new("int2"), "good-token")
        .await
        .expect("request");
    assert!(missing.is_none());

    let rejected = client
        .get_feedback_by_interview_id(&InterviewId::new("int1"), "stale-token")
        .await
        .expect("request");
    assert!(rejected.is_none());
}

#[tokio::test]
async fn review_sends_session_instead_of_user_id() {
    let (server_url, _state) = spawn_stub_server().await;
    let client = HttpApiClient::new(&server_url).expect("client");

    let review = client
        .review_feedback(&InterviewId::new("int1"), "good-token")
        .await
        .expect("request");
    let FeedbackReview::Ready(view) = review else {
        panic!("expected ready review");
    };
    assert_eq!(view.interview_id, InterviewId::new("int1"));

    let anonymous = client
        .review_feedback(&InterviewId::new("int1"), "stale-token")
        .await
        .expect("request");
    assert_eq!(anonymous, FeedbackReview::RedirectHome);
}

#[test]
fn rejects_invalid_server_url() {
    assert!(HttpApiClient::new("not a url").is_err());
}
