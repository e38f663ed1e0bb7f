use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{
    CallConfig, CallSession, ClientSettings, HttpApiClient, LoggingNavigator, SessionCommand,
    SessionEvent,
};
use shared::{
    domain::{InterviewId, SessionContext, SessionKind, UserId},
    protocol::{FeedbackReview, Route},
};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voice_agent::ScriptedVoiceAgent;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Generate,
    Interview,
}

/// Runs one interview call against a recorded voice-agent script.
#[derive(Parser, Debug)]
struct Args {
    /// Overrides `server_url` from call_client.toml / CALL_CLIENT__SERVER_URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Resolve the caller from a session token instead of --user-id/--user-name.
    #[arg(long)]
    session_token: Option<String>,
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    user_name: Option<String>,
    #[arg(long)]
    interview_id: Option<String>,
    #[arg(long, value_enum, default_value_t = Kind::Interview)]
    kind: Kind,
    /// Interview question; repeat for several.
    #[arg(long = "question")]
    questions: Vec<String>,
    /// JSON-lines file of voice-agent events replayed when the call starts.
    #[arg(long)]
    script: PathBuf,
    /// Hang up right after the scripted events instead of waiting for call-end.
    #[arg(long)]
    hang_up: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = ClientSettings::load().context("failed to load client settings")?;
    if let Some(server_url) = args.server_url.clone() {
        settings.server_url = server_url;
    }
    let api = Arc::new(HttpApiClient::new(&settings.server_url)?);

    let (user_id, user_name) = resolve_user(&api, &args).await?;
    let context = SessionContext {
        user_name,
        user_id,
        interview_id: args.interview_id.clone().map(InterviewId::new),
        kind: match args.kind {
            Kind::Generate => SessionKind::Generate,
            Kind::Interview => SessionKind::Interview,
        },
        questions: (!args.questions.is_empty()).then(|| args.questions.clone()),
    };

    let raw_script = tokio::fs::read_to_string(&args.script)
        .await
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let agent = Arc::new(ScriptedVoiceAgent::from_json_lines(&raw_script)?);

    let mut session = CallSession::new(
        CallConfig::from(&settings),
        context,
        agent,
        api.clone(),
        Arc::new(LoggingNavigator),
    );

    let printer = tokio::spawn(print_events(session.subscribe_events()));

    let (commands, rx) = mpsc::channel(4);
    commands.send(SessionCommand::Start).await?;
    if args.hang_up {
        commands.send(SessionCommand::Disconnect).await?;
    }
    commands.send(SessionCommand::Shutdown).await?;
    session.run(rx).await;
    drop(session);

    if let Ok(Some(Route::Feedback(interview_id))) = printer.await {
        match args.session_token.as_deref() {
            Some(token) => print_review(&api, &interview_id, token).await?,
            None => println!("feedback saved; sign in with --session-token to view it"),
        }
    }
    Ok(())
}

/// Prints session events until the session is dropped; returns the last route.
async fn print_events(mut events: broadcast::Receiver<SessionEvent>) -> Option<Route> {
    let mut destination = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer lagged; events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        match event {
            SessionEvent::StatusChanged(status) => println!("status: {status:?}"),
            SessionEvent::MessageAppended(message) => {
                println!("{}: {}", message.role.as_str(), message.content)
            }
            SessionEvent::SpeakingChanged(speaking) => info!(speaking, "speaking changed"),
            SessionEvent::AgentError(message) => warn!(%message, "voice agent error"),
            SessionEvent::Navigated(route) => {
                println!("navigate: {}", route.path());
                destination = Some(route);
            }
        }
    }
    destination
}

async fn resolve_user(api: &HttpApiClient, args: &Args) -> Result<(UserId, String)> {
    if let Some(token) = &args.session_token {
        let Some(user) = api.current_user(token).await? else {
            bail!("session token is not valid; sign in again");
        };
        return Ok((user.id, user.name));
    }

    match (&args.user_id, &args.user_name) {
        (Some(id), Some(name)) => Ok((UserId::new(id.clone()), name.clone())),
        _ => bail!("pass --session-token or both --user-id and --user-name"),
    }
}

async fn print_review(
    api: &HttpApiClient,
    interview_id: &InterviewId,
    session_token: &str,
) -> Result<()> {
    match api.review_feedback(interview_id, session_token).await? {
        FeedbackReview::Ready(view) => {
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        FeedbackReview::RedirectHome => println!("no feedback available; back to home"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::CallStatus;

    #[tokio::test]
    async fn printer_keeps_going_after_lagging() {
        let (tx, rx) = broadcast::channel(2);
        for _ in 0..4 {
            tx.send(SessionEvent::StatusChanged(CallStatus::Active))
                .expect("send");
        }
        let route = Route::Feedback(InterviewId::new("int1"));
        tx.send(SessionEvent::Navigated(route.clone())).expect("send");
        drop(tx);

        assert_eq!(print_events(rx).await, Some(route));
    }
}
