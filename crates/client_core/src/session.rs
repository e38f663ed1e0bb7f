//! Call session controller.
//!
//! A [`CallSession`] drives one voice interview: it starts the call on the
//! [`VoiceAgent`], records final transcript lines, and when the call finishes
//! either asks for feedback or sends the user home.

use std::{sync::Arc, time::Duration};

use shared::{
    domain::{CallStatus, SessionContext, SessionKind, TranscriptMessage},
    protocol::{CreateFeedbackRequest, Route},
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use voice_agent::{AgentMessage, StartCallOptions, VoiceAgent, VoiceAgentEvent};

use crate::{ClientSettings, FeedbackService, Navigator};

const SESSION_EVENT_CAPACITY: usize = 256;

/// Which agent a call talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallConfig {
    /// Workflow that collects interview parameters (`generate` sessions).
    pub workflow_id: String,
    /// Assistant that runs the interview itself.
    pub interviewer_assistant: String,
    /// Upper bound on the feedback request; `None` waits indefinitely.
    pub feedback_timeout: Option<Duration>,
}

impl From<&ClientSettings> for CallConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            workflow_id: settings.workflow_id.clone(),
            interviewer_assistant: settings.interviewer_assistant.clone(),
            feedback_timeout: settings.feedback_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Disconnect,
    Shutdown,
}

/// What a front end needs to render the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StatusChanged(CallStatus),
    MessageAppended(TranscriptMessage),
    SpeakingChanged(bool),
    Navigated(Route),
    AgentError(String),
}

#[derive(Debug, Error)]
pub enum CallSessionError {
    #[error("cannot {action} while call is {from:?}")]
    InvalidTransition {
        from: CallStatus,
        action: &'static str,
    },
    #[error("voice agent failed to start call: {0}")]
    Start(anyhow::Error),
}

pub struct CallSession {
    config: CallConfig,
    context: SessionContext,
    agent: Arc<dyn VoiceAgent>,
    feedback: Arc<dyn FeedbackService>,
    navigator: Arc<dyn Navigator>,
    status: CallStatus,
    messages: Vec<TranscriptMessage>,
    last_message: Option<String>,
    speaking: bool,
    events: broadcast::Sender<SessionEvent>,
}

impl CallSession {
    pub fn new(
        config: CallConfig,
        context: SessionContext,
        agent: Arc<dyn VoiceAgent>,
        feedback: Arc<dyn FeedbackService>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            config,
            context,
            agent,
            feedback,
            navigator,
            status: CallStatus::Inactive,
            messages: Vec::new(),
            last_message: None,
            speaking: false,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    /// Content of the most recent final transcript line.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Processes voice events and commands one at a time until `Shutdown` or
    /// until every command sender is gone.
    ///
    /// Queued voice events are handled before the next command, so a command
    /// always sees the state produced by everything the agent already said.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut voice = self.agent.subscribe();

        loop {
            tokio::select! {
                biased;
                Some(event) = voice.recv() => self.handle_event(event).await,
                command = commands.recv() => match command {
                    Some(SessionCommand::Start) => {
                        if let Err(err) = self.start_call().await {
                            warn!(%err, "call: start rejected");
                        }
                    }
                    Some(SessionCommand::Disconnect) => {
                        if let Err(err) = self.disconnect().await {
                            warn!(%err, "call: disconnect rejected");
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => break,
                },
            }
        }

        // Drain what the agent already queued, e.g. the call-end after a stop.
        while let Some(event) = voice.try_recv() {
            self.handle_event(event).await;
        }
        debug!(status = ?self.status, "call: session loop stopped");
    }

    pub async fn start_call(&mut self) -> Result<(), CallSessionError> {
        if !self.status.can_start() {
            return Err(CallSessionError::InvalidTransition {
                from: self.status,
                action: "start",
            });
        }

        if self.status == CallStatus::Finished {
            self.messages.clear();
            self.last_message = None;
        }
        self.set_status(CallStatus::Connecting);

        let (target, options) = self.start_parameters();
        info!(
            kind = ?self.context.kind,
            target = %target,
            user_id = %self.context.user_id,
            "call: starting"
        );
        if let Err(err) = self.agent.start(&target, options).await {
            error!(%err, "call: voice agent failed to start");
            self.set_status(CallStatus::Inactive);
            return Err(CallSessionError::Start(err));
        }
        Ok(())
    }

    /// Ends an active call at the user's request.
    pub async fn disconnect(&mut self) -> Result<(), CallSessionError> {
        if self.status != CallStatus::Active {
            return Err(CallSessionError::InvalidTransition {
                from: self.status,
                action: "disconnect",
            });
        }

        if let Err(err) = self.agent.stop().await {
            warn!(%err, "call: voice agent stop failed; finishing anyway");
        }
        self.finish().await;
        Ok(())
    }

    pub async fn handle_event(&mut self, event: VoiceAgentEvent) {
        match event {
            VoiceAgentEvent::CallStart => {
                if self.status == CallStatus::Connecting {
                    self.set_status(CallStatus::Active);
                } else {
                    debug!(status = ?self.status, "call: ignoring call-start");
                }
            }
            VoiceAgentEvent::CallEnd => match self.status {
                CallStatus::Connecting | CallStatus::Active => self.finish().await,
                _ => debug!(status = ?self.status, "call: ignoring call-end"),
            },
            VoiceAgentEvent::Message(AgentMessage::Transcript(segment)) => {
                if !segment.is_final() {
                    return;
                }
                if !matches!(self.status, CallStatus::Connecting | CallStatus::Active) {
                    debug!(status = ?self.status, "call: dropping transcript outside a call");
                    return;
                }
                let message = segment.to_message();
                self.last_message = Some(message.content.clone());
                self.messages.push(message.clone());
                let _ = self.events.send(SessionEvent::MessageAppended(message));
            }
            VoiceAgentEvent::Message(AgentMessage::Other) => {}
            VoiceAgentEvent::SpeechStart => self.set_speaking(true),
            VoiceAgentEvent::SpeechEnd => self.set_speaking(false),
            VoiceAgentEvent::Error { message } => {
                error!(%message, "call: voice agent error");
                let _ = self.events.send(SessionEvent::AgentError(message));
            }
        }
    }

    fn start_parameters(&self) -> (String, StartCallOptions) {
        match self.context.kind {
            SessionKind::Generate => (
                self.config.workflow_id.clone(),
                StartCallOptions::default()
                    .with_value("username", self.context.user_name.clone())
                    .with_value("userid", self.context.user_id.as_str()),
            ),
            SessionKind::Interview => (
                self.config.interviewer_assistant.clone(),
                StartCallOptions::default().with_value(
                    "questions",
                    format_questions(self.context.questions.as_deref().unwrap_or_default()),
                ),
            ),
        }
    }

    async fn finish(&mut self) {
        if self.status == CallStatus::Finished {
            return;
        }
        self.set_status(CallStatus::Finished);
        self.set_speaking(false);

        let route = self.after_finish_route().await;
        info!(path = %route.path(), "call: finished");
        self.navigator.navigate(route.clone());
        let _ = self.events.send(SessionEvent::Navigated(route));
    }

    async fn after_finish_route(&self) -> Route {
        if self.context.kind == SessionKind::Generate {
            return Route::Home;
        }

        let Some(interview_id) = self.context.interview_id.clone() else {
            warn!(user_id = %self.context.user_id, "call: interview session without interview id");
            return Route::Home;
        };

        let request = CreateFeedbackRequest {
            interview_id: interview_id.clone(),
            user_id: self.context.user_id.clone(),
            transcript: self.messages.clone(),
        };
        let pending = self.feedback.create_feedback(request);
        let outcome = match self.config.feedback_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%interview_id, timeout_ms = limit.as_millis() as u64, "call: feedback request timed out");
                    return Route::Home;
                }
            },
            None => pending.await,
        };

        match outcome {
            Ok(response) => match response.created_id() {
                Some(feedback_id) => {
                    info!(%interview_id, %feedback_id, "call: feedback created");
                    Route::Feedback(interview_id)
                }
                None => {
                    warn!(%interview_id, "call: feedback was not created");
                    Route::Home
                }
            },
            Err(err) => {
                error!(%interview_id, %err, "call: feedback request failed");
                Route::Home
            }
        }
    }

    fn set_status(&mut self, status: CallStatus) {
        if self.status == status {
            return;
        }
        debug!(from = ?self.status, to = ?status, "call: status");
        self.status = status;
        let _ = self.events.send(SessionEvent::StatusChanged(status));
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking != speaking {
            self.speaking = speaking;
            let _ = self.events.send(SessionEvent::SpeakingChanged(speaking));
        }
    }
}

/// `- q1\n- q2`; empty when there are no questions.
pub fn format_questions(questions: &[String]) -> String {
    questions
        .iter()
        .map(|q| format!("- {q}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
