//! Typed surface of the external voice-agent SDK.
//!
//! The agent owns the real-time call; callers drive it with [`VoiceAgent::start`]
//! and [`VoiceAgent::stop`] and observe it through a [`VoiceSubscription`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{MessageRole, TranscriptMessage};

mod scripted;
mod subscription;

pub use scripted::{RecordedStart, ScriptedVoiceAgent};
pub use subscription::{EventHub, VoiceSubscription};

/// Options passed to the agent when a call starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCallOptions {
    pub variable_values: BTreeMap<String, String>,
}

impl StartCallOptions {
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variable_values.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Final,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub transcript_type: TranscriptType,
    pub role: MessageRole,
    pub transcript: String,
}

impl TranscriptSegment {
    pub fn is_final(&self) -> bool {
        self.transcript_type == TranscriptType::Final
    }

    pub fn to_message(&self) -> TranscriptMessage {
        TranscriptMessage::new(self.role, self.transcript.clone())
    }
}

/// Payload of a `message` event. Only transcripts are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentMessage {
    Transcript(TranscriptSegment),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum VoiceAgentEvent {
    CallStart,
    CallEnd,
    Message(AgentMessage),
    SpeechStart,
    SpeechEnd,
    Error { message: String },
}

impl VoiceAgentEvent {
    pub fn final_transcript(role: MessageRole, transcript: impl Into<String>) -> Self {
        Self::transcript(TranscriptType::Final, role, transcript)
    }

    pub fn partial_transcript(role: MessageRole, transcript: impl Into<String>) -> Self {
        Self::transcript(TranscriptType::Partial, role, transcript)
    }

    fn transcript(
        transcript_type: TranscriptType,
        role: MessageRole,
        transcript: impl Into<String>,
    ) -> Self {
        Self::Message(AgentMessage::Transcript(TranscriptSegment {
            transcript_type,
            role,
            transcript: transcript.into(),
        }))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallStart => "call-start",
            Self::CallEnd => "call-end",
            Self::Message(_) => "message",
            Self::SpeechStart => "speech-start",
            Self::SpeechEnd => "speech-end",
            Self::Error { .. } => "error",
        }
    }
}

#[async_trait]
pub trait VoiceAgent: Send + Sync {
    /// Starts a call against an assistant or workflow id.
    async fn start(&self, target: &str, options: StartCallOptions) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    /// Registers a listener; dropping the handle unregisters it.
    fn subscribe(&self) -> VoiceSubscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sdk_transcript_message() {
        let raw = r#"{"event":"message","data":{"type":"transcript","transcriptType":"final","role":"assistant","transcript":"Tell me about yourself"}}"#;
        let event: VoiceAgentEvent = serde_json::from_str(raw).expect("event");
        assert_eq!(
            event,
            VoiceAgentEvent::final_transcript(MessageRole::Assistant, "Tell me about yourself")
        );
    }

    #[test]
    fn unknown_message_types_are_tolerated() {
        let raw = r#"{"event":"message","data":{"type":"status-update","status":"ended"}}"#;
        let event: VoiceAgentEvent = serde_json::from_str(raw).expect("event");
        assert_eq!(event, VoiceAgentEvent::Message(AgentMessage::Other));
    }

    #[test]
    fn lifecycle_events_have_no_payload() {
        let event: VoiceAgentEvent = serde_json::from_str(r#"{"event":"call-start"}"#).expect("event");
        assert_eq!(event, VoiceAgentEvent::CallStart);
        assert_eq!(event.name(), "call-start");
    }
}
