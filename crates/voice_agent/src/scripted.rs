use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{EventHub, StartCallOptions, VoiceAgent, VoiceAgentEvent, VoiceSubscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStart {
    pub target: String,
    pub options: StartCallOptions,
}

#[derive(Default)]
struct ScriptState {
    starts: Vec<RecordedStart>,
    stop_calls: usize,
    in_call: bool,
    start_failure: Option<String>,
}

/// Voice agent that replays a recorded event script when a call starts.
///
/// `stop` behaves like the hosted SDK: it ends a call that is still running by
/// emitting `call-end`.
pub struct ScriptedVoiceAgent {
    hub: EventHub,
    script: Vec<VoiceAgentEvent>,
    state: Mutex<ScriptState>,
}

impl ScriptedVoiceAgent {
    pub fn new(script: Vec<VoiceAgentEvent>) -> Self {
        Self {
            hub: EventHub::new(),
            script,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// One JSON event per line; blank lines and `#` comments are skipped.
    pub fn from_json_lines(raw: &str) -> anyhow::Result<Self> {
        let mut script = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event = serde_json::from_str::<VoiceAgentEvent>(line)
                .with_context(|| format!("invalid voice event on line {}", index + 1))?;
            script.push(event);
        }
        Ok(Self::new(script))
    }

    /// Makes the next `start` call fail with `message`.
    pub fn fail_next_start(&self, message: impl Into<String>) {
        self.lock_state().start_failure = Some(message.into());
    }

    /// Pushes an event outside the script, e.g. a late SDK error.
    pub fn emit(&self, event: VoiceAgentEvent) -> usize {
        self.track(&event);
        self.hub.emit(event)
    }

    pub fn starts(&self) -> Vec<RecordedStart> {
        self.lock_state().starts.clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.lock_state().stop_calls
    }

    pub fn listener_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, event: &VoiceAgentEvent) {
        match event {
            VoiceAgentEvent::CallStart => self.lock_state().in_call = true,
            VoiceAgentEvent::CallEnd => self.lock_state().in_call = false,
            _ => {}
        }
    }
}

#[async_trait]
impl VoiceAgent for ScriptedVoiceAgent {
    async fn start(&self, target: &str, options: StartCallOptions) -> anyhow::Result<()> {
        {
            let mut state = self.lock_state();
            if let Some(message) = state.start_failure.take() {
                return Err(anyhow!(message));
            }
            state.starts.push(RecordedStart {
                target: target.to_string(),
                options,
            });
        }

        info!(assistant = target, events = self.script.len(), "voice: replaying scripted call");
        for event in &self.script {
            debug!(event = event.name(), "voice: scripted event");
            self.emit(event.clone());
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let was_in_call = {
            let mut state = self.lock_state();
            state.stop_calls += 1;
            state.in_call
        };
        if was_in_call {
            self.emit(VoiceAgentEvent::CallEnd);
        }
        Ok(())
    }

    fn subscribe(&self) -> VoiceSubscription {
        self.hub.subscribe()
    }
}
