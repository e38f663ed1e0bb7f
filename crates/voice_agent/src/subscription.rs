use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use tokio::sync::mpsc;
use tracing::debug;

use crate::VoiceAgentEvent;

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<VoiceAgentEvent>>,
}

/// Fan-out of agent events to every live [`VoiceSubscription`].
///
/// Each subscriber gets its own unbounded queue so no event is dropped while a
/// consumer is busy.
#[derive(Clone, Default)]
pub struct EventHub {
    state: Arc<Mutex<HubState>>,
}

fn lock(state: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> VoiceSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = lock(&self.state);
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, tx);
            id
        };
        debug!(subscription_id = id, "voice: listener registered");
        VoiceSubscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(&self.state),
        }
    }

    /// Delivers `event` to all subscribers and returns how many received it.
    pub fn emit(&self, event: VoiceAgentEvent) -> usize {
        let mut state = lock(&self.state);
        state
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        state.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).subscribers.len()
    }
}

/// Scoped registration on an [`EventHub`]; unregisters on drop.
pub struct VoiceSubscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<VoiceAgentEvent>,
    hub: Weak<Mutex<HubState>>,
}

impl VoiceSubscription {
    /// Next event in delivery order, or `None` once the agent is gone.
    pub async fn recv(&mut self) -> Option<VoiceAgentEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<VoiceAgentEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for VoiceSubscription {
    fn drop(&mut self) {
        if let Some(state) = self.hub.upgrade() {
            lock(&state).subscribers.remove(&self.id);
            debug!(subscription_id = self.id, "voice: listener released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_events_in_order_to_each_subscriber() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        assert_eq!(hub.emit(VoiceAgentEvent::CallStart), 2);
        assert_eq!(hub.emit(VoiceAgentEvent::CallEnd), 2);

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.recv().await, Some(VoiceAgentEvent::CallStart));
            assert_eq!(sub.recv().await, Some(VoiceAgentEvent::CallEnd));
        }
    }

    #[test]
    fn dropping_subscription_unregisters_it() {
        let hub = EventHub::new();
        let sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(sub);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.emit(VoiceAgentEvent::SpeechStart), 0);
    }

    #[test]
    fn subscription_outliving_hub_drops_cleanly() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();
        hub.emit(VoiceAgentEvent::SpeechEnd);
        drop(hub);
        assert_eq!(sub.try_recv(), Some(VoiceAgentEvent::SpeechEnd));
        assert_eq!(sub.try_recv(), None);
    }
}
