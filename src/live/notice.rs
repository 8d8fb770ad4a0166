use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use flume::Sender;

use super::view::ViewEvent;

#[derive(Debug, Default)]
struct NoticeState {
    text: Option<String>,
    generation: u64,
}

/// Error line that clears itself after `ttl` unless a newer one replaced it.
#[derive(Clone)]
pub struct TransientNotice {
    state: Arc<Mutex<NoticeState>>,
    ttl: Duration,
    events: Sender<ViewEvent>,
}

impl TransientNotice {
    pub fn new(ttl: Duration, events: Sender<ViewEvent>) -> Self {
        Self {
            state: Arc::new(Mutex::new(NoticeState::default())),
            ttl,
            events,
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn show(&self, text: impl Into<String>) {
        let text = text.into();
        let generation = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.generation += 1;
            state.text = Some(text.clone());
            state.generation
        };
        let _ = self.events.send(ViewEvent::Notice(text));

        let state = self.state.clone();
        let events = self.events.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let cleared = {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.generation == generation && state.text.is_some() {
                    state.text = None;
                    true
                } else {
                    false
                }
            };
            if cleared {
                let _ = events.send(ViewEvent::NoticeCleared);
            }
        });
    }

    pub fn current(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .text
            .clone()
    }
}
