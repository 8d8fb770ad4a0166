use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bantuai_backend::database::{Message, MessageRole};

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub message: Message,
    /// Appended locally and not yet seen in a poll.
    pub optimistic: bool,
}

/// Local message list of one conversation view.
#[derive(Debug, Default)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    human_connected: bool,
}

impl Timeline {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Latches once any polled list carried an agent message.
    pub fn human_connected(&self) -> bool {
        self.human_connected
    }

    /// Replace everything with the authoritative list. Returns `true` only on
    /// the poll that first shows an agent message.
    pub fn replace_with(&mut self, mut messages: Vec<Message>) -> bool {
        // stable: equal timestamps keep store order
        messages.sort_by_key(|message| message.created_at);
        let saw_agent = messages
            .iter()
            .any(|message| message.role == MessageRole::Agent);

        self.entries = messages
            .into_iter()
            .map(|message| TimelineEntry {
                message,
                optimistic: false,
            })
            .collect();

        let newly_connected = saw_agent && !self.human_connected;
        self.human_connected |= saw_agent;
        newly_connected
    }

    pub fn append_optimistic(&mut self, message: Message) {
        self.entries.push(TimelineEntry {
            message,
            optimistic: true,
        });
    }

    /// Index of the first agent message, where the "switched to human agent"
    /// marker is drawn.
    pub fn mode_switch_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.message.role == MessageRole::Agent)
    }
}

/// Timeline shared between a view's reconciler and its send controller.
#[derive(Debug, Default)]
pub struct LiveTimeline {
    inner: Mutex<Timeline>,
    sends_in_flight: AtomicUsize,
}

impl LiveTimeline {
    pub fn with<R>(&self, f: impl FnOnce(&mut Timeline) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self) -> Vec<TimelineEntry> {
        self.with(|timeline| timeline.entries().to_vec())
    }

    pub fn human_connected(&self) -> bool {
        self.with(|timeline| timeline.human_connected())
    }

    pub fn mode_switch_index(&self) -> Option<usize> {
        self.with(|timeline| timeline.mode_switch_index())
    }

    pub fn is_sending(&self) -> bool {
        self.sends_in_flight.load(Ordering::SeqCst) > 0
    }

    /// Marks a send as in flight until the guard drops.
    pub fn begin_send(self: &Arc<Self>) -> SendGuard {
        self.sends_in_flight.fetch_add(1, Ordering::SeqCst);
        SendGuard {
            timeline: Arc::clone(self),
        }
    }
}

pub struct SendGuard {
    timeline: Arc<LiveTimeline>,
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        self.timeline.sends_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
