use std::sync::Arc;
use std::time::Duration;

use bantuai_backend::store::MessageStore;
use flume::Sender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::timeline::LiveTimeline;
use super::view::ViewEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Applied { newly_connected: bool },
    SkippedWhileSending,
    FetchFailed,
    Cancelled,
}

/// Periodic fetch-and-replace of one conversation's messages.
#[derive(Clone)]
pub struct PollingReconciler {
    conversation_id: String,
    store: Arc<dyn MessageStore>,
    timeline: Arc<LiveTimeline>,
    events: Sender<ViewEvent>,
    cancel: CancellationToken,
}

impl PollingReconciler {
    pub fn new(
        conversation_id: impl Into<String>,
        store: Arc<dyn MessageStore>,
        timeline: Arc<LiveTimeline>,
        events: Sender<ViewEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            store,
            timeline,
            events,
            cancel,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub async fn tick(&self) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }
        if self.timeline.is_sending() {
            tracing::debug!(
                "Skipping poll of {} while a send is in flight",
                self.conversation_id
            );
            return TickOutcome::SkippedWhileSending;
        }

        let fetched = self.store.fetch_messages(&self.conversation_id).await;
        // the view may have been torn down while the request was out
        if self.cancel.is_cancelled() {
            return TickOutcome::Cancelled;
        }

        match fetched {
            Ok(messages) => {
                let newly_connected = self.timeline.with(|timeline| timeline.replace_with(messages));
                let _ = self.events.send(ViewEvent::TimelineChanged);
                if newly_connected {
                    tracing::info!("Human agent joined conversation {}", self.conversation_id);
                    let _ = self.events.send(ViewEvent::HumanConnected);
                }
                TickOutcome::Applied { newly_connected }
            }
            Err(error) => {
                tracing::debug!("Poll of {} failed: {:#}", self.conversation_id, error);
                TickOutcome::FetchFailed
            }
        }
    }

    /// Immediate first tick, then one per `interval` until cancelled.
    pub fn spawn(self, interval: Duration) -> ReconcilerHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // an in-flight fetch must not hold up teardown
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = self.tick() => {}
                        }
                    }
                }
            }
            tracing::debug!("Reconciler for {} stopped", self.conversation_id);
        });
        ReconcilerHandle {
            cancel,
            task: Some(task),
        }
    }
}

/// Stops the loop when told to or when dropped.
pub struct ReconcilerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the loop to exit. Returns promptly even while a
    /// fetch is outstanding; its response is dropped.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::testing::{message_at, MemoryStore};
    use bantuai_backend::database::MessageRole;
    use std::sync::atomic::Ordering;
    use tokio::sync::Notify;

    fn reconciler_for(
        store: Arc<MemoryStore>,
        timeline: Arc<LiveTimeline>,
    ) -> (PollingReconciler, flume::Receiver<ViewEvent>) {
        let (tx, rx) = flume::unbounded();
        let reconciler =
            PollingReconciler::new("c1", store, timeline, tx, CancellationToken::new());
        (reconciler, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_every_interval_until_stopped() {
        let store = Arc::new(MemoryStore::default());
        let timeline = Arc::new(LiveTimeline::default());
        let (reconciler, _rx) = reconciler_for(store.clone(), timeline);

        let handle = reconciler.spawn(Duration::from_millis(5000));
        tokio::time::sleep(Duration::from_millis(10_001)).await;
        assert_eq!(store.fetches.load(Ordering::SeqCst), 3);

        assert!(!handle.is_stopped());
        handle.stop();
        assert!(handle.is_stopped());
        tokio::time::sleep(Duration::from_millis(20_000)).await;
        assert_eq!(store.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let store = Arc::new(MemoryStore::default());
        let (reconciler, _rx) = reconciler_for(store.clone(), Arc::new(LiveTimeline::default()));

        let handle = reconciler.spawn(Duration::from_millis(5000));
        tokio::time::sleep(Duration::from_millis(1)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn applied_poll_replaces_timeline_and_reports_connection() {
        let store = Arc::new(MemoryStore::default());
        store.put_messages(
            "c1",
            vec![
                message_at("c1", "m2", MessageRole::Agent, "Halo, saya Admin", 10),
                message_at("c1", "m1", MessageRole::Customer, "Tolong", 0),
            ],
        );
        let timeline = Arc::new(LiveTimeline::default());
        let (reconciler, rx) = reconciler_for(store, timeline.clone());

        assert_eq!(
            reconciler.tick().await,
            TickOutcome::Applied {
                newly_connected: true
            }
        );
        assert_eq!(
            reconciler.tick().await,
            TickOutcome::Applied {
                newly_connected: false
            }
        );
        let ids: Vec<String> = timeline
            .snapshot()
            .into_iter()
            .map(|entry| entry.message.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(timeline.human_connected());

        let events: Vec<ViewEvent> = rx.try_iter().collect();
        assert_eq!(
            events
                .iter()
                .filter(|event| **event == ViewEvent::HumanConnected)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn failed_fetch_leaves_timeline_untouched() {
        let store = Arc::new(MemoryStore::default());
        store.put_messages("c1", vec![message_at("c1", "m1", MessageRole::Customer, "halo", 0)]);
        let timeline = Arc::new(LiveTimeline::default());
        let (reconciler, _rx) = reconciler_for(store.clone(), timeline.clone());
        reconciler.tick().await;

        store.fail_fetches.store(true, Ordering::SeqCst);
        assert_eq!(reconciler.tick().await, TickOutcome::FetchFailed);
        assert_eq!(timeline.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn skips_fetch_while_a_send_is_in_flight() {
        let store = Arc::new(MemoryStore::default());
        let timeline = Arc::new(LiveTimeline::default());
        let (reconciler, _rx) = reconciler_for(store.clone(), timeline.clone());

        let guard = timeline.begin_send();
        assert_eq!(reconciler.tick().await, TickOutcome::SkippedWhileSending);
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);

        drop(guard);
        assert!(matches!(reconciler.tick().await, TickOutcome::Applied { .. }));
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn response_arriving_after_teardown_is_ignored() {
        let store = Arc::new(MemoryStore::default());
        store.put_messages("c1", vec![message_at("c1", "m1", MessageRole::Agent, "late", 0)]);
        let gate = Arc::new(Notify::new());
        store.set_fetch_gate(gate.clone());

        let timeline = Arc::new(LiveTimeline::default());
        let cancel = CancellationToken::new();
        let (tx, _rx) = flume::unbounded();
        let reconciler =
            PollingReconciler::new("c1", store.clone(), timeline.clone(), tx, cancel.clone());

        let pending = tokio::spawn(async move { reconciler.tick().await });
        while store.fetches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        gate.notify_one();

        assert_eq!(pending.await.expect("join"), TickOutcome::Cancelled);
        assert!(timeline.snapshot().is_empty());
        assert!(!timeline.human_connected());
    }
}
