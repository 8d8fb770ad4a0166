use std::sync::Arc;

use bantuai_backend::database::{Message, MessageRole};
use bantuai_backend::webhook::{AdminReply, ReplyNotifier};
use chrono::Utc;
use flume::Sender;
use tokio::task::JoinHandle;

use super::notice::TransientNotice;
use super::session::OperatorSession;
use super::timeline::LiveTimeline;
use super::view::ViewEvent;

pub const SEND_FAILED_NOTICE: &str = "Gagal mengirim pesan. Silakan coba lagi.";

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Blank draft; nothing appended, nothing sent.
    Ignored,
    Queued {
        client_id: String,
        delivery: JoinHandle<()>,
    },
}

/// Appends the operator's reply locally right away and delivers it through the
/// notifier in the background. Failed deliveries are reported, never rolled back.
#[derive(Clone)]
pub struct OptimisticSender {
    conversation_id: String,
    session: Arc<OperatorSession>,
    timeline: Arc<LiveTimeline>,
    notifier: Arc<dyn ReplyNotifier>,
    notice: TransientNotice,
    events: Sender<ViewEvent>,
}

impl OptimisticSender {
    pub fn new(
        conversation_id: impl Into<String>,
        session: Arc<OperatorSession>,
        timeline: Arc<LiveTimeline>,
        notifier: Arc<dyn ReplyNotifier>,
        notice: TransientNotice,
        events: Sender<ViewEvent>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            session,
            timeline,
            notifier,
            notice,
            events,
        }
    }

    pub fn submit(&self, draft: &mut String) -> SubmitOutcome {
        let content = draft.trim().to_string();
        if content.is_empty() {
            return SubmitOutcome::Ignored;
        }

        let client_id = self.session.next_client_id();
        self.timeline.with(|timeline| {
            timeline.append_optimistic(Message {
                id: client_id.clone(),
                conversation_id: self.conversation_id.clone(),
                role: MessageRole::Agent,
                content: content.clone(),
                created_at: Utc::now(),
            })
        });
        draft.clear();
        let _ = self.events.send(ViewEvent::TimelineChanged);

        let reply = AdminReply {
            conversation_id: self.conversation_id.clone(),
            message: content,
            agent_name: self.session.operator_name().to_string(),
        };
        let in_flight = self.timeline.begin_send();
        let notifier = self.notifier.clone();
        let notice = self.notice.clone();
        let delivery_id = client_id.clone();
        let delivery = tokio::spawn(async move {
            let _in_flight = in_flight;
            match notifier.notify(reply).await {
                Ok(()) => tracing::debug!("Delivered operator reply {}", delivery_id),
                Err(error) => {
                    tracing::warn!("Operator reply {} not delivered: {:#}", delivery_id, error);
                    notice.show(SEND_FAILED_NOTICE);
                }
            }
        });

        SubmitOutcome::Queued {
            client_id,
            delivery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::testing::RecordingNotifier;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        sender: OptimisticSender,
        timeline: Arc<LiveTimeline>,
        notifier: Arc<RecordingNotifier>,
        notice: TransientNotice,
    }

    fn harness() -> Harness {
        let (tx, _rx) = flume::unbounded();
        let timeline = Arc::new(LiveTimeline::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let notice = TransientNotice::new(Duration::from_millis(4000), tx.clone());
        let sender = OptimisticSender::new(
            "c1",
            Arc::new(OperatorSession::new("Admin")),
            timeline.clone(),
            notifier.clone(),
            notice.clone(),
            tx,
        );
        Harness {
            sender,
            timeline,
            notifier,
            notice,
        }
    }

    async fn settle(outcome: SubmitOutcome) -> String {
        match outcome {
            SubmitOutcome::Queued {
                client_id,
                delivery,
            } => {
                delivery.await.expect("delivery task");
                client_id
            }
            SubmitOutcome::Ignored => panic!("expected a queued send"),
        }
    }

    #[tokio::test]
    async fn blank_drafts_are_ignored() {
        let h = harness();
        for blank in ["", "   ", "\n\t"] {
            let mut draft = blank.to_string();
            assert!(matches!(h.sender.submit(&mut draft), SubmitOutcome::Ignored));
            assert_eq!(draft, blank);
        }
        assert!(h.timeline.snapshot().is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn submit_appends_one_agent_entry_and_clears_draft() {
        let h = harness();
        let mut draft = "  Pesanan Anda sedang kami cek  ".to_string();
        let client_id = settle(h.sender.submit(&mut draft)).await;

        assert!(draft.is_empty());
        let entries = h.timeline.snapshot();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].optimistic);
        assert_eq!(entries[0].message.id, client_id);
        assert_eq!(entries[0].message.role, MessageRole::Agent);
        assert_eq!(entries[0].message.content, "Pesanan Anda sedang kami cek");

        let sent = h.notifier.sent();
        assert_eq!(
            sent,
            vec![AdminReply {
                conversation_id: "c1".to_string(),
                message: "Pesanan Anda sedang kami cek".to_string(),
                agent_name: "Admin".to_string(),
            }]
        );
        assert!(!h.timeline.is_sending());
    }

    #[tokio::test]
    async fn failed_delivery_keeps_entry_and_shows_notice() {
        let h = harness();
        h.notifier.fail.store(true, Ordering::SeqCst);

        let mut draft = "Hello".to_string();
        settle(h.sender.submit(&mut draft)).await;

        assert_eq!(h.timeline.snapshot().len(), 1);
        assert_eq!(h.notice.current().as_deref(), Some(SEND_FAILED_NOTICE));
        assert_eq!(h.notifier.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rapid_sends_keep_submission_order_locally() {
        let h = harness();
        let mut first = "satu".to_string();
        let mut second = "dua".to_string();
        let a = h.sender.submit(&mut first);
        let b = h.sender.submit(&mut second);

        let contents: Vec<String> = h
            .timeline
            .snapshot()
            .into_iter()
            .map(|entry| entry.message.content)
            .collect();
        assert_eq!(contents, vec!["satu", "dua"]);
        let first_id = settle(a).await;
        let second_id = settle(b).await;
        assert_ne!(first_id, second_id);
    }
}
