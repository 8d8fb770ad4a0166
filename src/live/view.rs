use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use bantuai_backend::config::ConsoleConfig;
use bantuai_backend::database::{Conversation, ConversationMode};
use bantuai_backend::store::{ConversationStore, MessageStore};
use bantuai_backend::webhook::ReplyNotifier;
use flume::Sender;
use tokio_util::sync::CancellationToken;

use super::mode::ModeSwitcher;
use super::notice::TransientNotice;
use super::reconciler::{PollingReconciler, ReconcilerHandle, TickOutcome};
use super::send::{OptimisticSender, SubmitOutcome};
use super::session::OperatorSession;
use super::timeline::{LiveTimeline, TimelineEntry};

pub const MODE_SWITCH_FAILED_NOTICE: &str = "Gagal mengubah mode percakapan. Silakan coba lagi.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    TimelineChanged,
    HumanConnected,
    ModeChanged(ConversationMode),
    Notice(String),
    NoticeCleared,
}

/// Collaborators shared by every view the operator opens.
#[derive(Clone)]
pub struct LiveServices {
    pub messages: Arc<dyn MessageStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub notifier: Arc<dyn ReplyNotifier>,
    pub session: Arc<OperatorSession>,
    pub poll_interval: Duration,
    pub error_display: Duration,
}

impl LiveServices {
    pub fn from_config<S>(store: Arc<S>, notifier: Arc<dyn ReplyNotifier>, config: &ConsoleConfig) -> Self
    where
        S: MessageStore + ConversationStore + 'static,
    {
        Self {
            messages: store.clone(),
            conversations: store,
            notifier,
            session: Arc::new(OperatorSession::new(config.operator_name.clone())),
            poll_interval: config.poll_interval(),
            error_display: config.error_display(),
        }
    }
}

/// One open conversation: polled timeline, reply box and mode actions.
pub struct ConversationView {
    services: LiveServices,
    conversation: Conversation,
    timeline: Arc<LiveTimeline>,
    notice: TransientNotice,
    events: Sender<ViewEvent>,
    reconciler: PollingReconciler,
    polling: ReconcilerHandle,
    sender: OptimisticSender,
    modes: ModeSwitcher,
}

impl ConversationView {
    pub async fn open(
        services: LiveServices,
        conversation_id: &str,
        events: Sender<ViewEvent>,
    ) -> Result<Self> {
        let conversation = fetch_existing(&services, conversation_id).await?;
        let notice = TransientNotice::new(services.error_display, events.clone());
        let modes = ModeSwitcher::new(
            services.conversations.clone(),
            services.notifier.clone(),
            services.session.clone(),
        );
        let (timeline, reconciler, polling, sender) =
            start_loop(&services, &conversation.id, &notice, &events);

        Ok(Self {
            services,
            conversation,
            timeline,
            notice,
            events,
            reconciler,
            polling,
            sender,
            modes,
        })
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        self.timeline.snapshot()
    }

    pub fn human_connected(&self) -> bool {
        self.timeline.human_connected()
    }

    pub fn mode_switch_index(&self) -> Option<usize> {
        self.timeline.mode_switch_index()
    }

    pub fn error_notice(&self) -> Option<String> {
        self.notice.current()
    }

    /// The reply box is open only while a human handles the conversation.
    pub fn can_reply(&self) -> bool {
        self.conversation.mode == ConversationMode::Human
    }

    pub fn send_reply(&self, draft: &mut String) -> Result<SubmitOutcome> {
        if draft.trim().is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }
        if !self.can_reply() {
            bail!("take over the conversation before replying");
        }
        Ok(self.sender.submit(draft))
    }

    /// Out-of-band poll, same rules as the background loop.
    pub async fn poll_now(&self) -> TickOutcome {
        self.reconciler.tick().await
    }

    pub async fn take_over(&mut self) -> Result<()> {
        let result = self.modes.take_over(&self.conversation).await;
        self.apply_mode_result(result)
    }

    pub async fn return_to_ai(&mut self) -> Result<()> {
        let result = self.modes.return_to_ai(&self.conversation).await;
        self.apply_mode_result(result)
    }

    /// Pick up mode or status changes made elsewhere.
    pub async fn refresh_conversation(&mut self) -> Result<()> {
        let latest = fetch_existing(&self.services, &self.conversation.id).await?;
        if latest.mode != self.conversation.mode {
            let _ = self.events.send(ViewEvent::ModeChanged(latest.mode));
        }
        self.conversation = latest;
        Ok(())
    }

    /// Tear down the current loop and start over on another conversation.
    pub async fn switch_to(&mut self, conversation_id: &str) -> Result<()> {
        let conversation = fetch_existing(&self.services, conversation_id).await?;
        self.polling.stop();

        let (timeline, reconciler, polling, sender) =
            start_loop(&self.services, &conversation.id, &self.notice, &self.events);
        self.timeline = timeline;
        self.reconciler = reconciler;
        self.polling = polling;
        self.sender = sender;
        self.conversation = conversation;
        let _ = self.events.send(ViewEvent::TimelineChanged);
        Ok(())
    }

    pub async fn close(self) {
        self.polling.shutdown().await;
    }

    fn apply_mode_result(&mut self, result: Result<Conversation>) -> Result<()> {
        match result {
            Ok(updated) => {
                self.conversation = updated;
                let _ = self
                    .events
                    .send(ViewEvent::ModeChanged(self.conversation.mode));
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Mode switch failed: {:#}", error);
                self.notice.show(MODE_SWITCH_FAILED_NOTICE);
                Err(error)
            }
        }
    }
}

async fn fetch_existing(services: &LiveServices, conversation_id: &str) -> Result<Conversation> {
    services
        .conversations
        .fetch_conversation(conversation_id)
        .await?
        .ok_or_else(|| anyhow!("conversation '{}' not found", conversation_id))
}

fn start_loop(
    services: &LiveServices,
    conversation_id: &str,
    notice: &TransientNotice,
    events: &Sender<ViewEvent>,
) -> (
    Arc<LiveTimeline>,
    PollingReconciler,
    ReconcilerHandle,
    OptimisticSender,
) {
    let timeline = Arc::new(LiveTimeline::default());
    let reconciler = PollingReconciler::new(
        conversation_id,
        services.messages.clone(),
        timeline.clone(),
        events.clone(),
        CancellationToken::new(),
    );
    let polling = reconciler.clone().spawn(services.poll_interval);
    let sender = OptimisticSender::new(
        conversation_id,
        services.session.clone(),
        timeline.clone(),
        services.notifier.clone(),
        notice.clone(),
        events.clone(),
    );
    (timeline, reconciler, polling, sender)
}
