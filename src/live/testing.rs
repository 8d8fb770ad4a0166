//! In-memory collaborators for the live loop tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bantuai_backend::database::{
    Channel, Conversation, ConversationMode, ConversationStatus, ConversationUpdate, Message,
    MessageRole, NewMessage, Ticket, TicketCategory, TicketPriority, TicketStatus, TicketUpdate,
};
use bantuai_backend::store::{ConversationStore, MessageStore, TicketStore};
use bantuai_backend::webhook::{AdminReply, ReplyNotifier};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0)
        .single()
        .expect("valid base time")
}

pub fn message_at(
    conversation_id: &str,
    id: &str,
    role: MessageRole,
    content: &str,
    offset_secs: i64,
) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        role,
        content: content.to_string(),
        created_at: base_time() + Duration::seconds(offset_secs),
    }
}

pub fn conversation(id: &str, mode: ConversationMode) -> Conversation {
    Conversation {
        id: id.to_string(),
        customer_email: "budi@example.com".to_string(),
        channel: Channel::Web,
        status: ConversationStatus::Active,
        mode,
        assigned_agent: None,
        started_at: base_time(),
        ended_at: None,
        resolved: false,
    }
}

pub fn ticket(id: &str, conversation_id: Option<&str>) -> Ticket {
    Ticket {
        id: id.to_string(),
        conversation_id: conversation_id.map(str::to_string),
        customer_email: "budi@example.com".to_string(),
        category: TicketCategory::WrongItem,
        priority: TicketPriority::Medium,
        status: TicketStatus::Open,
        subject: "Barang tidak sesuai".to_string(),
        description: None,
        assigned_to: None,
        created_at: base_time(),
        resolved_at: None,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<String, Conversation>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    tickets: Mutex<HashMap<String, Ticket>>,
    fetch_gate: Mutex<Option<Arc<Notify>>>,
    pub fetches: AtomicUsize,
    pub fail_fetches: AtomicBool,
    pub fail_updates: AtomicBool,
}

impl MemoryStore {
    pub fn put_conversation(&self, conversation: Conversation) -> Conversation {
        self.conversations
            .lock()
            .expect("lock")
            .insert(conversation.id.clone(), conversation.clone());
        conversation
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations.lock().expect("lock").get(id).cloned()
    }

    pub fn put_ticket(&self, ticket: Ticket) {
        self.tickets
            .lock()
            .expect("lock")
            .insert(ticket.id.clone(), ticket);
    }

    pub fn ticket(&self, id: &str) -> Option<Ticket> {
        self.tickets.lock().expect("lock").get(id).cloned()
    }

    pub fn put_messages(&self, conversation_id: &str, messages: Vec<Message>) {
        self.messages
            .lock()
            .expect("lock")
            .insert(conversation_id.to_string(), messages);
    }

    /// Every later fetch waits for one notification before answering.
    pub fn set_fetch_gate(&self, gate: Arc<Notify>) {
        *self.fetch_gate.lock().expect("lock") = Some(gate);
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.fetch_gate.lock().expect("lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(self
            .messages
            .lock()
            .expect("lock")
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_message(&self, conversation_id: &str, message: NewMessage) -> Result<Message> {
        let mut messages = self.messages.lock().expect("lock");
        let list = messages.entry(conversation_id.to_string()).or_default();
        let stored = Message {
            id: format!("srv-{}", list.len() + 1),
            conversation_id: conversation_id.to_string(),
            role: message.role,
            content: message.content,
            created_at: message.created_at.unwrap_or_else(Utc::now),
        };
        list.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversation(conversation_id))
    }

    async fn save_conversation_update(
        &self,
        conversation_id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("store rejected the update");
        }
        let mut conversations = self.conversations.lock().expect("lock");
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| anyhow!("conversation '{}' not found", conversation_id))?;
        if let Some(mode) = update.mode {
            conversation.mode = mode;
        }
        if let Some(agent) = update.assigned_agent {
            conversation.assigned_agent = agent;
        }
        if let Some(status) = update.status {
            conversation.status = status;
        }
        if let Some(ended_at) = update.ended_at {
            conversation.ended_at = ended_at;
        }
        if let Some(resolved) = update.resolved {
            conversation.resolved = resolved;
        }
        Ok(conversation.clone())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        Ok(self.ticket(ticket_id))
    }

    async fn save_ticket_update(&self, ticket_id: &str, update: TicketUpdate) -> Result<Ticket> {
        if self.fail_updates.load(Ordering::SeqCst) {
            bail!("store rejected the update");
        }
        let mut tickets = self.tickets.lock().expect("lock");
        let ticket = tickets
            .get_mut(ticket_id)
            .ok_or_else(|| anyhow!("ticket '{}' not found", ticket_id))?;
        if let Some(status) = update.status {
            ticket.status = status;
        }
        if let Some(assigned_to) = update.assigned_to {
            ticket.assigned_to = assigned_to;
        }
        if let Some(resolved_at) = update.resolved_at {
            ticket.resolved_at = resolved_at;
        }
        Ok(ticket.clone())
    }
}

/// Records every notification; optionally fails or persists it like the
/// automation backend would.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AdminReply>>,
    persist_to: Option<Arc<dyn MessageStore>>,
    pub attempts: AtomicUsize,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    /// Stores each delivered reply as an agent message.
    pub fn persisting(store: Arc<dyn MessageStore>) -> Self {
        Self {
            persist_to: Some(store),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<AdminReply> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ReplyNotifier for RecordingNotifier {
    async fn notify(&self, reply: AdminReply) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("webhook returned 502 Bad Gateway");
        }
        if let Some(store) = &self.persist_to {
            store
                .append_message(
                    &reply.conversation_id,
                    NewMessage {
                        role: MessageRole::Agent,
                        content: reply.message.clone(),
                        created_at: None,
                    },
                )
                .await?;
        }
        self.sent.lock().expect("lock").push(reply);
        Ok(())
    }
}
