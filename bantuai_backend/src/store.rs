//! Narrow store seams the live conversation loop depends on.
//!
//! The console talks to the backend over HTTP, tests use in-memory fakes and the
//! backend itself implements these directly on [`ConsoleDatabase`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::database::{
    ConsoleDatabase, Conversation, ConversationUpdate, Message, NewMessage, Ticket, TicketUpdate,
};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Full history of one conversation, oldest first.
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    async fn append_message(&self, conversation_id: &str, message: NewMessage) -> Result<Message>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    /// Errors when the conversation does not exist.
    async fn save_conversation_update(
        &self,
        conversation_id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>>;

    /// Errors when the ticket does not exist.
    async fn save_ticket_update(&self, ticket_id: &str, update: TicketUpdate) -> Result<Ticket>;
}

#[async_trait]
impl MessageStore for ConsoleDatabase {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.get_messages_for_conversation(conversation_id)
    }

    async fn append_message(&self, conversation_id: &str, message: NewMessage) -> Result<Message> {
        self.add_message(conversation_id, &message)
    }
}

#[async_trait]
impl ConversationStore for ConsoleDatabase {
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.get_conversation(conversation_id)
    }

    async fn save_conversation_update(
        &self,
        conversation_id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        self.update_conversation(conversation_id, &update)?
            .ok_or_else(|| anyhow!("conversation '{}' not found", conversation_id))
    }
}

#[async_trait]
impl TicketStore for ConsoleDatabase {
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        self.get_ticket(ticket_id)
    }

    async fn save_ticket_update(&self, ticket_id: &str, update: TicketUpdate) -> Result<Ticket> {
        self.update_ticket(ticket_id, &update)?
            .ok_or_else(|| anyhow!("ticket '{}' not found", ticket_id))
    }
}
