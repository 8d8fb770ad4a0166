use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bantuai_backend::database::{
    Conversation, ConversationMode, ConversationUpdate, Ticket, TicketUpdate,
};
use bantuai_backend::store::{ConversationStore, TicketStore};
use bantuai_backend::webhook::{AdminReply, ReplyNotifier};
use chrono::Utc;

use super::session::OperatorSession;

pub const RETURNED_TO_ASSISTANT: &str = "Percakapan dilanjutkan oleh AI assistant.";

pub fn operator_joined(operator_name: &str) -> String {
    format!("Agent {} telah bergabung dalam percakapan ini.", operator_name)
}

/// Moves a conversation between the assistant and a human operator.
/// The store is written first; the customer-facing notice is best effort.
#[derive(Clone)]
pub struct ModeSwitcher {
    conversations: Arc<dyn ConversationStore>,
    notifier: Arc<dyn ReplyNotifier>,
    session: Arc<OperatorSession>,
}

impl ModeSwitcher {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        notifier: Arc<dyn ReplyNotifier>,
        session: Arc<OperatorSession>,
    ) -> Self {
        Self {
            conversations,
            notifier,
            session,
        }
    }

    pub async fn take_over(&self, conversation: &Conversation) -> Result<Conversation> {
        if conversation.mode == ConversationMode::Human {
            bail!(
                "conversation {} is already handled by {}",
                conversation.id,
                conversation.assigned_agent.as_deref().unwrap_or("an operator")
            );
        }
        let operator = self.session.operator_name();
        let updated = self
            .conversations
            .save_conversation_update(&conversation.id, ConversationUpdate::hand_to_operator(operator))
            .await
            .with_context(|| format!("Failed to take over conversation {}", conversation.id))?;
        tracing::info!("{} took over conversation {}", operator, conversation.id);

        self.announce(&conversation.id, operator_joined(operator)).await;
        Ok(updated)
    }

    pub async fn return_to_ai(&self, conversation: &Conversation) -> Result<Conversation> {
        if conversation.mode == ConversationMode::Automated {
            bail!("conversation {} is already handled by the assistant", conversation.id);
        }
        let updated = self
            .conversations
            .save_conversation_update(&conversation.id, ConversationUpdate::hand_to_assistant())
            .await
            .with_context(|| format!("Failed to return conversation {} to AI", conversation.id))?;
        tracing::info!("Conversation {} returned to the assistant", conversation.id);

        self.announce(&conversation.id, RETURNED_TO_ASSISTANT.to_string())
            .await;
        Ok(updated)
    }

    async fn announce(&self, conversation_id: &str, message: String) {
        let reply = AdminReply {
            conversation_id: conversation_id.to_string(),
            message,
            agent_name: self.session.operator_name().to_string(),
        };
        if let Err(error) = self.notifier.notify(reply).await {
            tracing::warn!(
                "Mode change notice for {} not delivered: {:#}",
                conversation_id,
                error
            );
        }
    }
}

/// What happened to the conversation linked to a resolved ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkedReset {
    NotLinked,
    Reset(Conversation),
    /// The ticket stayed resolved; the conversation could not be handed back.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketResolution {
    pub ticket: Ticket,
    pub linked: LinkedReset,
}

/// Resolving a ticket hands its conversation back to the assistant. No notice
/// is sent to the customer.
#[derive(Clone)]
pub struct TicketResolver {
    tickets: Arc<dyn TicketStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl TicketResolver {
    pub fn new(tickets: Arc<dyn TicketStore>, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            tickets,
            conversations,
        }
    }

    pub async fn resolve(&self, ticket_id: &str) -> Result<TicketResolution> {
        let ticket = self
            .tickets
            .fetch_ticket(ticket_id)
            .await?
            .ok_or_else(|| anyhow!("ticket '{}' not found", ticket_id))?;
        if ticket.status.is_finished() {
            bail!("ticket {} is already {}", ticket.id, ticket.status);
        }

        let ticket = self
            .tickets
            .save_ticket_update(ticket_id, TicketUpdate::resolve(Utc::now()))
            .await
            .with_context(|| format!("Failed to resolve ticket {}", ticket_id))?;

        let linked = match ticket.conversation_id.as_deref() {
            None => LinkedReset::NotLinked,
            Some(conversation_id) => match self
                .conversations
                .save_conversation_update(conversation_id, ConversationUpdate::hand_to_assistant())
                .await
            {
                Ok(conversation) => LinkedReset::Reset(conversation),
                Err(error) => {
                    tracing::warn!(
                        "Ticket {} resolved but conversation {} kept its mode: {:#}",
                        ticket.id,
                        conversation_id,
                        error
                    );
                    LinkedReset::Failed(format!("{:#}", error))
                }
            },
        };

        Ok(TicketResolution { ticket, linked })
    }
}
