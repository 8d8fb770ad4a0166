use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::database::{
    Channel, ConsoleDatabase, ConversationStatus, Ticket, TicketCategory, TicketFilter,
    TicketStatus,
};

const RECENT_TICKET_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: TicketCategory,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelCount {
    pub channel: Channel,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub total_conversations: usize,
    /// `open` + `in_progress`
    pub open_tickets: usize,
    /// `resolved` + `closed`
    pub resolved_tickets: usize,
    /// Percentage of conversations escalated, one decimal.
    pub escalation_rate: f64,
    pub tickets_by_category: Vec<CategoryCount>,
    pub conversations_by_channel: Vec<ChannelCount>,
    pub recent_tickets: Vec<Ticket>,
}

pub fn escalation_rate(escalated: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (escalated as f64 / total as f64 * 1000.0).round() / 10.0
}

pub fn build_dashboard(db: &ConsoleDatabase) -> Result<DashboardSnapshot> {
    let total_conversations = db.count_conversations(None)?;
    let escalated = db.count_conversations(Some(ConversationStatus::Escalated))?;

    Ok(DashboardSnapshot {
        total_conversations,
        open_tickets: db.count_tickets_in(&[TicketStatus::Open, TicketStatus::InProgress])?,
        resolved_tickets: db.count_tickets_in(&[TicketStatus::Resolved, TicketStatus::Closed])?,
        escalation_rate: escalation_rate(escalated, total_conversations),
        tickets_by_category: db
            .ticket_counts_by_category()?
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect(),
        conversations_by_channel: db
            .conversation_counts_by_channel()?
            .into_iter()
            .map(|(channel, count)| ChannelCount { channel, count })
            .collect(),
        recent_tickets: db.list_tickets(&TicketFilter {
            limit: Some(RECENT_TICKET_COUNT),
            ..TicketFilter::default()
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        ConversationUpdate, NewConversation, NewTicket, TicketPriority, TicketUpdate,
    };

    #[test]
    fn escalation_rate_rounds_to_one_decimal() {
        assert_eq!(escalation_rate(0, 0), 0.0);
        assert_eq!(escalation_rate(1, 3), 33.3);
        assert_eq!(escalation_rate(2, 3), 66.7);
        assert_eq!(escalation_rate(4, 4), 100.0);
    }

    #[test]
    fn dashboard_aggregates_store_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = ConsoleDatabase::new(dir.path().join("store.db")).expect("db");

        for (email, channel) in [
            ("a@example.com", Channel::Web),
            ("b@example.com", Channel::Web),
            ("c@example.com", Channel::WhatsApp),
            ("d@example.com", Channel::WhatsApp),
        ] {
            db.create_conversation(&NewConversation {
                customer_email: email.to_string(),
                channel,
            })
            .expect("conversation");
        }
        let escalated = db.list_conversations(1).expect("list").remove(0);
        db.update_conversation(
            &escalated.id,
            &ConversationUpdate {
                status: Some(ConversationStatus::Escalated),
                ..ConversationUpdate::default()
            },
        )
        .expect("escalate");

        let mut ticket_ids = Vec::new();
        for category in [
            TicketCategory::WrongItem,
            TicketCategory::WrongItem,
            TicketCategory::Other,
        ] {
            let ticket = db
                .create_ticket(&NewTicket {
                    conversation_id: None,
                    customer_email: "a@example.com".to_string(),
                    category,
                    priority: TicketPriority::Medium,
                    subject: "Masalah pesanan".to_string(),
                    description: None,
                })
                .expect("ticket");
            ticket_ids.push(ticket.id);
        }
        db.update_ticket(&ticket_ids[0], &TicketUpdate::resolve(chrono::Utc::now()))
            .expect("resolve");
        db.update_ticket(
            &ticket_ids[1],
            &TicketUpdate::status_change(TicketStatus::InProgress, chrono::Utc::now()),
        )
        .expect("progress");

        let snapshot = build_dashboard(&db).expect("dashboard");
        assert_eq!(snapshot.total_conversations, 4);
        assert_eq!(snapshot.open_tickets, 2);
        assert_eq!(snapshot.resolved_tickets, 1);
        assert_eq!(snapshot.escalation_rate, 25.0);
        assert_eq!(snapshot.recent_tickets.len(), 3);
        assert!(snapshot.tickets_by_category.contains(&CategoryCount {
            category: TicketCategory::WrongItem,
            count: 2,
        }));
        assert!(snapshot.conversations_by_channel.contains(&ChannelCount {
            channel: Channel::WhatsApp,
            count: 2,
        }));
    }
}
