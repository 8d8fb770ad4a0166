use bantuai_backend::database::{Conversation, MessageRole, Ticket};
use bantuai_backend::format::{format_date, format_label};

use crate::live::timeline::TimelineEntry;

pub const MODE_SWITCH_MARKER: &str = "──── Switched to human agent ────";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleStyle {
    pub label: &'static str,
    pub side: Side,
}

/// Customers on the left; the assistant and operators answer from the right.
pub fn role_style(role: MessageRole) -> RoleStyle {
    match role {
        MessageRole::Customer => RoleStyle {
            label: "Customer",
            side: Side::Left,
        },
        MessageRole::Assistant => RoleStyle {
            label: "AI",
            side: Side::Right,
        },
        MessageRole::Agent => RoleStyle {
            label: "Admin",
            side: Side::Right,
        },
    }
}

const RIGHT_INDENT: &str = "                ";

/// Plain-text transcript with the hand-off marker before the first agent message.
pub fn render_timeline(entries: &[TimelineEntry], mode_switch_index: Option<usize>) -> String {
    if entries.is_empty() {
        return "Belum ada pesan dalam percakapan ini".to_string();
    }

    let mut out = String::new();
    for (index, entry) in entries.iter().enumerate() {
        if Some(index) == mode_switch_index {
            out.push_str(MODE_SWITCH_MARKER);
            out.push('\n');
        }
        let style = role_style(entry.message.role);
        let indent = match style.side {
            Side::Left => "",
            Side::Right => RIGHT_INDENT,
        };
        let pending = if entry.optimistic { " (mengirim...)" } else { "" };
        out.push_str(&format!(
            "{}[{}] {}{}\n",
            indent,
            style.label.to_uppercase(),
            format_date(Some(entry.message.created_at)),
            pending
        ));
        for line in entry.message.content.lines() {
            out.push_str(indent);
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

pub fn conversation_row(conversation: &Conversation) -> String {
    format!(
        "{}  {:<28} {:<9} {:<10} {:<6} {:<10} {}",
        conversation.id,
        conversation.customer_email,
        conversation.channel,
        format_label(conversation.status.as_str()),
        conversation.mode,
        conversation.assigned_agent.as_deref().unwrap_or("—"),
        format_date(Some(conversation.started_at)),
    )
}

pub fn ticket_row(ticket: &Ticket) -> String {
    format!(
        "{}  {:<8} {:<12} {:<16} {:<40} {}",
        ticket.id,
        format_label(ticket.priority.as_str()),
        format_label(ticket.status.as_str()),
        format_label(ticket.category.as_str()),
        ticket.subject,
        format_date(Some(ticket.created_at)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::testing::message_at;

    fn entry(role: MessageRole, content: &str, offset: i64, optimistic: bool) -> TimelineEntry {
        TimelineEntry {
            message: message_at("c1", &format!("m{}", offset), role, content, offset),
            optimistic,
        }
    }

    #[test]
    fn every_role_has_a_label_and_side() {
        assert_eq!(role_style(MessageRole::Customer).side, Side::Left);
        assert_eq!(role_style(MessageRole::Assistant).label, "AI");
        assert_eq!(role_style(MessageRole::Agent).label, "Admin");
        assert_eq!(role_style(MessageRole::Agent).side, Side::Right);
    }

    #[test]
    fn marker_precedes_first_agent_message() {
        let entries = vec![
            entry(MessageRole::Customer, "Halo", 0, false),
            entry(MessageRole::Assistant, "Ada yang bisa dibantu?", 1, false),
            entry(MessageRole::Agent, "Saya Admin", 2, false),
            entry(MessageRole::Agent, "Sedang dicek", 3, true),
        ];
        let text = render_timeline(&entries, Some(2));
        assert_eq!(text.matches(MODE_SWITCH_MARKER).count(), 1);
        let marker_at = text.find(MODE_SWITCH_MARKER).expect("marker");
        assert!(marker_at > text.find("Ada yang bisa dibantu?").expect("assistant"));
        assert!(marker_at < text.find("Saya Admin").expect("agent"));
        assert!(text.contains("(mengirim...)"));
    }

    #[test]
    fn empty_timeline_has_placeholder() {
        assert_eq!(
            render_timeline(&[], None),
            "Belum ada pesan dalam percakapan ini"
        );
    }
}
