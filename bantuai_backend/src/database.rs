use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Declares a closed string-backed enum with its wire/store spelling.
/// Unknown spellings are rejected instead of falling back to a default variant.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                $(
                    if raw.eq_ignore_ascii_case($text) $(|| raw.eq_ignore_ascii_case($alias))* {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
                Self::parse(raw).ok_or_else(|| {
                    let known: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                    format!("unknown value '{}' (expected one of: {})", raw, known.join(", "))
                })
            }
        }
    };
}

closed_enum! {
    /// Where the customer reached us.
    pub enum Channel {
        Web => "web",
        WhatsApp => "WhatsApp",
    }
}

closed_enum! {
    pub enum ConversationStatus {
        Active => "active",
        Closed => "closed",
        Escalated => "escalated",
    }
}

closed_enum! {
    /// Who produces replies. The store spells the automated mode `ai`.
    pub enum ConversationMode {
        Automated => "ai" | "automated",
        Human => "human",
    }
}

closed_enum! {
    pub enum MessageRole {
        Customer => "customer",
        Assistant => "assistant",
        Agent => "agent",
    }
}

closed_enum! {
    pub enum TicketCategory {
        ProductDefect => "product_defect",
        WrongItem => "wrong_item",
        ShippingDelay => "shipping_delay",
        PaymentIssue => "payment_issue",
        ReturnRequest => "return_request",
        GeneralInquiry => "general_inquiry",
        Other => "other",
    }
}

closed_enum! {
    pub enum TicketPriority {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

closed_enum! {
    pub enum TicketStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
}

closed_enum! {
    pub enum ProductCategory {
        Smartphone => "smartphone",
        Laptop => "laptop",
        Earbuds => "earbuds",
    }
}

closed_enum! {
    pub enum ProductSegment {
        Budget => "budget",
        MidRange => "mid-range",
        Premium => "premium",
        Gaming => "gaming",
    }
}

impl TicketStatus {
    /// Resolved and closed tickets no longer accept a resolve action.
    pub fn is_finished(self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub customer_email: String,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub mode: ConversationMode,
    pub assigned_agent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    pub customer_email: String,
    pub channel: Channel,
}

/// Partial conversation update. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ConversationMode>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "patch_field::deserialize"
    )]
    pub assigned_agent: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "patch_field::deserialize"
    )]
    pub ended_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
}

impl ConversationUpdate {
    pub fn hand_to_operator(operator: &str) -> Self {
        Self {
            mode: Some(ConversationMode::Human),
            assigned_agent: Some(Some(operator.to_string())),
            ..Self::default()
        }
    }

    pub fn hand_to_assistant() -> Self {
        Self {
            mode: Some(ConversationMode::Automated),
            assigned_agent: Some(None),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    /// Automation systems may stamp their own time; otherwise the store does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub conversation_id: Option<String>,
    pub customer_email: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub subject: String,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub customer_email: String,
    #[serde(default = "default_ticket_category")]
    pub category: TicketCategory,
    #[serde(default = "default_ticket_priority")]
    pub priority: TicketPriority,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_ticket_category() -> TicketCategory {
    TicketCategory::GeneralInquiry
}

fn default_ticket_priority() -> TicketPriority {
    TicketPriority::Medium
}

impl NewTicket {
    /// Trimmed conversation id; blank means the ticket stands alone.
    pub fn linked_conversation(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("subject cannot be empty".to_string());
        }
        if self.customer_email.trim().is_empty() {
            return Err("customer_email cannot be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "patch_field::deserialize"
    )]
    pub assigned_to: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "patch_field::deserialize"
    )]
    pub resolved_at: Option<Option<DateTime<Utc>>>,
}

impl TicketUpdate {
    /// Status edit from the ticket view; picking `resolved` stamps the time.
    pub fn status_change(status: TicketStatus, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            resolved_at: (status == TicketStatus::Resolved).then_some(Some(now)),
            ..Self::default()
        }
    }

    pub fn resolve(now: DateTime<Utc>) -> Self {
        Self::status_change(TicketStatus::Resolved, now)
    }

    /// Blank input clears the assignment.
    pub fn assign(assignee: &str) -> Self {
        let assignee = assignee.trim();
        Self {
            assigned_to: Some((!assignee.is_empty()).then(|| assignee.to_string())),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TicketCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TicketPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub sku: String,
    pub name: String,
    pub category: ProductCategory,
    pub brand: String,
    /// Whole Rupiah.
    pub price: i64,
    pub segment: Option<ProductSegment>,
    pub in_stock: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub sku: String,
    pub name: String,
    pub category: ProductCategory,
    pub brand: String,
    pub price: i64,
    #[serde(default)]
    pub segment: Option<ProductSegment>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
}

fn default_in_stock() -> bool {
    true
}

impl ProductInput {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.sku.trim().is_empty() {
            return Err("sku cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if self.brand.trim().is_empty() {
            return Err("brand cannot be empty".to_string());
        }
        if self.price < 0 {
            return Err("price cannot be negative".to_string());
        }
        Ok(())
    }
}

mod patch_field {
    use serde::{Deserialize, Deserializer};

    /// Present-but-null becomes `Some(None)`; absence is handled by `#[serde(default)]`.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, customer_email, channel, status, mode, assigned_agent, started_at, ended_at, resolved";
const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, created_at";
const TICKET_COLUMNS: &str = "id, conversation_id, customer_email, category, priority, status, \
     subject, description, assigned_to, created_at, resolved_at";
const PRODUCT_COLUMNS: &str =
    "id, sku, name, category, brand, price, segment, in_stock, created_at";

pub struct ConsoleDatabase {
    conn: Mutex<Connection>,
}

impl ConsoleDatabase {
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Database lock poisoned: {}", e))
    }

    /// Create or open the database
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                sku TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                brand TEXT NOT NULL,
                price INTEGER NOT NULL,
                segment TEXT,
                in_stock INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                customer_email TEXT NOT NULL,
                channel TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                mode TEXT NOT NULL DEFAULT 'ai',
                assigned_agent TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                resolved INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                conversation_id TEXT,
                customer_email TEXT NOT NULL,
                category TEXT NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                subject TEXT NOT NULL,
                description TEXT,
                assigned_to TEXT,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_tickets_created_at ON tickets(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_tickets_conversation ON tickets(conversation_id);
            CREATE INDEX IF NOT EXISTS idx_conversations_started_at
                ON conversations(started_at DESC);"#,
        )
        .context("Failed to create schema")?;
        Ok(())
    }

    // ─── Conversations ──────────────────────────────────────────────────────

    pub fn create_conversation(&self, new: &NewConversation) -> Result<Conversation> {
        let email = new.customer_email.trim();
        if email.is_empty() {
            bail!("customer_email cannot be empty");
        }
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            customer_email: email.to_string(),
            channel: new.channel,
            status: ConversationStatus::Active,
            mode: ConversationMode::Automated,
            assigned_agent: None,
            started_at: now(),
            ended_at: None,
            resolved: false,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO conversations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                CONVERSATION_COLUMNS
            ),
            params![
                conversation.id,
                conversation.customer_email,
                conversation.channel.as_str(),
                conversation.status.as_str(),
                conversation.mode.as_str(),
                conversation.assigned_agent,
                db_timestamp(&conversation.started_at),
                Option::<String>::None,
                0,
            ],
        )?;
        Ok(conversation)
    }

    /// Newest conversations first.
    pub fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations ORDER BY started_at DESC LIMIT ?1",
            CONVERSATION_COLUMNS
        ))?;
        let conversations = stmt
            .query_map([limit], conversation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
            [id],
            conversation_from_row,
        )
        .optional()
        .context("Failed to load conversation")
    }

    /// Apply a partial update. Returns `None` when the conversation does not exist.
    pub fn update_conversation(
        &self,
        id: &str,
        update: &ConversationUpdate,
    ) -> Result<Option<Conversation>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(mode) = update.mode {
            sets.push("mode = ?");
            values.push(text(mode.as_str()));
        }
        if let Some(agent) = &update.assigned_agent {
            sets.push("assigned_agent = ?");
            values.push(nullable_text(agent.as_deref()));
        }
        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(text(status.as_str()));
        }
        if let Some(ended_at) = &update.ended_at {
            sets.push("ended_at = ?");
            values.push(nullable_text(ended_at.map(|t| db_timestamp(&t)).as_deref()));
        }
        if let Some(resolved) = update.resolved {
            sets.push("resolved = ?");
            values.push(Value::Integer(resolved as i64));
        }

        if sets.is_empty() {
            return self.get_conversation(id);
        }

        values.push(text(id));
        let changed = {
            let conn = self.lock_conn()?;
            conn.execute(
                &format!("UPDATE conversations SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.get_conversation(id)
    }

    pub fn count_conversations(&self, status: Option<ConversationStatus>) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = match status {
            Some(status) => conn.query_row(
                "SELECT COUNT(*) FROM conversations WHERE status = ?1",
                [status.as_str()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    pub fn conversation_counts_by_channel(&self) -> Result<Vec<(Channel, usize)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel, COUNT(*) FROM conversations GROUP BY channel ORDER BY channel",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((
                    enum_column(row, 0, Channel::parse)?,
                    row.get::<_, i64>(1)? as usize,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ─── Messages ───────────────────────────────────────────────────────────

    /// Whole history of one conversation, oldest first. Equal timestamps keep
    /// insertion order.
    pub fn get_messages_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
            MESSAGE_COLUMNS
        ))?;
        let messages = stmt
            .query_map([conversation_id], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    pub fn add_message(&self, conversation_id: &str, new: &NewMessage) -> Result<Message> {
        let content = new.content.trim();
        if content.is_empty() {
            bail!("message content cannot be empty");
        }
        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: new.role,
            content: content.to_string(),
            created_at: new
                .created_at
                .map(|t| t.trunc_subsecs(6))
                .unwrap_or_else(now),
        };

        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO messages ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
                MESSAGE_COLUMNS
            ),
            params![
                message.id,
                message.conversation_id,
                message.role.as_str(),
                message.content,
                db_timestamp(&message.created_at),
            ],
        )?;
        Ok(message)
    }

    // ─── Tickets ────────────────────────────────────────────────────────────

    pub fn create_ticket(&self, new: &NewTicket) -> Result<Ticket> {
        if let Err(reason) = new.validate() {
            bail!(reason);
        }
        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: new.linked_conversation().map(str::to_string),
            customer_email: new.customer_email.trim().to_string(),
            category: new.category,
            priority: new.priority,
            status: TicketStatus::Open,
            subject: new.subject.trim().to_string(),
            description: new
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            assigned_to: None,
            created_at: now(),
            resolved_at: None,
        };

        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO tickets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                TICKET_COLUMNS
            ),
            params![
                ticket.id,
                ticket.conversation_id,
                ticket.customer_email,
                ticket.category.as_str(),
                ticket.priority.as_str(),
                ticket.status.as_str(),
                ticket.subject,
                ticket.description,
                ticket.assigned_to,
                db_timestamp(&ticket.created_at),
                Option::<String>::None,
            ],
        )?;
        Ok(ticket)
    }

    /// Newest tickets first, narrowed by whichever filter fields are set.
    pub fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(text(status.as_str()));
        }
        if let Some(category) = filter.category {
            clauses.push("category = ?");
            values.push(text(category.as_str()));
        }
        if let Some(priority) = filter.priority {
            clauses.push("priority = ?");
            values.push(text(priority.as_str()));
        }
        if let Some(conversation_id) = &filter.conversation_id {
            clauses.push("conversation_id = ?");
            values.push(text(conversation_id));
        }

        let mut sql = format!("SELECT {} FROM tickets", TICKET_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let tickets = stmt
            .query_map(params_from_iter(values), ticket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    pub fn get_ticket(&self, id: &str) -> Result<Option<Ticket>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS),
            [id],
            ticket_from_row,
        )
        .optional()
        .context("Failed to load ticket")
    }

    pub fn update_ticket(&self, id: &str, update: &TicketUpdate) -> Result<Option<Ticket>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            values.push(text(status.as_str()));
        }
        if let Some(assigned_to) = &update.assigned_to {
            sets.push("assigned_to = ?");
            values.push(nullable_text(assigned_to.as_deref()));
        }
        if let Some(resolved_at) = &update.resolved_at {
            sets.push("resolved_at = ?");
            values.push(nullable_text(
                resolved_at.map(|t| db_timestamp(&t)).as_deref(),
            ));
        }

        if sets.is_empty() {
            return self.get_ticket(id);
        }

        values.push(text(id));
        let changed = {
            let conn = self.lock_conn()?;
            conn.execute(
                &format!("UPDATE tickets SET {} WHERE id = ?", sets.join(", ")),
                params_from_iter(values),
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.get_ticket(id)
    }

    pub fn count_tickets_in(&self, statuses: &[TicketStatus]) -> Result<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM tickets WHERE status IN ({})",
                placeholders
            ),
            params_from_iter(statuses.iter().map(|s| s.as_str())),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn ticket_counts_by_category(&self) -> Result<Vec<(TicketCategory, usize)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM tickets GROUP BY category ORDER BY category",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((
                    enum_column(row, 0, TicketCategory::parse)?,
                    row.get::<_, i64>(1)? as usize,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    // ─── Products ───────────────────────────────────────────────────────────

    /// Newest products first.
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM products ORDER BY created_at DESC",
            PRODUCT_COLUMNS
        ))?;
        let products = stmt
            .query_map([], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }

    pub fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            &format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS),
            [id],
            product_from_row,
        )
        .optional()
        .context("Failed to load product")
    }

    pub fn create_product(&self, input: &ProductInput) -> Result<Product> {
        if let Err(reason) = input.validate() {
            bail!(reason);
        }
        let product = Product {
            id: uuid::Uuid::new_v4().to_string(),
            sku: input.sku.trim().to_string(),
            name: input.name.trim().to_string(),
            category: input.category,
            brand: input.brand.trim().to_string(),
            price: input.price,
            segment: input.segment,
            in_stock: input.in_stock,
            created_at: now(),
        };

        let conn = self.lock_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO products ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                PRODUCT_COLUMNS
            ),
            params![
                product.id,
                product.sku,
                product.name,
                product.category.as_str(),
                product.brand,
                product.price,
                product.segment.map(ProductSegment::as_str),
                product.in_stock as i64,
                db_timestamp(&product.created_at),
            ],
        )?;
        Ok(product)
    }

    pub fn update_product(&self, id: &str, input: &ProductInput) -> Result<Option<Product>> {
        if let Err(reason) = input.validate() {
            bail!(reason);
        }
        let changed = {
            let conn = self.lock_conn()?;
            conn.execute(
                "UPDATE products
                 SET sku = ?2, name = ?3, category = ?4, brand = ?5, price = ?6,
                     segment = ?7, in_stock = ?8
                 WHERE id = ?1",
                params![
                    id,
                    input.sku.trim(),
                    input.name.trim(),
                    input.category.as_str(),
                    input.brand.trim(),
                    input.price,
                    input.segment.map(ProductSegment::as_str),
                    input.in_stock as i64,
                ],
            )?
        };
        if changed == 0 {
            return Ok(None);
        }
        self.get_product(id)
    }

    /// Returns whether a row was removed.
    pub fn delete_product(&self, id: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let removed = conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }
}

/// Current time at the precision the store keeps, so returned records compare
/// equal to what a later read produces.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn db_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn nullable_text(value: Option<&str>) -> Value {
    value.map(text).unwrap_or(Value::Null)
}

fn conversion_error(
    idx: usize,
    error: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, error)
}

fn enum_column<T>(row: &Row<'_>, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unrecognized value '{}'", raw).into()))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: chrono::ParseError| conversion_error(idx, Box::new(e)))
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: chrono::ParseError| conversion_error(idx, Box::new(e))),
        None => Ok(None),
    }
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        customer_email: row.get(1)?,
        channel: enum_column(row, 2, Channel::parse)?,
        status: enum_column(row, 3, ConversationStatus::parse)?,
        mode: enum_column(row, 4, ConversationMode::parse)?,
        assigned_agent: row.get(5)?,
        started_at: timestamp_column(row, 6)?,
        ended_at: optional_timestamp_column(row, 7)?,
        resolved: row.get::<_, i64>(8)? != 0,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: enum_column(row, 2, MessageRole::parse)?,
        content: row.get(3)?,
        created_at: timestamp_column(row, 4)?,
    })
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        customer_email: row.get(2)?,
        category: enum_column(row, 3, TicketCategory::parse)?,
        priority: enum_column(row, 4, TicketPriority::parse)?,
        status: enum_column(row, 5, TicketStatus::parse)?,
        subject: row.get(6)?,
        description: row.get(7)?,
        assigned_to: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
        resolved_at: optional_timestamp_column(row, 10)?,
    })
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let segment = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(ProductSegment::parse(&raw).ok_or_else(|| {
            conversion_error(6, format!("unrecognized value '{}'", raw).into())
        })?),
        None => None,
    };
    Ok(Product {
        id: row.get(0)?,
        sku: row.get(1)?,
        name: row.get(2)?,
        category: enum_column(row, 3, ProductCategory::parse)?,
        brand: row.get(4)?,
        price: row.get(5)?,
        segment,
        in_stock: row.get::<_, i64>(7)? != 0,
        created_at: timestamp_column(row, 8)?,
    })
}
