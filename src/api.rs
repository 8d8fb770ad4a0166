use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use bantuai_backend::dashboard::DashboardSnapshot;
use bantuai_backend::database::{
    Conversation, ConversationUpdate, Message, NewConversation, NewMessage, NewTicket, Product,
    ProductInput, Ticket, TicketFilter, TicketUpdate,
};
use bantuai_backend::http_client::build_http_client;
use bantuai_backend::store::{ConversationStore, MessageStore, TicketStore};

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8790";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the `bantuai_backend` store API and talkdb proxy.
#[derive(Clone)]
pub struct StoreClient {
    http: reqwest::Client,
    base: reqwest::Url,
    base_url: String,
    token: Option<String>,
}

impl StoreClient {
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let base =
            std::env::var("BANTUAI_BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        let token = std::env::var("BANTUAI_BACKEND_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Self::with_timeout(base, token, timeout)
    }

    pub fn new(base_url: String, token: Option<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request, polls included, gives up after `timeout`.
    pub fn with_timeout(base_url: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(&base_url);
        let base = reqwest::Url::parse(&base_url)
            .with_context(|| format!("Invalid backend URL '{}'", base_url))?;
        if base.cannot_be_a_base() {
            bail!("Backend URL '{}' cannot carry a path", base_url);
        }
        Ok(Self {
            http: build_http_client(Some(timeout))?,
            base,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<()> {
        self.request(reqwest::Method::GET, &["v1", "health"])
            .send()
            .await?
            .error_for_status()
            .context("GET /v1/health failed")?;
        Ok(())
    }

    pub async fn dashboard(&self) -> Result<DashboardSnapshot> {
        self.request(reqwest::Method::GET, &["v1", "dashboard"])
            .send()
            .await?
            .error_for_status()
            .context("GET /v1/dashboard failed")?
            .json::<DashboardSnapshot>()
            .await
            .context("Failed to decode dashboard")
    }

    // ─── Products ───────────────────────────────────────────────────────────

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.request(reqwest::Method::GET, &["v1", "products"])
            .send()
            .await?
            .error_for_status()
            .context("GET /v1/products failed")?
            .json::<Vec<Product>>()
            .await
            .context("Failed to decode product list")
    }

    pub async fn get_product(&self, product_id: &str) -> Result<Option<Product>> {
        let response = self
            .request(reqwest::Method::GET, &["v1", "products", product_id])
            .send()
            .await?;
        decode_optional(response, "GET /v1/products/:id").await
    }

    pub async fn create_product(&self, input: &ProductInput) -> Result<Product> {
        self.send_json(reqwest::Method::POST, &["v1", "products"], input)
            .await
    }

    pub async fn update_product(
        &self,
        product_id: &str,
        input: &ProductInput,
    ) -> Result<Option<Product>> {
        let response = self
            .request(reqwest::Method::PUT, &["v1", "products", product_id])
            .json(input)
            .send()
            .await?;
        decode_optional(response, "PUT /v1/products/:id").await
    }

    pub async fn delete_product(&self, product_id: &str) -> Result<bool> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &["v1", "products", product_id],
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response
            .error_for_status()
            .context("DELETE /v1/products/:id failed")?;
        Ok(true)
    }

    // ─── Tickets ────────────────────────────────────────────────────────────

    pub async fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>> {
        self.request(reqwest::Method::GET, &["v1", "tickets"])
            .query(filter)
            .send()
            .await?
            .error_for_status()
            .context("GET /v1/tickets failed")?
            .json::<Vec<Ticket>>()
            .await
            .context("Failed to decode ticket list")
    }

    pub async fn get_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        let response = self
            .request(reqwest::Method::GET, &["v1", "tickets", ticket_id])
            .send()
            .await?;
        decode_optional(response, "GET /v1/tickets/:id").await
    }

    pub async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket> {
        self.send_json(reqwest::Method::POST, &["v1", "tickets"], ticket)
            .await
    }

    pub async fn update_ticket(
        &self,
        ticket_id: &str,
        update: &TicketUpdate,
    ) -> Result<Option<Ticket>> {
        let response = self
            .request(reqwest::Method::PATCH, &["v1", "tickets", ticket_id])
            .json(update)
            .send()
            .await?;
        decode_optional(response, "PATCH /v1/tickets/:id").await
    }

    // ─── Conversations ──────────────────────────────────────────────────────

    pub async fn list_conversations(&self, limit: usize) -> Result<Vec<Conversation>> {
        let response = self
            .request(reqwest::Method::GET, &["v1", "conversations"])
            .query(&[("limit", limit)])
            .send()
            .await?
            .error_for_status()
            .context("GET /v1/conversations failed")?;

        let body = response
            .text()
            .await
            .context("Failed to read conversation list payload")?;
        serde_json::from_str::<Vec<Conversation>>(&body).context(format!(
            "Failed to decode conversation list. Payload preview: {}",
            body.chars().take(500).collect::<String>()
        ))
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let response = self
            .request(
                reqwest::Method::GET,
                &["v1", "conversations", conversation_id],
            )
            .send()
            .await?;
        decode_optional(response, "GET /v1/conversations/:id").await
    }

    pub async fn create_conversation(&self, new: &NewConversation) -> Result<Conversation> {
        self.send_json(reqwest::Method::POST, &["v1", "conversations"], new)
            .await
    }

    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        update: &ConversationUpdate,
    ) -> Result<Option<Conversation>> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &["v1", "conversations", conversation_id],
            )
            .json(update)
            .send()
            .await?;
        decode_optional(response, "PATCH /v1/conversations/:id").await
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.request(
            reqwest::Method::GET,
            &["v1", "conversations", conversation_id, "messages"],
        )
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("GET /v1/conversations/{}/messages failed", conversation_id))?
        .json::<Vec<Message>>()
        .await
        .context("Failed to decode message history")
    }

    pub async fn add_message(&self, conversation_id: &str, message: &NewMessage) -> Result<Message> {
        self.send_json(
            reqwest::Method::POST,
            &["v1", "conversations", conversation_id, "messages"],
            message,
        )
        .await
    }

    // ─── Talk to DB ─────────────────────────────────────────────────────────

    /// Raw answer payload from the `/api/talkdb` proxy.
    pub async fn ask_talkdb(&self, query: &str) -> Result<Value> {
        #[derive(Serialize)]
        struct TalkDbRequest<'a> {
            query: &'a str,
        }

        let response = self
            .http
            .post(self.url(&["api", "talkdb"]))
            .json(&TalkDbRequest { query })
            .send()
            .await
            .context("talkdb proxy unreachable")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::debug!("talkdb proxy answered {}: {}", status, detail.trim());
            bail!("Request failed with status {}", status.as_u16());
        }
        response
            .json::<Value>()
            .await
            .context("talkdb proxy returned a non-JSON body")
    }

    async fn send_json<B, T>(
        &self,
        method: reqwest::Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = segments.join("/");
        let response = self
            .request(method.clone(), segments)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("{} /{} failed ({}): {}", method, path, status, detail.trim());
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to decode {} /{} response", method, path))
    }

    /// Each segment is percent-encoded, so ids cannot escape their route.
    fn url(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, segments: &[&str]) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.url(segments));
        if let Some(token) = self.token.as_deref() {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

async fn decode_optional<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<Option<T>> {
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    response
        .error_for_status()
        .with_context(|| format!("{} failed", what))?
        .json::<T>()
        .await
        .map(Some)
        .with_context(|| format!("Failed to decode {} response", what))
}

#[async_trait]
impl MessageStore for StoreClient {
    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.list_messages(conversation_id).await
    }

    async fn append_message(&self, conversation_id: &str, message: NewMessage) -> Result<Message> {
        self.add_message(conversation_id, &message).await
    }
}

#[async_trait]
impl ConversationStore for StoreClient {
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        self.get_conversation(conversation_id).await
    }

    async fn save_conversation_update(
        &self,
        conversation_id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        self.update_conversation(conversation_id, &update)
            .await?
            .ok_or_else(|| anyhow!("conversation '{}' not found", conversation_id))
    }
}

#[async_trait]
impl TicketStore for StoreClient {
    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Option<Ticket>> {
        self.get_ticket(ticket_id).await
    }

    async fn save_ticket_update(&self, ticket_id: &str, update: TicketUpdate) -> Result<Ticket> {
        self.update_ticket(ticket_id, &update)
            .await?
            .ok_or_else(|| anyhow!("ticket '{}' not found", ticket_id))
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_BACKEND_URL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_backend {
    use std::sync::Arc;

    use bantuai_backend::database::ConsoleDatabase;
    use bantuai_backend::proxy::TalkDbProxy;
    use bantuai_backend::server::{build_router, BackendAuthConfig, ServerState};

    /// Real backend on an ephemeral port. Keep the `TempDir` alive for the test.
    pub(crate) async fn spawn(
        token: Option<&str>,
        talkdb_upstream: Option<String>,
    ) -> (tempfile::TempDir, Arc<ConsoleDatabase>, String) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(ConsoleDatabase::new(dir.path().join("store.db")).expect("db"));
        let auth = match token {
            Some(token) => BackendAuthConfig::required(token),
            None => BackendAuthConfig::disabled(),
        };
        let state = Arc::new(ServerState {
            db: db.clone(),
            auth,
        });
        let http = reqwest::Client::builder().no_proxy().build().expect("client");
        let app = build_router(state, Arc::new(TalkDbProxy::new(http, talkdb_upstream)));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (dir, db, format!("http://{}", addr))
    }
}
