use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

pub use crate::auth::BackendAuthConfig;
use crate::auth::require_bearer;
use crate::dashboard::{build_dashboard, DashboardSnapshot};
use crate::database::{
    ConsoleDatabase, Conversation, ConversationUpdate, Message, NewConversation, NewMessage,
    NewTicket, Product, ProductInput, Ticket, TicketFilter, TicketUpdate,
};
use crate::proxy::TalkDbProxy;
use crate::runtime::BackendRuntime;

#[derive(Clone)]
pub struct ServerState {
    pub db: Arc<ConsoleDatabase>,
    pub auth: BackendAuthConfig,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListConversationsQuery {
    limit: Option<usize>,
}

pub async fn serve_backend(runtime: BackendRuntime) -> Result<()> {
    let bind_addr = std::env::var("BANTUAI_BACKEND_BIND")
        .unwrap_or_else(|_| "127.0.0.1:8790".to_string())
        .parse::<SocketAddr>()
        .context("Invalid BANTUAI_BACKEND_BIND (expected host:port)")?;

    let auth = BackendAuthConfig::from_env()?;
    let state = Arc::new(ServerState {
        db: runtime.database.clone(),
        auth,
    });
    let app = build_router(state, runtime.talkdb.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind backend server to {}", bind_addr))?;
    tracing::info!("BantuAI backend listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .await
        .context("Backend server failed")?;
    Ok(())
}

/// `/v1` store API behind bearer auth, plus the public `/api/talkdb` proxy.
pub fn build_router(state: Arc<ServerState>, talkdb: Arc<TalkDbProxy>) -> Router {
    let protected = Router::new()
        .route("/health", get(health))
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/:id",
            get(get_product).put(replace_product).delete(delete_product),
        )
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route("/tickets/:id", get(get_ticket).patch(update_ticket))
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/:id",
            get(get_conversation).patch(update_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(create_message),
        )
        .route("/dashboard", get(get_dashboard))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .nest("/v1", protected)
        .merge(talkdb.router())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ─── Products ───────────────────────────────────────────────────────────────

async fn list_products(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<Product>>, (StatusCode, String)> {
    state.db.list_products().map(Json).map_err(internal_error)
}

async fn create_product(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<ProductInput>,
) -> Result<(StatusCode, Json<Product>), (StatusCode, String)> {
    body.validate().map_err(bad_request)?;
    let product = state.db.create_product(&body).map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn get_product(
    State(state): State<Arc<ServerState>>,
    Path(product_id): Path<String>,
) -> Result<Json<Product>, (StatusCode, String)> {
    state
        .db
        .get_product(&product_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("product '{}' not found", product_id)))
}

async fn replace_product(
    State(state): State<Arc<ServerState>>,
    Path(product_id): Path<String>,
    Json(body): Json<ProductInput>,
) -> Result<Json<Product>, (StatusCode, String)> {
    body.validate().map_err(bad_request)?;
    state
        .db
        .update_product(&product_id, &body)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("product '{}' not found", product_id)))
}

async fn delete_product(
    State(state): State<Arc<ServerState>>,
    Path(product_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state
        .db
        .delete_product(&product_id)
        .map_err(internal_error)?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("product '{}' not found", product_id)))
    }
}

// ─── Tickets ────────────────────────────────────────────────────────────────

async fn list_tickets(
    State(state): State<Arc<ServerState>>,
    Query(mut filter): Query<TicketFilter>,
) -> Result<Json<Vec<Ticket>>, (StatusCode, String)> {
    filter.limit = Some(clamp_limit(filter.limit, 200, 1, 1000));
    state.db.list_tickets(&filter).map(Json).map_err(internal_error)
}

async fn create_ticket(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<NewTicket>,
) -> Result<(StatusCode, Json<Ticket>), (StatusCode, String)> {
    body.validate().map_err(bad_request)?;
    if let Some(conversation_id) = body.linked_conversation() {
        require_conversation(&state, conversation_id)?;
    }
    let ticket = state.db.create_ticket(&body).map_err(internal_error)?;
    tracing::info!("Created ticket {} ({})", ticket.id, ticket.category);
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<Arc<ServerState>>,
    Path(ticket_id): Path<String>,
) -> Result<Json<Ticket>, (StatusCode, String)> {
    state
        .db
        .get_ticket(&ticket_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("ticket '{}' not found", ticket_id)))
}

async fn update_ticket(
    State(state): State<Arc<ServerState>>,
    Path(ticket_id): Path<String>,
    Json(body): Json<TicketUpdate>,
) -> Result<Json<Ticket>, (StatusCode, String)> {
    state
        .db
        .update_ticket(&ticket_id, &body)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("ticket '{}' not found", ticket_id)))
}

// ─── Conversations ──────────────────────────────────────────────────────────

async fn list_conversations(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<Json<Vec<Conversation>>, (StatusCode, String)> {
    let limit = clamp_limit(query.limit, 100, 1, 1000);
    state
        .db
        .list_conversations(limit)
        .map(Json)
        .map_err(internal_error)
}

async fn create_conversation(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<NewConversation>,
) -> Result<(StatusCode, Json<Conversation>), (StatusCode, String)> {
    if body.customer_email.trim().is_empty() {
        return Err(bad_request("customer_email cannot be empty".to_string()));
    }
    let conversation = state
        .db
        .create_conversation(&body)
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn get_conversation(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, (StatusCode, String)> {
    require_conversation(&state, &conversation_id).map(Json)
}

async fn update_conversation(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<ConversationUpdate>,
) -> Result<Json<Conversation>, (StatusCode, String)> {
    let updated = state
        .db
        .update_conversation(&conversation_id, &body)
        .map_err(internal_error)?
        .ok_or_else(|| not_found(format!("conversation '{}' not found", conversation_id)))?;
    if let Some(mode) = body.mode {
        tracing::info!("Conversation {} switched to {}", conversation_id, mode);
    }
    Ok(Json(updated))
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Vec<Message>>, (StatusCode, String)> {
    require_conversation(&state, &conversation_id)?;
    state
        .db
        .get_messages_for_conversation(&conversation_id)
        .map(Json)
        .map_err(internal_error)
}

async fn create_message(
    State(state): State<Arc<ServerState>>,
    Path(conversation_id): Path<String>,
    Json(body): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), (StatusCode, String)> {
    require_conversation(&state, &conversation_id)?;
    if body.content.trim().is_empty() {
        return Err(bad_request("content cannot be empty".to_string()));
    }
    let message = state
        .db
        .add_message(&conversation_id, &body)
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_dashboard(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<DashboardSnapshot>, (StatusCode, String)> {
    build_dashboard(&state.db).map(Json).map_err(internal_error)
}

fn require_conversation(
    state: &ServerState,
    conversation_id: &str,
) -> Result<Conversation, (StatusCode, String)> {
    state
        .db
        .get_conversation(conversation_id)
        .map_err(internal_error)?
        .ok_or_else(|| not_found(format!("conversation '{}' not found", conversation_id)))
}

fn clamp_limit(value: Option<usize>, default: usize, min: usize, max: usize) -> usize {
    value.unwrap_or(default).clamp(min, max)
}

fn bad_request(message: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message)
}

fn not_found(message: String) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, message)
}

fn internal_error(error: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("store request failed: {:#}", error);
    (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
}
