use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Server-side relay for the Talk-to-DB automation so the browser never sees the
/// upstream URL.
pub struct TalkDbProxy {
    http: reqwest::Client,
    upstream: Option<String>,
}

impl TalkDbProxy {
    pub fn new(http: reqwest::Client, upstream: Option<String>) -> Self {
        Self { http, upstream }
    }

    /// `/api/talkdb`, unauthenticated, every method routed so non-POST gets a JSON 405.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/api/talkdb", any(talkdb_proxy))
            .with_state(self)
    }

    async fn forward(&self, upstream: &str, body: &[u8]) -> Result<(StatusCode, String)> {
        let payload: Value =
            serde_json::from_slice(body).context("talkdb request body is not JSON")?;
        let response = self
            .http
            .post(upstream)
            .json(&payload)
            .send()
            .await
            .context("talkdb webhook unreachable")?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .context("talkdb webhook returned an invalid status")?;
        let text = response
            .text()
            .await
            .context("failed to read talkdb webhook body")?;
        Ok((status, text))
    }
}

pub async fn talkdb_proxy(
    State(proxy): State<Arc<TalkDbProxy>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
    }
    let Some(upstream) = proxy.upstream.as_deref() else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook URL not configured",
        );
    };

    match proxy.forward(upstream, &body).await {
        Ok((status, text)) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            text,
        )
            .into_response(),
        Err(error) => {
            tracing::warn!("talkdb proxy failed: {:#}", error);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to reach webhook")
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
