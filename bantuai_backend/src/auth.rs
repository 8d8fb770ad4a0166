use std::sync::Arc;

use anyhow::{bail, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::server::ServerState;

/// Bearer-token gate in front of the `/v1` store routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendAuthConfig {
    Bearer(String),
    Disabled,
}

impl BackendAuthConfig {
    pub fn required(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }

    pub fn disabled() -> Self {
        Self::Disabled
    }

    /// Reads `BANTUAI_BACKEND_AUTH_MODE` (`required` by default, or `disabled`)
    /// and `BANTUAI_BACKEND_TOKEN` through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = lookup("BANTUAI_BACKEND_AUTH_MODE").unwrap_or_default();
        let token = lookup("BANTUAI_BACKEND_TOKEN")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        match mode.trim().to_ascii_lowercase().as_str() {
            "" | "required" | "on" | "enabled" | "true" => match token {
                Some(token) => Ok(Self::Bearer(token)),
                None => bail!("BANTUAI_BACKEND_TOKEN is required when auth mode is 'required'"),
            },
            "disabled" | "off" | "false" => {
                tracing::warn!("Backend auth mode is disabled; all store routes are unauthenticated");
                Ok(Self::Disabled)
            }
            other => bail!(
                "Invalid BANTUAI_BACKEND_AUTH_MODE '{}'. Expected 'required' or 'disabled'",
                other
            ),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let expected = match self {
            Self::Disabled => return Ok(()),
            Self::Bearer(token) => token,
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().strip_prefix("Bearer "))
            .map(str::trim);
        if presented == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub(crate) async fn require_bearer(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    state.auth.check(request.headers())?;
    Ok(next.run(request).await)
}
