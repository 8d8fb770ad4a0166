use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ConsoleConfig;
use crate::http_client::build_http_client;

/// Body of the admin-reply webhook. Only the response status is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminReply {
    pub conversation_id: String,
    pub message: String,
    pub agent_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistantRequest<'a> {
    session_id: &'a str,
    message: &'a str,
    channel: &'a str,
}

/// Fire-and-forget delivery of operator replies and mode-change notices.
#[async_trait]
pub trait ReplyNotifier: Send + Sync {
    async fn notify(&self, reply: AdminReply) -> Result<()>;
}

/// Automated reply for the storefront widget.
#[async_trait]
pub trait AssistantWebhook: Send + Sync {
    async fn ask_assistant(&self, session_id: &str, message: &str) -> Result<String>;
}

/// n8n webhooks. A missing URL turns the matching call into an error.
#[derive(Clone)]
pub struct AutomationWebhooks {
    http: reqwest::Client,
    chat_url: Option<String>,
    admin_reply_url: Option<String>,
}

impl AutomationWebhooks {
    pub fn new(
        http: reqwest::Client,
        chat_url: Option<String>,
        admin_reply_url: Option<String>,
    ) -> Self {
        Self {
            http,
            chat_url,
            admin_reply_url,
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Result<Self> {
        let http = build_http_client(Some(config.webhook_timeout()))?;
        Ok(Self::new(
            http,
            config.chat_webhook_url.clone(),
            config.admin_reply_webhook_url.clone(),
        ))
    }

    pub async fn send_admin_reply(&self, reply: &AdminReply) -> Result<()> {
        let url = self
            .admin_reply_url
            .as_deref()
            .ok_or_else(|| anyhow!("admin reply webhook URL not configured"))?;
        let response = self
            .http
            .post(url)
            .json(reply)
            .send()
            .await
            .context("admin reply webhook unreachable")?;
        let status = response.status();
        if !status.is_success() {
            bail!("admin reply webhook returned {}", status);
        }
        tracing::debug!(
            "Delivered admin reply for conversation {}",
            reply.conversation_id
        );
        Ok(())
    }

    pub async fn request_assistant_reply(&self, session_id: &str, message: &str) -> Result<String> {
        let url = self
            .chat_url
            .as_deref()
            .ok_or_else(|| anyhow!("chat webhook URL not configured"))?;
        let response = self
            .http
            .post(url)
            .json(&AssistantRequest {
                session_id,
                message,
                channel: "web",
            })
            .send()
            .await
            .context("chat webhook unreachable")?;
        let status = response.status();
        if !status.is_success() {
            bail!("chat webhook returned {}", status);
        }
        let payload: Value = response
            .json()
            .await
            .context("chat webhook returned a non-JSON body")?;
        Ok(extract_reply(&payload))
    }
}

#[async_trait]
impl ReplyNotifier for AutomationWebhooks {
    async fn notify(&self, reply: AdminReply) -> Result<()> {
        self.send_admin_reply(&reply).await
    }
}

#[async_trait]
impl AssistantWebhook for AutomationWebhooks {
    async fn ask_assistant(&self, session_id: &str, message: &str) -> Result<String> {
        self.request_assistant_reply(session_id, message).await
    }
}

/// Reply text from an automated-reply payload: the first truthy of `response`,
/// `output`, `text`, `message`, then a bare string, then the payload as JSON.
pub fn extract_reply(payload: &Value) -> String {
    if let Value::Object(fields) = payload {
        for key in ["response", "output", "text", "message"] {
            if let Some(text) = fields.get(key).and_then(truthy_text) {
                return text;
            }
        }
    }
    match payload {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// JavaScript truthiness: `null`, `false`, `0` and `""` yield `None`; strings
/// come back unquoted, anything else as JSON text.
pub fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().no_proxy().build().expect("client")
    }

    #[test]
    fn extract_reply_follows_field_precedence() {
        assert_eq!(
            extract_reply(&json!({"output": "dari output", "text": "dari text"})),
            "dari output"
        );
        assert_eq!(
            extract_reply(&json!({"response": "", "message": "pesan"})),
            "pesan"
        );
        assert_eq!(extract_reply(&json!("langsung")), "langsung");
        assert_eq!(extract_reply(&json!({"foo": 1})), r#"{"foo":1}"#);
        assert_eq!(extract_reply(&json!([1, 2])), "[1,2]");
    }

    #[tokio::test]
    async fn admin_reply_posts_camel_case_body() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let app = Router::new().route(
            "/admin-reply",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().expect("lock") = Some(body);
                    StatusCode::OK
                }
            }),
        );
        let base = spawn_upstream(app).await;
        let hooks = AutomationWebhooks::new(client(), None, Some(format!("{}/admin-reply", base)));

        hooks
            .notify(AdminReply {
                conversation_id: "c-1".to_string(),
                message: "Hello".to_string(),
                agent_name: "Admin".to_string(),
            })
            .await
            .expect("notify");

        let body = seen.lock().expect("lock").clone().expect("body recorded");
        assert_eq!(
            body,
            json!({"conversationId": "c-1", "message": "Hello", "agentName": "Admin"})
        );
    }

    #[tokio::test]
    async fn admin_reply_fails_on_error_status_or_missing_url() {
        let app = Router::new().route(
            "/admin-reply",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_upstream(app).await;
        let reply = AdminReply {
            conversation_id: "c-1".to_string(),
            message: "Hello".to_string(),
            agent_name: "Admin".to_string(),
        };

        let failing = AutomationWebhooks::new(client(), None, Some(format!("{}/admin-reply", base)));
        assert!(failing.notify(reply.clone()).await.is_err());

        let unconfigured = AutomationWebhooks::new(client(), None, None);
        let error = unconfigured.notify(reply).await.expect_err("no url");
        assert!(error.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn assistant_request_sends_session_and_extracts_reply() {
        let app = Router::new().route(
            "/chat",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["channel"], "web");
                Json(json!({
                    "output": format!("echo {} from {}", body["message"].as_str().unwrap_or(""), body["sessionId"].as_str().unwrap_or(""))
                }))
            }),
        );
        let base = spawn_upstream(app).await;
        let hooks = AutomationWebhooks::new(client(), Some(format!("{}/chat", base)), None);

        let reply = hooks.ask_assistant("sess-1", "halo").await.expect("reply");
        assert_eq!(reply, "echo halo from sess-1");
    }
}
