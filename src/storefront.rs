use std::sync::Arc;

use bantuai_backend::webhook::AssistantWebhook;

pub const WELCOME_MESSAGE: &str = "Halo! Selamat datang di GadgetNusa. Ada yang bisa saya bantu hari ini? Silakan tanya tentang produk, harga, atau layanan kami.";
pub const APOLOGY_MESSAGE: &str =
    "Maaf, saya sedang mengalami gangguan. Silakan coba lagi dalam beberapa saat.";
pub const SEND_ERROR: &str = "Maaf, terjadi kesalahan. Silakan coba lagi.";

/// Storefront visitor identity. Generated once and kept across "new chat".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    id: String,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub role: ChatRole,
    pub text: String,
}

impl ChatLine {
    fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Customer-facing chat widget. `send` takes `&mut self`, so a second message
/// cannot start while a reply is outstanding.
pub struct StorefrontChat {
    session: ChatSession,
    assistant: Arc<dyn AssistantWebhook>,
    lines: Vec<ChatLine>,
    error: Option<String>,
}

impl StorefrontChat {
    pub fn open(session: ChatSession, assistant: Arc<dyn AssistantWebhook>) -> Self {
        Self {
            session,
            assistant,
            lines: vec![ChatLine::assistant(WELCOME_MESSAGE)],
            error: None,
        }
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn lines(&self) -> &[ChatLine] {
        &self.lines
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns `false` when the input was blank and nothing was sent.
    pub async fn send(&mut self, input: &mut String) -> bool {
        let text = input.trim().to_string();
        if text.is_empty() {
            return false;
        }

        self.error = None;
        self.lines.push(ChatLine {
            role: ChatRole::User,
            text: text.clone(),
        });
        input.clear();

        match self.assistant.ask_assistant(self.session.id(), &text).await {
            Ok(reply) => self.lines.push(ChatLine::assistant(reply)),
            Err(error) => {
                tracing::warn!("Storefront chat request failed: {:#}", error);
                self.error = Some(SEND_ERROR.to_string());
                self.lines.push(ChatLine::assistant(APOLOGY_MESSAGE));
            }
        }
        true
    }

    pub fn new_chat(&mut self) {
        self.lines = vec![ChatLine::assistant(WELCOME_MESSAGE)];
        self.error = None;
    }
}
