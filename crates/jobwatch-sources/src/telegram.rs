//! Telegram Bot API notifier.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `TELEGRAM_TOKEN`: bot token (required)
//! - `TELEGRAM_CHAT_ID`: destination chat id or `@channel` (required)
//! - `TELEGRAM_API_BASE`: Bot API base URL (default: https://api.telegram.org)

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use jobwatch_core::defaults::{NOTIFY_TIMEOUT_SECS, TELEGRAM_API_BASE};
use jobwatch_core::{DeliveryError, Error, Notifier, Posting, Result, SearchDefinition};

/// Telegram destination and credentials.
#[derive(Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"***")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Read the configuration from environment variables.
    ///
    /// Missing credentials are a startup-fatal configuration error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a variable lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("{key} is not set")))
        };

        let token = required("TELEGRAM_TOKEN")?;
        let chat_id = required("TELEGRAM_CHAT_ID")?;
        let api_base = lookup("TELEGRAM_API_BASE")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| TELEGRAM_API_BASE.to_string());

        Ok(Self {
            token,
            chat_id,
            api_base,
        })
    }

    /// Override the Bot API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Notifier posting HTML messages to a Telegram chat.
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(NOTIFY_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        info!(chat_id = %config.chat_id, "Telegram notifier initialized");
        Ok(Self { client, config })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base.trim_end_matches('/'),
            self.config.token
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn channel_name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip_all, fields(search = %search.key(), posting_id = %posting.id))]
    async fn send(
        &self,
        search: &SearchDefinition,
        posting: &Posting,
    ) -> std::result::Result<(), DeliveryError> {
        let text = render_message(search, posting);
        let request = SendMessageRequest {
            chat_id: &self.config.chat_id,
            text: &text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.send_message_url())
            .json(&request)
            .send()
            .await
            // The error text would embed the token-bearing URL.
            .map_err(|e| DeliveryError::Transient(format!("Request failed: {}", e.without_url())))?;

        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();

        if status.is_success() && body.as_ref().map_or(true, |b| b.ok) {
            debug!("Telegram message delivered");
            return Ok(());
        }

        let description = body
            .and_then(|b| b.description)
            .unwrap_or_else(|| "no description".to_string());
        Err(classify_status(status, &description))
    }
}

fn classify_status(status: StatusCode, description: &str) -> DeliveryError {
    let message = format!("Telegram HTTP {status}: {description}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() || status.is_success()
    {
        DeliveryError::Transient(message)
    } else {
        DeliveryError::Permanent(message)
    }
}

/// Render the HTML alert text for a posting.
pub fn render_message(search: &SearchDefinition, posting: &Posting) -> String {
    let or_dash = |items: &[String]| {
        if items.is_empty() {
            "-".to_string()
        } else {
            escape_html(&items.join(", "))
        }
    };

    let mut text = format!(
        "🚨 <b>New job offer: {title}</b>\n\n\
         🔍 Search: {search}\n\n\
         🏢 Company: {company}\n\
         📍 Location: {location}\n\
         💼 Level: {levels}\n\
         🔧 Technologies: {technologies}\n\
         💰 Salary: {salary}\n\
         🔗 <a href=\"{url}\">Open offer</a>",
        title = escape_html(&posting.title),
        search = escape_html(&search.to_string()),
        company = escape_html(&posting.company),
        location = escape_html(&posting.location),
        levels = or_dash(&posting.seniority),
        technologies = or_dash(&posting.technologies),
        salary = posting
            .salary
            .as_deref()
            .map(escape_html)
            .unwrap_or_else(|| "Not specified".to_string()),
        url = escape_html(&posting.url),
    );

    if let Some(published_at) = posting.published_at {
        text.push_str(&format!(
            "\n\n📅 Published: {}",
            published_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    text
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
