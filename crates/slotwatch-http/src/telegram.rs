//! Telegram Bot API notifier.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::{json, Value};
use slotwatch_core::{AvailabilityItem, MonitorConfig, NotifyError, Notifier, SearchWindow, StatusKind};
use tracing::{debug, error, info, warn};

use crate::error::{HttpError, Result};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bot credentials and API location.
#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Overridable for self-hosted Bot API servers and tests.
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Read `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` and optional
    /// `TELEGRAM_API_BASE` from the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let bot_token = get("TELEGRAM_BOT_TOKEN").ok_or(HttpError::MissingConfig("TELEGRAM_BOT_TOKEN"))?;
        let chat_id = get("TELEGRAM_CHAT_ID").ok_or(HttpError::MissingConfig("TELEGRAM_CHAT_ID"))?;
        let config = Self::new(bot_token, chat_id);
        Ok(match get("TELEGRAM_API_BASE") {
            Some(base) => config.with_api_base(base),
            None => config,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

/// Escape legacy-Markdown control characters in user-supplied text.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn status_emoji(kind: StatusKind) -> &'static str {
    match kind {
        StatusKind::Info => "ℹ️",
        StatusKind::Start => "🚀",
        StatusKind::Stop => "⏹️",
        StatusKind::Warning => "⚠️",
        StatusKind::Heartbeat => "🔍",
    }
}

/// Availability alert body (Markdown).
pub fn format_availability(
    items: &[AvailabilityItem],
    search: &SearchWindow,
    booking_url: &str,
    checked_at: DateTime<Local>,
) -> String {
    let sites = items
        .iter()
        .map(|item| {
            format!(
                "🟢 *{}* ({})\n   Date: {}",
                escape_markdown(&item.name),
                escape_markdown(&item.zone),
                item.date
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "🏕️ *Campsite availability*\n📅 {}\n👥 Adults {}, youth {}\n\n{}\n\n⏰ Checked: {}\n🔗 [Book now]({})",
        search.period(),
        search.adults,
        search.youth,
        sites,
        checked_at.format(TIME_FORMAT),
        booking_url
    )
}

/// System notice body (Markdown); heartbeats are plain one-liners.
pub fn format_status(kind: StatusKind, message: &str, at: DateTime<Local>) -> String {
    if kind == StatusKind::Heartbeat {
        return format!("{} {} ({})", status_emoji(kind), message, at.format(TIME_FORMAT));
    }
    format!(
        "{} *System notice*\n\n{}\n\n⏰ {}",
        status_emoji(kind),
        escape_markdown(message),
        at.format(TIME_FORMAT)
    )
}

pub fn format_error(message: &str, at: DateTime<Local>) -> String {
    format!(
        "❌ *System notice*\n\nAn error occurred:\n{}\n\n⏰ {}",
        escape_markdown(message),
        at.format(TIME_FORMAT)
    )
}

/// Delivers notifications through the Telegram Bot API.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
    search: SearchWindow,
    booking_url: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig, monitor: &MonitorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("slotwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()?;

        Ok(Self {
            config,
            client,
            search: monitor.search.clone(),
            booking_url: monitor.target.page_url(),
        })
    }

    async fn call(&self, method: &str, payload: &Value) -> std::result::Result<Value, NotifyError> {
        let response = self
            .client
            .post(self.config.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let reply: ApiReply = response
            .json()
            .await
            .map_err(|e| NotifyError::Transport(format!("unreadable reply (HTTP {status}): {}", e.without_url())))?;

        if !reply.ok {
            return Err(NotifyError::Rejected {
                status: reply.error_code.unwrap_or(status),
                description: reply.description.unwrap_or_else(|| "no description".to_string()),
            });
        }
        Ok(reply.result)
    }

    async fn send_message(
        &self,
        text: &str,
        markdown: bool,
        silent: bool,
    ) -> std::result::Result<(), NotifyError> {
        let mut payload = json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if markdown {
            payload["parse_mode"] = json!("Markdown");
        }
        if silent {
            payload["disable_notification"] = json!(true);
        }
        self.call("sendMessage", &payload).await.map(|_| ())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn test_reachable(&self) -> bool {
        info!("testing Telegram bot connection");
        match self.call("getMe", &json!({})).await {
            Ok(me) => {
                let bot = me
                    .get("username")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown");
                info!(bot, "Telegram bot reachable");
            }
            Err(e) => {
                error!(error = %e, chat_id = %self.config.chat_id, "Telegram bot unreachable");
                return false;
            }
        }

        match self.send_message("🤖 Connection test succeeded", false, true).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, chat_id = %self.config.chat_id, "test message rejected");
                false
            }
        }
    }

    async fn notify(&self, items: &[AvailabilityItem]) -> std::result::Result<(), NotifyError> {
        if items.is_empty() {
            debug!("nothing to notify");
            return Ok(());
        }
        let text = format_availability(items, &self.search, &self.booking_url, Local::now());
        self.send_message(&text, true, false).await?;
        info!(sites = items.len(), "availability alert sent");
        Ok(())
    }

    async fn notify_status(&self, kind: StatusKind, message: &str) -> std::result::Result<(), NotifyError> {
        let text = format_status(kind, message, Local::now());
        let heartbeat = kind == StatusKind::Heartbeat;
        self.send_message(&text, !heartbeat, heartbeat)
            .await
            .inspect_err(|e| warn!(?kind, error = %e, "status message failed"))
    }

    async fn notify_error(&self, message: &str) -> std::result::Result<(), NotifyError> {
        let text = format_error(message, Local::now());
        self.send_message(&text, true, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashMap;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 9, 1, 9, 30, 0).unwrap()
    }

    fn search() -> SearchWindow {
        SearchWindow {
            date_from: NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2025, 9, 9).unwrap(),
            adults: 2,
            youth: 1,
        }
    }

    #[test]
    fn test_availability_message_contents() {
        let items = vec![AvailabilityItem::available(
            "C존 A1",
            "C ZONE",
            NaiveDate::from_ymd_opt(2025, 9, 8).unwrap(),
            "direct_fetch",
        )];
        let text = format_availability(&items, &search(), "https://camp.test/camp/c1", at());

        assert!(text.contains("2025-09-08 ~ 2025-09-09"));
        assert!(text.contains("Adults 2, youth 1"));
        assert!(text.contains("*C존 A1* (C ZONE)"));
        assert!(text.contains("2025-09-01 09:30:00"));
        assert!(text.contains("[Book now](https://camp.test/camp/c1)"));
    }

    #[test]
    fn test_markdown_is_escaped() {
        assert_eq!(escape_markdown("site_1 *new*"), "site\\_1 \\*new\\*");
    }

    #[test]
    fn test_status_formats() {
        let start = format_status(StatusKind::Start, "Monitoring started", at());
        assert!(start.starts_with("🚀 *System notice*"));

        let heartbeat = format_status(StatusKind::Heartbeat, "Still watching", at());
        assert_eq!(heartbeat, "🔍 Still watching (2025-09-01 09:30:00)");

        assert!(format_error("boom", at()).contains("An error occurred:\nboom"));
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "42"),
            ("TELEGRAM_API_BASE", "http://127.0.0.1:9/"),
        ]
        .into_iter()
        .collect();
        let config = TelegramConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.method_url("getMe"), "http://127.0.0.1:9/bot123:abc/getMe");
        assert!(!format!("{:?}", config).contains("abc"));
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let err = TelegramConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, HttpError::MissingConfig("TELEGRAM_BOT_TOKEN")));
    }
}
