//! Inbound auto-reply bot
//!
//! Consumes inbound-message webhooks, matches senders to a recent campaign
//! touch, and sends a bounded, policy-governed response through the same
//! gateway and delivery ledger as every other send. Replies are at-most-once
//! per inbound message and never queued for retry.

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use outpost_common::types::normalize_phone;
use outpost_storage::models::{CampaignItem, CreateOutboundMessage};
use outpost_storage::repository::{
    CampaignItemRepository, CampaignRepository, InboundMessageRepository, MessageRepository,
    RecipientRepository, SettingsRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::gateway::GatewayClient;

/// Settings-store key holding the bot configuration
pub const SETTINGS_KEY: &str = "autoreply";

/// Name substituted for `{NOMBRE}` when the contact's name is unknown
const NAME_FALLBACK: &str = "amigo/a";

/// Tag marking a recipient who asked to stop receiving messages
const OPT_OUT_TAG: &str = "optout";

fn default_max_auto_replies() -> i32 {
    1
}

fn default_reply_delay_ms() -> i64 {
    2000
}

fn default_lookback_days() -> i64 {
    60
}

fn default_business_hours_start() -> String {
    "09:00".to_string()
}

fn default_business_hours_end() -> String {
    "18:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_reply() -> String {
    "Hola {NOMBRE}, gracias por tu mensaje. En breve te respondemos.".to_string()
}

fn default_out_of_hours_reply() -> String {
    "Hola {NOMBRE}, gracias por escribirnos. Te respondemos en horario de atención.".to_string()
}

fn default_opt_out_reply() -> String {
    "Listo, no vas a recibir más mensajes nuestros.".to_string()
}

fn default_opt_out_keywords() -> String {
    "stop,baja,no enviar,unsubscribe".to_string()
}

/// Bot configuration, stored as a settings blob and re-read on every
/// inbound message so edits take effect without restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub enabled: bool,
    /// Only reply when the sender has a recent campaign touch
    pub only_if_campaign: bool,
    /// Maximum scripted replies per campaign touch
    pub max_auto_replies: i32,
    /// Artificial delay before sending, to appear less automated
    pub reply_delay_ms: i64,
    /// Window for associating an inbound message with a campaign
    pub lookback_days: i64,
    pub business_hours_enabled: bool,
    /// "HH:MM"; the window may wrap past midnight
    pub business_hours_start: String,
    pub business_hours_end: String,
    /// IANA timezone name
    pub timezone: String,
    pub default_reply: String,
    pub out_of_hours_reply: String,
    pub opt_out_reply: String,
    /// Comma-separated, matched case-insensitively as substrings
    pub opt_out_keywords: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            only_if_campaign: true,
            max_auto_replies: default_max_auto_replies(),
            reply_delay_ms: default_reply_delay_ms(),
            lookback_days: default_lookback_days(),
            business_hours_enabled: false,
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
            timezone: default_timezone(),
            default_reply: default_reply(),
            out_of_hours_reply: default_out_of_hours_reply(),
            opt_out_reply: default_opt_out_reply(),
            opt_out_keywords: default_opt_out_keywords(),
        }
    }
}

impl BotConfig {
    /// Build a sanitized config from a stored settings value. Unparseable
    /// blobs fall back to defaults rather than erroring.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut config = value
            .and_then(|v| serde_json::from_value::<BotConfig>(v.clone()).ok())
            .unwrap_or_default();
        config.sanitize();
        config
    }

    /// Clamp numeric fields, restore empty strings to defaults, and drop an
    /// unknown timezone. Applied on every read and write.
    pub fn sanitize(&mut self) {
        self.max_auto_replies = self.max_auto_replies.clamp(0, 10);
        self.reply_delay_ms = self.reply_delay_ms.clamp(0, 60_000);
        self.lookback_days = self.lookback_days.clamp(1, 365);

        if parse_hhmm(&self.business_hours_start).is_none() {
            self.business_hours_start = default_business_hours_start();
        }
        if parse_hhmm(&self.business_hours_end).is_none() {
            self.business_hours_end = default_business_hours_end();
        }
        if self.timezone.parse::<Tz>().is_err() {
            self.timezone = default_timezone();
        }
        if self.default_reply.trim().is_empty() {
            self.default_reply = default_reply();
        }
        if self.out_of_hours_reply.trim().is_empty() {
            self.out_of_hours_reply = default_out_of_hours_reply();
        }
        if self.opt_out_reply.trim().is_empty() {
            self.opt_out_reply = default_opt_out_reply();
        }
        if self.opt_out_keywords.trim().is_empty() {
            self.opt_out_keywords = default_opt_out_keywords();
        }
    }

    /// Whether `now` falls inside the configured business-hours window.
    /// The window may wrap past midnight (e.g. 22:00–06:00).
    pub fn in_business_hours_at(&self, now: DateTime<Utc>) -> bool {
        let tz: Tz = self.timezone.parse().unwrap_or(chrono_tz::UTC);
        let local = now.with_timezone(&tz).time();

        // sanitize() guarantees these parse; fall back to an always-open
        // window if a raw config slipped through
        let Some(start) = parse_hhmm(&self.business_hours_start) else {
            return true;
        };
        let Some(end) = parse_hhmm(&self.business_hours_end) else {
            return true;
        };

        if start <= end {
            local >= start && local < end
        } else {
            local >= start || local < end
        }
    }
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Substitute `{NOMBRE}` with the contact's name, or a generic greeting
/// token when unknown.
pub fn render_template(template: &str, name: Option<&str>) -> String {
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(NAME_FALLBACK);
    template.replace("{NOMBRE}", name)
}

/// Case-insensitive substring match against a comma-separated keyword list
pub fn matches_opt_out(body: &str, keywords: &str) -> bool {
    let body = body.to_lowercase();
    outpost_storage::models::split_tags(keywords)
        .iter()
        .any(|k| body.contains(k.as_str()))
}

/// One normalized inbound text message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    pub provider_message_id: String,
    pub from: String,
    pub body: String,
    pub from_me: bool,
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

fn bool_field(value: &Value, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_bool))
        .unwrap_or(false)
}

fn text_of(value: &Value) -> String {
    value
        .get("text")
        .and_then(|t| t.get("body"))
        .and_then(Value::as_str)
        .or_else(|| str_field(value, &["body", "caption", "content"]))
        .unwrap_or_default()
        .to_string()
}

fn parse_message(value: &Value) -> Option<InboundText> {
    let id = str_field(value, &["id", "message_id"])?;
    let from = str_field(value, &["from", "author", "sender", "chat_id"])?;
    Some(InboundText {
        provider_message_id: id.to_string(),
        from: from.to_string(),
        body: text_of(value),
        from_me: bool_field(value, &["from_me", "fromMe"]),
    })
}

/// Normalize an inbound webhook payload to a list of messages.
///
/// Accepted shapes: `{messages: [...]}`, `{data: {messages: [...]}}`,
/// `{event, data: {...}}`, and a bare message object.
pub fn parse_inbound_messages(payload: &Value) -> Vec<InboundText> {
    let mut rows: Vec<&Value> = Vec::new();

    if let Some(messages) = payload.get("messages").and_then(Value::as_array) {
        rows.extend(messages.iter());
    } else if let Some(data) = payload.get("data") {
        if let Some(messages) = data.get("messages").and_then(Value::as_array) {
            rows.extend(messages.iter());
        } else if data.is_object() {
            rows.push(data);
        }
    } else if payload.is_object() {
        rows.push(payload);
    }

    rows.into_iter().filter_map(parse_message).collect()
}

/// Outcome of one webhook delivery for the bot
#[derive(Debug, Default, Clone, Copy)]
pub struct BotReport {
    /// Messages that passed the dedupe gate
    pub processed: usize,
    /// Auto-replies actually sent
    pub replied: usize,
}

enum Handled {
    Skipped,
    Processed,
    Replied,
}

/// Auto-reply bot service
pub struct AutoReplyBot {
    settings: SettingsRepository,
    items: CampaignItemRepository,
    campaigns: CampaignRepository,
    inbound: InboundMessageRepository,
    messages: MessageRepository,
    recipients: RecipientRepository,
    gateway: Arc<GatewayClient>,
}

impl AutoReplyBot {
    /// Create a new bot over a shared pool
    pub fn new(pool: PgPool, gateway: Arc<GatewayClient>) -> Self {
        Self {
            settings: SettingsRepository::new(pool.clone()),
            items: CampaignItemRepository::new(pool.clone()),
            campaigns: CampaignRepository::new(pool.clone()),
            inbound: InboundMessageRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            recipients: RecipientRepository::new(pool),
            gateway,
        }
    }

    /// Read the sanitized bot configuration from the settings store
    pub async fn load_config(&self) -> Result<BotConfig, sqlx::Error> {
        let value = self.settings.get(SETTINGS_KEY).await?;
        Ok(BotConfig::from_value(value.as_ref()))
    }

    /// Sanitize and persist the bot configuration
    pub async fn save_config(&self, mut config: BotConfig) -> Result<BotConfig, sqlx::Error> {
        config.sanitize();
        let value = serde_json::to_value(&config).unwrap_or_default();
        self.settings.put(SETTINGS_KEY, &value).await?;
        Ok(config)
    }

    /// Process one inbound webhook payload
    pub async fn process_webhook(&self, payload: &Value) -> Result<BotReport, sqlx::Error> {
        let mut report = BotReport::default();

        for message in parse_inbound_messages(payload) {
            match self.handle_message(&message, payload).await? {
                Handled::Skipped => {}
                Handled::Processed => report.processed += 1,
                Handled::Replied => {
                    report.processed += 1;
                    report.replied += 1;
                }
            }
        }

        Ok(report)
    }

    async fn handle_message(
        &self,
        message: &InboundText,
        raw: &Value,
    ) -> Result<Handled, sqlx::Error> {
        // Never react to our own or the operator's outgoing messages
        if message.from_me {
            return Ok(Handled::Skipped);
        }

        let from = normalize_phone(&message.from);
        if from.is_empty() {
            return Ok(Handled::Skipped);
        }

        // Dedupe on provider message id: a webhook retry conflicts here and
        // is dropped entirely
        let Some(inbound) = self
            .inbound
            .insert_dedupe(&message.provider_message_id, &from, Some(message.body.as_str()), raw)
            .await?
        else {
            debug!(provider_id = %message.provider_message_id, "duplicate inbound, skipping");
            return Ok(Handled::Skipped);
        };

        let config = self.load_config().await?;
        if !config.enabled {
            return Ok(Handled::Processed);
        }

        // Associate with the most recent campaign touch and track the reply
        let item = match self
            .items
            .latest_touch_for_phone(&from, config.lookback_days)
            .await?
        {
            Some(item) => {
                let updated = self
                    .items
                    .record_reply_with_link(item.id, inbound.id)
                    .await?
                    .unwrap_or(item);
                self.campaigns.refresh_counters(updated.campaign_id).await?;
                Some(updated)
            }
            None => None,
        };

        // Opt-out wins over everything: not capped, not hour-gated
        if matches_opt_out(&message.body, &config.opt_out_keywords) {
            if let Some(recipient_id) = item.as_ref().and_then(|i| i.recipient_id) {
                let tagged = self.recipients.add_tag(recipient_id, OPT_OUT_TAG).await?;
                if tagged {
                    info!(recipient = %recipient_id, "recipient opted out");
                }
            }
            let name = item.as_ref().and_then(|i| i.name.as_deref());
            let body = render_template(&config.opt_out_reply, name);
            let sent = self
                .send_reply(&from, &body, &message.provider_message_id, &config, item.as_ref())
                .await?;
            return Ok(if sent { Handled::Replied } else { Handled::Processed });
        }

        if item.is_none() && config.only_if_campaign {
            debug!(from = %from, "no recent campaign touch, not replying");
            return Ok(Handled::Processed);
        }

        // Opted-out contacts get opt-out acknowledgements only, never
        // scripted replies
        if let Some(recipient_id) = item.as_ref().and_then(|i| i.recipient_id) {
            if let Some(recipient) = self.recipients.get(recipient_id).await? {
                if recipient.tags_vec().iter().any(|t| t == OPT_OUT_TAG) {
                    debug!(recipient = %recipient_id, "contact opted out, not replying");
                    return Ok(Handled::Processed);
                }
            }
        }

        // Per-contact cap for scripted replies
        if let Some(item) = item.as_ref() {
            if item.auto_reply_count >= config.max_auto_replies {
                debug!(item = %item.id, "auto-reply cap reached");
                return Ok(Handled::Processed);
            }
        }

        let template = if config.business_hours_enabled && !config.in_business_hours_at(Utc::now())
        {
            &config.out_of_hours_reply
        } else {
            &config.default_reply
        };

        let name = item.as_ref().and_then(|i| i.name.as_deref());
        let body = render_template(template, name);

        let sent = self
            .send_reply(&from, &body, &message.provider_message_id, &config, item.as_ref())
            .await?;
        Ok(if sent { Handled::Replied } else { Handled::Processed })
    }

    /// Send one auto-reply through the gateway, recorded in the ledger like
    /// any other send. At-most-once: failures are recorded and never retried.
    async fn send_reply(
        &self,
        to: &str,
        body: &str,
        inbound_provider_id: &str,
        config: &BotConfig,
        item: Option<&CampaignItem>,
    ) -> Result<bool, sqlx::Error> {
        if !self.gateway.is_configured() {
            warn!("gateway not configured, auto-reply suppressed");
            return Ok(false);
        }

        if config.reply_delay_ms > 0 {
            sleep(Duration::from_millis(config.reply_delay_ms as u64)).await;
        }

        let client_ref = format!("autoreply:{}", inbound_provider_id);
        let (entry, created) = self
            .messages
            .create_or_get(CreateOutboundMessage {
                phone: to.to_string(),
                body: body.to_string(),
                client_ref,
                campaign_item_id: item.map(|i| i.id),
            })
            .await?;

        if !created {
            debug!(message = %entry.id, "inbound already answered, skipping");
            return Ok(false);
        }

        match self.gateway.send_text(to, body).await {
            Ok(sent) => {
                self.messages
                    .mark_sent(entry.id, &sent.provider_message_id)
                    .await?;
                if let Some(item) = item {
                    self.items.record_auto_reply(item.id).await?;
                    self.campaigns.refresh_counters(item.campaign_id).await?;
                }
                info!(to = %to, "auto-reply sent");
                Ok(true)
            }
            Err(err) => {
                warn!(to = %to, error = %err, "auto-reply failed");
                self.messages.mark_failed(entry.id, &err.to_string()).await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn sanitize_clamps_numeric_fields() {
        let mut config = BotConfig {
            max_auto_replies: 99,
            reply_delay_ms: -5,
            lookback_days: 0,
            ..Default::default()
        };
        config.sanitize();
        assert_eq!(config.max_auto_replies, 10);
        assert_eq!(config.reply_delay_ms, 0);
        assert_eq!(config.lookback_days, 1);
    }

    #[test]
    fn sanitize_restores_empty_strings() {
        let mut config = BotConfig {
            default_reply: "  ".to_string(),
            opt_out_keywords: String::new(),
            timezone: "Mars/Olympus".to_string(),
            business_hours_start: "25:99".to_string(),
            ..Default::default()
        };
        config.sanitize();
        assert!(!config.default_reply.trim().is_empty());
        assert_eq!(config.opt_out_keywords, default_opt_out_keywords());
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.business_hours_start, "09:00");
    }

    #[test]
    fn from_value_tolerates_garbage() {
        let config = BotConfig::from_value(Some(&json!("not an object")));
        assert!(!config.enabled);

        let config = BotConfig::from_value(Some(&json!({"enabled": true, "max_auto_replies": 50})));
        assert!(config.enabled);
        assert_eq!(config.max_auto_replies, 10);

        let config = BotConfig::from_value(None);
        assert_eq!(config.lookback_days, 60);
    }

    #[test]
    fn business_hours_plain_window() {
        let config = BotConfig {
            business_hours_start: "09:00".to_string(),
            business_hours_end: "18:00".to_string(),
            timezone: "UTC".to_string(),
            ..Default::default()
        };
        let noon = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 5, 2, 22, 0, 0).unwrap();
        assert!(config.in_business_hours_at(noon));
        assert!(!config.in_business_hours_at(night));
    }

    #[test]
    fn business_hours_wraps_midnight() {
        let config = BotConfig {
            business_hours_start: "22:00".to_string(),
            business_hours_end: "06:00".to_string(),
            timezone: "UTC".to_string(),
            ..Default::default()
        };
        let night = Utc.with_ymd_and_hms(2024, 5, 2, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 5, 2, 5, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        assert!(config.in_business_hours_at(night));
        assert!(config.in_business_hours_at(early));
        assert!(!config.in_business_hours_at(noon));
    }

    #[test]
    fn business_hours_respects_timezone() {
        let config = BotConfig {
            business_hours_start: "09:00".to_string(),
            business_hours_end: "18:00".to_string(),
            timezone: "America/Argentina/Buenos_Aires".to_string(),
            ..Default::default()
        };
        // 14:00 UTC is 11:00 in Buenos Aires (UTC-3)
        let morning = Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap();
        // 23:00 UTC is 20:00 in Buenos Aires
        let evening = Utc.with_ymd_and_hms(2024, 5, 2, 23, 0, 0).unwrap();
        assert!(config.in_business_hours_at(morning));
        assert!(!config.in_business_hours_at(evening));
    }

    #[test]
    fn render_template_substitutes_name() {
        assert_eq!(
            render_template("Hola {NOMBRE}!", Some("Ana")),
            "Hola Ana!"
        );
        assert_eq!(
            render_template("Hola {NOMBRE}!", None),
            format!("Hola {}!", NAME_FALLBACK)
        );
        assert_eq!(
            render_template("Hola {NOMBRE}!", Some("  ")),
            format!("Hola {}!", NAME_FALLBACK)
        );
        assert_eq!(render_template("sin token", Some("Ana")), "sin token");
    }

    #[test]
    fn opt_out_matching() {
        let keywords = "stop, baja,no enviar";
        assert!(matches_opt_out("BAJA por favor", keywords));
        assert!(matches_opt_out("quiero que pare, STOP", keywords));
        assert!(matches_opt_out("no enviar mas", keywords));
        assert!(!matches_opt_out("gracias!", keywords));
        assert!(!matches_opt_out("", keywords));
    }

    #[test]
    fn parses_messages_array() {
        let payload = json!({
            "messages": [
                {"id": "in1", "from": "549115555", "text": {"body": "hola"}},
                {"id": "in2", "chat_id": "549116666@c.us", "body": "que tal", "from_me": true}
            ]
        });
        let messages = parse_inbound_messages(&payload);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].body, "hola");
        assert!(!messages[0].from_me);
        assert_eq!(messages[1].from, "549116666@c.us");
        assert!(messages[1].from_me);
    }

    #[test]
    fn parses_nested_and_single_shapes() {
        let nested = json!({"data": {"messages": [{"id": "a", "author": "5491", "caption": "foto"}]}});
        let messages = parse_inbound_messages(&nested);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "foto");

        let single = json!({"event": "message", "data": {"id": "b", "sender": "5492", "content": "hey", "fromMe": false}});
        let messages = parse_inbound_messages(&single);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from, "5492");
        assert_eq!(messages[0].body, "hey");
    }

    #[test]
    fn message_without_sender_is_dropped() {
        let payload = json!({"messages": [{"id": "x", "text": {"body": "hola"}}]});
        assert_eq!(parse_inbound_messages(&payload).len(), 0);
    }
}
