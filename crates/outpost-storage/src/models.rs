//! Database models

use chrono::{DateTime, Utc};
use outpost_common::types::{
    BlockId, CampaignId, CampaignItemId, InboundMessageId, MessageId, RecipientId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Recipient block model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub description: Option<String>,
    /// Soft capacity hint shown in the console; never enforced
    pub capacity: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create block input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBlock {
    pub name: String,
    pub description: Option<String>,
    pub capacity: Option<i32>,
}

/// Recipient model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub block_id: Option<BlockId>,
    pub phone: String,
    pub name: Option<String>,
    /// Comma-separated tag list, matched case-insensitively
    pub tags: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    /// Get tags as a trimmed, lowercased vector
    pub fn tags_vec(&self) -> Vec<String> {
        split_tags(&self.tags)
    }
}

/// Split a comma-separated tag list into trimmed, lowercased entries
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Create recipient input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecipient {
    pub block_id: Option<BlockId>,
    pub phone: String,
    pub name: Option<String>,
    pub tags: Option<String>,
}

/// Update recipient input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRecipient {
    pub block_id: Option<BlockId>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub tags: Option<String>,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Running,
    Paused,
    Done,
    Cancelled,
    Failed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Running => write!(f, "running"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Done => write!(f, "done"),
            CampaignStatus::Cancelled => write!(f, "cancelled"),
            CampaignStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(CampaignStatus::Running),
            "paused" => Ok(CampaignStatus::Paused),
            "done" => Ok(CampaignStatus::Done),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    /// Message body; `{NOMBRE}` is substituted per recipient at send time
    pub body: String,
    pub block_id: Option<BlockId>,
    pub tag_filter: Option<String>,
    pub match_all_tags: bool,
    pub delay_ms: i32,
    pub max_retries: i32,
    pub status: String,
    pub total: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    pub done_count: i32,
    pub replied_count: i32,
    pub auto_replied_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Calculate progress percentage
    pub fn progress_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.done_count as f64 / self.total as f64) * 100.0
        }
    }
}

/// Create campaign input (already clamped by the dispatcher)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub name: String,
    pub body: String,
    pub block_id: Option<BlockId>,
    pub tag_filter: Option<String>,
    pub match_all_tags: bool,
    pub delay_ms: i32,
    pub max_retries: i32,
}

/// Campaign item status
///
/// Statuses are ordered by progress rank; webhook updates may only move an
/// item forward, and `failed`/`skipped` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
    Skipped,
}

impl ItemStatus {
    /// Progress rank: pending < sending < sent < delivered < read
    pub fn rank(&self) -> u8 {
        match self {
            ItemStatus::Pending => 0,
            ItemStatus::Sending => 1,
            ItemStatus::Sent => 2,
            ItemStatus::Delivered => 3,
            ItemStatus::Read => 4,
            // Absorbing states sort above everything a webhook can deliver
            ItemStatus::Failed | ItemStatus::Skipped => u8::MAX,
        }
    }

    /// Whether the item still counts toward the campaign's remaining work
    pub fn is_open(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Sending)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Sending => write!(f, "sending"),
            ItemStatus::Sent => write!(f, "sent"),
            ItemStatus::Delivered => write!(f, "delivered"),
            ItemStatus::Read => write!(f, "read"),
            ItemStatus::Failed => write!(f, "failed"),
            ItemStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "sending" => Ok(ItemStatus::Sending),
            "sent" => Ok(ItemStatus::Sent),
            "delivered" => Ok(ItemStatus::Delivered),
            "read" => Ok(ItemStatus::Read),
            "failed" => Ok(ItemStatus::Failed),
            "skipped" => Ok(ItemStatus::Skipped),
            _ => Err(format!("Invalid item status: {}", s)),
        }
    }
}

/// Campaign item model: one recipient's tracked progress within a campaign.
///
/// Recipient fields are snapshotted at campaign creation and do not follow
/// later recipient edits.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignItem {
    pub id: CampaignItemId,
    pub campaign_id: CampaignId,
    pub recipient_id: Option<RecipientId>,
    pub phone: String,
    pub name: Option<String>,
    pub tags: String,
    pub block_id: Option<BlockId>,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Ledger entry representing the current attempt
    pub message_id: Option<MessageId>,
    pub reply_count: i32,
    pub first_reply_at: Option<DateTime<Utc>>,
    pub last_reply_at: Option<DateTime<Utc>>,
    pub auto_reply_count: i32,
    pub last_auto_reply_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignItem {
    /// Get status enum
    pub fn status_enum(&self) -> Option<ItemStatus> {
        self.status.parse().ok()
    }
}

/// Create campaign item input (snapshot of a targeted recipient)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignItem {
    pub recipient_id: Option<RecipientId>,
    pub phone: String,
    pub name: Option<String>,
    pub tags: String,
    pub block_id: Option<BlockId>,
    pub status: ItemStatus,
}

/// Delivery ledger status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Rank used for monotonic webhook reconciliation:
    /// read > delivered > sent > failed > pending
    pub fn rank(&self) -> u8 {
        match self {
            MessageStatus::Pending => 0,
            MessageStatus::Failed => 1,
            MessageStatus::Sent => 2,
            MessageStatus::Delivered => 3,
            MessageStatus::Read => 4,
        }
    }

    /// Whether the send reached the provider
    pub fn is_dispatched(&self) -> bool {
        matches!(
            self,
            MessageStatus::Sent | MessageStatus::Delivered | MessageStatus::Read
        )
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Read => write!(f, "read"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Delivery ledger entry: one physical outbound send attempt
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: MessageId,
    pub phone: String,
    pub body: String,
    pub status: String,
    /// Idempotency token; unique across the ledger
    pub client_ref: String,
    pub campaign_item_id: Option<CampaignItemId>,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl OutboundMessage {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }
}

/// Create ledger entry input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOutboundMessage {
    pub phone: String,
    pub body: String,
    pub client_ref: String,
    pub campaign_item_id: Option<CampaignItemId>,
}

/// Inbound message model (bot dedupe + audit)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: InboundMessageId,
    pub provider_message_id: String,
    pub from_phone: String,
    pub body: Option<String>,
    pub campaign_item_id: Option<CampaignItemId>,
    pub raw: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Webhook audit log entry (append-only)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: uuid::Uuid,
    pub event_type: Option<String>,
    pub provider_message_id: Option<String>,
    pub status_text: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Per-status item counts for a campaign (aggregate source of truth)
#[derive(Debug, Clone, Default)]
pub struct CampaignItemCounts {
    pub pending: i64,
    pub sending: i64,
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl CampaignItemCounts {
    pub fn total(&self) -> i64 {
        self.pending
            + self.sending
            + self.sent
            + self.delivered
            + self.read
            + self.failed
            + self.skipped
    }

    /// Items no longer awaiting work
    pub fn done(&self) -> i64 {
        self.sent + self.delivered + self.read + self.failed + self.skipped
    }

    /// Items still in flight or waiting
    pub fn open(&self) -> i64 {
        self.pending + self.sending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_item_status_rank_order() {
        assert!(ItemStatus::Pending.rank() < ItemStatus::Sending.rank());
        assert!(ItemStatus::Sending.rank() < ItemStatus::Sent.rank());
        assert!(ItemStatus::Sent.rank() < ItemStatus::Delivered.rank());
        assert!(ItemStatus::Delivered.rank() < ItemStatus::Read.rank());
        assert!(ItemStatus::Failed.rank() > ItemStatus::Read.rank());
        assert!(ItemStatus::Skipped.rank() > ItemStatus::Read.rank());
    }

    #[test]
    fn test_message_status_rank_order() {
        assert!(MessageStatus::Pending.rank() < MessageStatus::Failed.rank());
        assert!(MessageStatus::Failed.rank() < MessageStatus::Sent.rank());
        assert!(MessageStatus::Sent.rank() < MessageStatus::Delivered.rank());
        assert!(MessageStatus::Delivered.rank() < MessageStatus::Read.rank());
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "sending", "sent", "delivered", "read", "failed", "skipped"] {
            let parsed: ItemStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        for s in ["running", "paused", "done", "cancelled", "failed"] {
            let parsed: CampaignStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("VIP, cordoba ,"), vec!["vip", "cordoba"]);
        assert_eq!(split_tags(""), Vec::<String>::new());
        assert_eq!(split_tags(" , ,"), Vec::<String>::new());
    }

    #[test]
    fn test_counts_done_and_open() {
        let counts = CampaignItemCounts {
            pending: 2,
            sending: 1,
            sent: 3,
            delivered: 1,
            read: 1,
            failed: 1,
            skipped: 1,
        };
        assert_eq!(counts.total(), 10);
        assert_eq!(counts.done(), 7);
        assert_eq!(counts.open(), 3);
    }
}
