//! Webhook status ingestor
//!
//! Provider status callbacks arrive in several shapes; everything funnels
//! through one normalization step and is then applied to the delivery
//! ledger and campaign items under the monotonic rank rule. Every payload
//! is logged before parsing so unrecognized shapes can be replayed.

use outpost_storage::models::{ItemStatus, MessageStatus};
use outpost_storage::repository::{
    CampaignItemRepository, CampaignRepository, MessageRepository, WebhookLogRepository,
};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};

/// One normalized status callback row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub provider_message_id: String,
    pub status_text: String,
    pub error: Option<String>,
}

/// First string value among alternate field names
fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

/// Error text from either a bare string or an `{message}` object
fn error_field(value: &Value) -> Option<String> {
    let err = value.get("error")?;
    if let Some(s) = err.as_str() {
        return Some(s.to_string());
    }
    err.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_update(value: &Value) -> Option<StatusUpdate> {
    let id = str_field(value, &["id", "message_id", "msg_id"])?;
    let status = str_field(value, &["status", "state"])?;
    Some(StatusUpdate {
        provider_message_id: id.to_string(),
        status_text: status.to_string(),
        error: error_field(value),
    })
}

/// Normalize a provider callback payload to a list of status updates.
///
/// Accepted shapes: `{statuses: [...]}`, `{data: {statuses: [...]}}`,
/// `{data: [...]}`, `{event, data: {...}}`, and a bare status object.
/// Anything else yields an empty list.
pub fn extract_status_updates(payload: &Value) -> Vec<StatusUpdate> {
    let mut rows: Vec<&Value> = Vec::new();

    if let Some(statuses) = payload.get("statuses").and_then(Value::as_array) {
        rows.extend(statuses.iter());
    } else if let Some(data) = payload.get("data") {
        if let Some(statuses) = data.get("statuses").and_then(Value::as_array) {
            rows.extend(statuses.iter());
        } else if let Some(arr) = data.as_array() {
            rows.extend(arr.iter());
        } else if data.is_object() {
            rows.push(data);
        }
    } else if payload.is_object() {
        rows.push(payload);
    }

    rows.into_iter().filter_map(parse_update).collect()
}

/// Map a vendor status string onto the canonical ledger status.
///
/// Substring matching tolerates vendor-specific spellings; unknown strings
/// map to nothing and are skipped.
pub fn canonical_status(text: &str) -> Option<MessageStatus> {
    let t = text.to_lowercase();
    if t.contains("read") || t.contains("seen") {
        Some(MessageStatus::Read)
    } else if t.contains("deliver") {
        Some(MessageStatus::Delivered)
    } else if t.contains("fail") || t.contains("error") || t.contains("reject") {
        Some(MessageStatus::Failed)
    } else if t.contains("sent") || t.contains("send") || t.contains("accept") {
        Some(MessageStatus::Sent)
    } else {
        None
    }
}

/// Outcome of one webhook delivery
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    /// Rows recognized in the payload
    pub extracted: usize,
    /// Updates that actually moved a ledger entry forward
    pub applied: usize,
}

/// Webhook status ingestor service
#[derive(Clone)]
pub struct WebhookIngestor {
    messages: MessageRepository,
    items: CampaignItemRepository,
    campaigns: CampaignRepository,
    logs: WebhookLogRepository,
}

impl WebhookIngestor {
    /// Create a new ingestor over a shared pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            messages: MessageRepository::new(pool.clone()),
            items: CampaignItemRepository::new(pool.clone()),
            campaigns: CampaignRepository::new(pool.clone()),
            logs: WebhookLogRepository::new(pool),
        }
    }

    /// Process one status callback payload
    pub async fn process(&self, payload: &Value) -> Result<IngestReport, sqlx::Error> {
        let updates = extract_status_updates(payload);

        // Log first, whatever the payload turned out to be
        let first = updates.first();
        self.logs
            .append(
                str_field(payload, &["event", "type"]),
                first.map(|u| u.provider_message_id.as_str()),
                first.map(|u| u.status_text.as_str()),
                payload,
            )
            .await?;

        let mut report = IngestReport {
            extracted: updates.len(),
            applied: 0,
        };

        for update in &updates {
            let Some(status) = canonical_status(&update.status_text) else {
                debug!(status = %update.status_text, "unrecognized status text, skipping");
                continue;
            };

            // Only upgrades land; a stale lower-rank callback is a no-op
            let Some(entry) = self
                .messages
                .apply_status_by_provider_id(
                    &update.provider_message_id,
                    status,
                    update.error.as_deref(),
                )
                .await?
            else {
                debug!(
                    provider_id = %update.provider_message_id,
                    "no ledger entry to upgrade, skipping"
                );
                continue;
            };

            report.applied += 1;

            if let Some(item_id) = entry.campaign_item_id {
                self.propagate_to_item(item_id, status, update).await?;
            }
        }

        if report.applied > 0 {
            info!(
                extracted = report.extracted,
                applied = report.applied,
                "webhook statuses reconciled"
            );
        }

        Ok(report)
    }

    /// Propagate a ledger upgrade to the linked item under the item's own
    /// progress-rank rule, then refresh the campaign aggregates.
    async fn propagate_to_item(
        &self,
        item_id: uuid::Uuid,
        status: MessageStatus,
        update: &StatusUpdate,
    ) -> Result<(), sqlx::Error> {
        match status {
            MessageStatus::Sent => {
                self.items
                    .apply_status_upgrade(item_id, ItemStatus::Sent)
                    .await?;
            }
            MessageStatus::Delivered => {
                self.items
                    .apply_status_upgrade(item_id, ItemStatus::Delivered)
                    .await?;
            }
            MessageStatus::Read => {
                self.items
                    .apply_status_upgrade(item_id, ItemStatus::Read)
                    .await?;
            }
            MessageStatus::Failed => {
                // Items that already progressed keep their rank; only open
                // ones fail from a provider callback
                if let Some(item) = self.items.get(item_id).await? {
                    if item.status_enum().map(|s| s.is_open()).unwrap_or(false) {
                        let reason = update
                            .error
                            .as_deref()
                            .unwrap_or("provider reported failure");
                        self.items.mark_failed(item_id, reason).await?;
                    }
                }
            }
            MessageStatus::Pending => {}
        }

        if let Some(item) = self.items.get(item_id).await? {
            self.campaigns.refresh_counters(item.campaign_id).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn extracts_statuses_array() {
        let payload = json!({
            "statuses": [
                {"id": "m1", "status": "delivered"},
                {"id": "m2", "status": "read"}
            ]
        });
        let updates = extract_status_updates(&payload);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].provider_message_id, "m1");
        assert_eq!(updates[1].status_text, "read");
    }

    #[test]
    fn extracts_nested_data_statuses() {
        let payload = json!({
            "event": "statuses",
            "data": {"statuses": [{"id": "m1", "status": "sent"}]}
        });
        let updates = extract_status_updates(&payload);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status_text, "sent");
    }

    #[test]
    fn extracts_bare_array_under_data() {
        let payload = json!({
            "data": [{"message_id": "m1", "state": "DELIVERED"}]
        });
        let updates = extract_status_updates(&payload);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].provider_message_id, "m1");
        assert_eq!(updates[0].status_text, "DELIVERED");
    }

    #[test]
    fn extracts_single_event_data_object() {
        let payload = json!({
            "event": "message_status",
            "data": {"id": "m9", "status": "failed", "error": {"message": "expired"}}
        });
        let updates = extract_status_updates(&payload);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].error.as_deref(), Some("expired"));
    }

    #[test]
    fn extracts_bare_top_level_object() {
        let payload = json!({"id": "m1", "status": "sent", "error": "soft"});
        let updates = extract_status_updates(&payload);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].error.as_deref(), Some("soft"));
    }

    #[test]
    fn garbage_yields_nothing() {
        assert_eq!(extract_status_updates(&json!({"hello": "world"})).len(), 0);
        assert_eq!(extract_status_updates(&json!(null)).len(), 0);
        assert_eq!(extract_status_updates(&json!([1, 2, 3])).len(), 0);
        assert_eq!(
            extract_status_updates(&json!({"statuses": [{"status": "sent"}]})).len(),
            0
        );
    }

    #[test]
    fn canonical_status_substring_matching() {
        assert_eq!(canonical_status("delivered"), Some(MessageStatus::Delivered));
        assert_eq!(canonical_status("DELIVERY_ACK"), Some(MessageStatus::Delivered));
        assert_eq!(canonical_status("message.read"), Some(MessageStatus::Read));
        assert_eq!(canonical_status("seen"), Some(MessageStatus::Read));
        assert_eq!(canonical_status("sent"), Some(MessageStatus::Sent));
        assert_eq!(canonical_status("SEND_OK"), Some(MessageStatus::Sent));
        assert_eq!(canonical_status("failed"), Some(MessageStatus::Failed));
        assert_eq!(canonical_status("rejected"), Some(MessageStatus::Failed));
        assert_eq!(canonical_status("queued"), None);
    }
}
