//! Campaign dispatcher
//!
//! The single background loop that drains running campaigns one item at a
//! time: claim, send through the gateway, record in the delivery ledger,
//! classify failures, and pace itself. Safe to run in several processes at
//! once; all coordination happens through the atomic item claim and the
//! ledger's idempotency-token uniqueness.

use chrono::{Duration as ChronoDuration, Utc};
use outpost_common::config::DispatchConfig;
use outpost_common::types::{is_usable_phone, normalize_phone, CampaignId};
use outpost_storage::models::{
    split_tags, Campaign, CampaignItem, CampaignStatus, CreateCampaign, CreateCampaignItem,
    CreateOutboundMessage, ItemStatus, MessageStatus, OutboundMessage,
};
use outpost_storage::repository::{
    CampaignItemRepository, CampaignRepository, MessageRepository, RecipientRepository,
};
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classify::{classify_send_failure, retry_backoff_with_jitter_ms, FailureKind};
use crate::gateway::GatewayClient;

/// A ledger entry stuck in `pending` longer than this is presumed lost
pub const INFLIGHT_TTL_SECS: i64 = 120;

/// Inter-message delay clamp
pub const MIN_SEND_DELAY_MS: i32 = 250;
pub const MAX_SEND_DELAY_MS: i32 = 60_000;

/// Per-item retry budget clamp
pub const MAX_RETRY_LIMIT: i32 = 50;

/// How soon a hard-limited item is revisited after the operator resumes
const HARD_LIMIT_RETRY_MS: i64 = 60_000;

/// Re-check delay while a previous attempt may still be in flight
const INFLIGHT_RECHECK_MS: i64 = 10_000;

/// Dispatcher errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Campaign not found")]
    NotFound,

    #[error("No recipients matched the target filter")]
    EmptyTarget,

    #[error("Campaign is not in a {0} state")]
    InvalidState(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Operator input for creating a campaign
#[derive(Debug, Clone)]
pub struct StartCampaign {
    pub name: String,
    pub body: String,
    pub block_id: Option<Uuid>,
    pub tag_filter: Option<String>,
    pub match_all_tags: bool,
    pub delay_ms: Option<i32>,
    pub max_retries: Option<i32>,
}

/// Check a recipient's comma-separated tag list against a campaign filter.
///
/// Matching is case-insensitive; `match_all` selects ALL-vs-ANY semantics.
/// An absent or empty filter matches everyone.
pub fn tags_match(recipient_tags: &str, filter: Option<&str>, match_all: bool) -> bool {
    let wanted = match filter {
        Some(f) => split_tags(f),
        None => return true,
    };
    if wanted.is_empty() {
        return true;
    }

    let have = split_tags(recipient_tags);
    if match_all {
        wanted.iter().all(|t| have.contains(t))
    } else {
        wanted.iter().any(|t| have.contains(t))
    }
}

/// Deterministic idempotency token for one campaign send attempt
pub fn campaign_client_ref(campaign_id: CampaignId, item_id: Uuid, attempt: i32) -> String {
    format!("campaign:{}:{}:{}", campaign_id, item_id, attempt)
}

/// Campaign dispatcher service
pub struct CampaignDispatcher {
    campaigns: CampaignRepository,
    items: CampaignItemRepository,
    messages: MessageRepository,
    recipients: RecipientRepository,
    gateway: Arc<GatewayClient>,
    defaults: DispatchConfig,
    /// Only one dispatch cycle runs per process; `trigger` is a no-op while
    /// this is set
    running: AtomicBool,
}

impl CampaignDispatcher {
    /// Create a new dispatcher over a shared pool
    pub fn new(pool: PgPool, gateway: Arc<GatewayClient>, defaults: DispatchConfig) -> Self {
        Self {
            campaigns: CampaignRepository::new(pool.clone()),
            items: CampaignItemRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            recipients: RecipientRepository::new(pool),
            gateway,
            defaults,
            running: AtomicBool::new(false),
        }
    }

    /// Resolve the target filter, snapshot recipients into items, persist
    /// the campaign as `running`, and kick the loop.
    pub async fn create_campaign_and_start(
        self: &Arc<Self>,
        input: StartCampaign,
    ) -> Result<Campaign, DispatchError> {
        let candidates = self.recipients.list_for_targeting(input.block_id).await?;

        let targets: Vec<_> = candidates
            .into_iter()
            .filter(|r| tags_match(&r.tags, input.tag_filter.as_deref(), input.match_all_tags))
            .collect();

        if targets.is_empty() {
            return Err(DispatchError::EmptyTarget);
        }

        let delay_ms = input
            .delay_ms
            .unwrap_or(self.defaults.default_delay_ms as i32)
            .clamp(MIN_SEND_DELAY_MS, MAX_SEND_DELAY_MS);
        let max_retries = input
            .max_retries
            .unwrap_or(self.defaults.default_max_retries)
            .clamp(0, MAX_RETRY_LIMIT);

        let total = targets.len() as i32;
        let campaign = self
            .campaigns
            .create(
                CreateCampaign {
                    name: input.name,
                    body: input.body,
                    block_id: input.block_id,
                    tag_filter: input.tag_filter,
                    match_all_tags: input.match_all_tags,
                    delay_ms,
                    max_retries,
                },
                total,
                Utc::now(),
            )
            .await?;

        let items: Vec<CreateCampaignItem> = targets
            .into_iter()
            .map(|r| {
                let phone = normalize_phone(&r.phone);
                let status = if is_usable_phone(&r.phone) {
                    ItemStatus::Pending
                } else {
                    // No usable address: done immediately, never retried
                    ItemStatus::Skipped
                };
                CreateCampaignItem {
                    recipient_id: Some(r.id),
                    phone,
                    name: r.name,
                    tags: r.tags,
                    block_id: r.block_id,
                    status,
                }
            })
            .collect();

        self.items.create_batch(campaign.id, items).await?;
        self.campaigns.refresh_counters(campaign.id).await?;

        info!(
            campaign = %campaign.id,
            total,
            "campaign created and started"
        );

        self.trigger();

        let campaign = self
            .campaigns
            .get(campaign.id)
            .await?
            .ok_or(DispatchError::NotFound)?;
        Ok(campaign)
    }

    /// Resume a paused (or finished) campaign and kick the loop; a no-op
    /// for campaigns already running
    pub async fn resume(self: &Arc<Self>, id: CampaignId) -> Result<Campaign, DispatchError> {
        let campaign = match self.campaigns.resume(id).await? {
            Some(c) => c,
            None => {
                let existing = self.campaigns.get(id).await?.ok_or(DispatchError::NotFound)?;
                if existing.status_enum() != Some(CampaignStatus::Running) {
                    return Err(DispatchError::InvalidState("resumable"));
                }
                existing
            }
        };

        info!(campaign = %id, "campaign resumed");
        self.trigger();
        Ok(campaign)
    }

    /// Cancel a campaign. In-flight sends are not recalled; the loop simply
    /// stops touching the campaign at its next status check.
    pub async fn cancel(&self, id: CampaignId) -> Result<Campaign, DispatchError> {
        let campaign = self.campaigns.get(id).await?.ok_or(DispatchError::NotFound)?;

        match campaign.status_enum() {
            Some(CampaignStatus::Running) | Some(CampaignStatus::Paused) => {}
            _ => return Err(DispatchError::InvalidState("cancellable")),
        }

        let campaign = self
            .campaigns
            .finish(id, CampaignStatus::Cancelled)
            .await?
            .ok_or(DispatchError::NotFound)?;

        info!(campaign = %id, "campaign cancelled");
        Ok(campaign)
    }

    /// Reset all failed items back to pending and resume the campaign
    pub async fn retry_failed(self: &Arc<Self>, id: CampaignId) -> Result<u64, DispatchError> {
        if self.campaigns.get(id).await?.is_none() {
            return Err(DispatchError::NotFound);
        }

        let reset = self.items.reset_failed(id).await?;
        self.campaigns.refresh_counters(id).await?;

        // resume() is a no-op for already-running campaigns
        let _ = self.campaigns.resume(id).await?;

        info!(campaign = %id, reset, "failed items reset for retry");
        self.trigger();
        Ok(reset)
    }

    /// Ad-hoc single send with an optional caller-supplied idempotency key.
    ///
    /// A repeated `client_ref` returns the first ledger entry without a
    /// second provider call.
    pub async fn send_adhoc(
        &self,
        phone: &str,
        body: &str,
        client_ref: Option<String>,
    ) -> Result<OutboundMessage, DispatchError> {
        let phone = normalize_phone(phone);
        let client_ref = client_ref.unwrap_or_else(|| format!("adhoc:{}", Uuid::new_v4()));

        let (entry, created) = self
            .messages
            .create_or_get(CreateOutboundMessage {
                phone: phone.clone(),
                body: body.to_string(),
                client_ref,
                campaign_item_id: None,
            })
            .await?;

        if !created {
            debug!(message = %entry.id, "ad-hoc send deduped by client_ref");
            return Ok(entry);
        }

        match self.gateway.send_text(&phone, body).await {
            Ok(sent) => {
                let entry = self
                    .messages
                    .mark_sent(entry.id, &sent.provider_message_id)
                    .await?
                    .unwrap_or(entry);
                Ok(entry)
            }
            Err(err) => {
                warn!(message = %entry.id, error = %err, "ad-hoc send failed");
                let entry = self
                    .messages
                    .mark_failed(entry.id, &err.to_string())
                    .await?
                    .unwrap_or(entry);
                Ok(entry)
            }
        }
    }

    /// Start the dispatch loop unless one is already running in this process
    pub fn trigger(self: &Arc<Self>) {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            debug!("dispatch loop started");
            dispatcher.drain().await;
            dispatcher.running.store(false, Ordering::SeqCst);
            debug!("dispatch loop idle");
        });
    }

    /// Drain running campaigns until none are left
    async fn drain(&self) {
        loop {
            let campaign = match self.campaigns.next_running().await {
                Ok(Some(c)) => c,
                Ok(None) => break,
                Err(e) => {
                    error!("dispatch poll failed: {}", e);
                    sleep(Duration::from_millis(self.defaults.idle_poll_ms)).await;
                    continue;
                }
            };

            if !self.gateway.is_configured() {
                warn!(campaign = %campaign.id, "gateway not configured, failing campaign");
                if let Err(e) = self
                    .campaigns
                    .finish(campaign.id, CampaignStatus::Failed)
                    .await
                {
                    error!(campaign = %campaign.id, "failed to mark campaign failed: {}", e);
                }
                continue;
            }

            // One item's failure never escapes the iteration
            if let Err(e) = self.process_next(&campaign).await {
                error!(campaign = %campaign.id, "dispatch step failed: {}", e);
                sleep(Duration::from_millis(self.defaults.idle_poll_ms)).await;
            }
        }
    }

    /// Handle one eligible item of one campaign
    async fn process_next(&self, campaign: &Campaign) -> Result<(), DispatchError> {
        let candidate = match self
            .items
            .next_eligible(campaign.id, INFLIGHT_TTL_SECS)
            .await?
        {
            Some(item) => item,
            None => {
                if self.items.open_count(campaign.id).await? == 0 {
                    self.campaigns
                        .finish(campaign.id, CampaignStatus::Done)
                        .await?;
                    self.campaigns.refresh_counters(campaign.id).await?;
                    info!(campaign = %campaign.id, "campaign done");
                } else {
                    // Remaining items are waiting on backoff or another worker
                    sleep(Duration::from_millis(self.defaults.idle_poll_ms)).await;
                }
                return Ok(());
            }
        };

        // The claim is the sole concurrency gate: exactly one worker wins
        let item = match self.items.claim(candidate.id, INFLIGHT_TTL_SECS).await? {
            Some(item) => item,
            None => {
                debug!(item = %candidate.id, "lost claim race, moving on");
                return Ok(());
            }
        };

        let client_ref = campaign_client_ref(campaign.id, item.id, item.attempts);
        let (entry, created) = self
            .messages
            .create_or_get(CreateOutboundMessage {
                phone: item.phone.clone(),
                body: campaign.body.clone(),
                client_ref,
                campaign_item_id: Some(item.id),
            })
            .await?;

        if !created {
            match entry.status_enum() {
                // A previous run already got this attempt through; record
                // the success it never managed to write
                Some(s) if s.is_dispatched() => {
                    debug!(item = %item.id, "attempt already sent, reconciling");
                    self.items.mark_sent(item.id, entry.id).await?;
                    self.campaigns.refresh_counters(campaign.id).await?;
                    self.pace(campaign).await;
                    return Ok(());
                }
                Some(MessageStatus::Pending) => {
                    let age = Utc::now() - entry.created_at;
                    if age < ChronoDuration::seconds(INFLIGHT_TTL_SECS) {
                        // The send may still be in flight at the provider;
                        // release the claim (undoing its attempt increment)
                        // and look again shortly
                        debug!(item = %item.id, "prior attempt still in flight, waiting");
                        self.items
                            .release_inflight(
                                item.id,
                                Utc::now() + ChronoDuration::milliseconds(INFLIGHT_RECHECK_MS),
                            )
                            .await?;
                        return Ok(());
                    }
                    self.messages
                        .mark_failed(entry.id, "in-flight send timed out")
                        .await?;
                }
                // Failed entries are resent under the same token
                _ => {}
            }
        }

        match self.gateway.send_text(&item.phone, &campaign.body).await {
            Ok(sent) => {
                self.messages
                    .mark_sent(entry.id, &sent.provider_message_id)
                    .await?;
                self.items.mark_sent(item.id, entry.id).await?;
                self.campaigns.refresh_counters(campaign.id).await?;
                info!(
                    campaign = %campaign.id,
                    item = %item.id,
                    attempt = item.attempts,
                    "message sent"
                );
            }
            Err(err) => {
                self.messages.mark_failed(entry.id, &err.to_string()).await?;
                self.handle_send_failure(campaign, &item, err).await?;
            }
        }

        self.pace(campaign).await;
        Ok(())
    }

    /// Decide the fate of an item whose send failed
    async fn handle_send_failure(
        &self,
        campaign: &Campaign,
        item: &CampaignItem,
        err: crate::gateway::GatewayError,
    ) -> Result<(), DispatchError> {
        match classify_send_failure(err.status, &err.message) {
            FailureKind::HardLimit => {
                // Continuing would burn the retry budget of every item
                // against a dead quota; stop the campaign until an operator
                // intervenes
                warn!(
                    campaign = %campaign.id,
                    error = %err,
                    "provider limit reached, pausing campaign"
                );
                self.campaigns
                    .set_status(campaign.id, CampaignStatus::Paused)
                    .await?;
                self.items
                    .reschedule(
                        item.id,
                        Utc::now() + ChronoDuration::milliseconds(HARD_LIMIT_RETRY_MS),
                        &format!("provider limit reached: {}", err.message),
                    )
                    .await?;
            }
            FailureKind::Retryable if item.attempts <= campaign.max_retries => {
                let delay_ms =
                    retry_backoff_with_jitter_ms(item.attempts, self.defaults.retry_base_ms);
                debug!(
                    item = %item.id,
                    attempt = item.attempts,
                    delay_ms,
                    error = %err,
                    "transient failure, rescheduling"
                );
                self.items
                    .reschedule(
                        item.id,
                        Utc::now() + ChronoDuration::milliseconds(delay_ms),
                        &err.to_string(),
                    )
                    .await?;
            }
            _ => {
                warn!(
                    campaign = %campaign.id,
                    item = %item.id,
                    attempts = item.attempts,
                    error = %err,
                    "item failed terminally"
                );
                self.items.mark_failed(item.id, &err.to_string()).await?;
                self.campaigns.refresh_counters(campaign.id).await?;
            }
        }

        Ok(())
    }

    /// Inter-message delay: the outbound rate limit protecting the account
    async fn pace(&self, campaign: &Campaign) {
        let delay = campaign.delay_ms.clamp(MIN_SEND_DELAY_MS, MAX_SEND_DELAY_MS);
        sleep(Duration::from_millis(delay as u64)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn client_ref_is_deterministic() {
        let c = Uuid::nil();
        let i = Uuid::nil();
        assert_eq!(
            campaign_client_ref(c, i, 3),
            format!("campaign:{}:{}:3", c, i)
        );
        assert_eq!(campaign_client_ref(c, i, 3), campaign_client_ref(c, i, 3));
        assert_ne!(campaign_client_ref(c, i, 3), campaign_client_ref(c, i, 4));
    }

    #[test]
    fn tags_match_any_semantics() {
        assert!(tags_match("vip, cordoba", Some("VIP"), false));
        assert!(tags_match("vip, cordoba", Some("rosario,cordoba"), false));
        assert!(!tags_match("vip", Some("rosario"), false));
    }

    #[test]
    fn tags_match_all_semantics() {
        assert!(tags_match("vip, cordoba, 2024", Some("vip,cordoba"), true));
        assert!(!tags_match("vip", Some("vip,cordoba"), true));
    }

    #[test]
    fn tags_match_is_case_insensitive() {
        assert!(tags_match("VIP,Cordoba", Some("vip,CORDOBA"), true));
    }

    #[test]
    fn empty_filter_matches_everyone() {
        assert!(tags_match("anything", None, true));
        assert!(tags_match("", Some(""), false));
        assert!(tags_match("", Some(" , "), true));
    }
}
