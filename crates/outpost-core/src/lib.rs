//! Outpost Core - Campaign dispatch engine
//!
//! The durable, crash-resumable send loop, the webhook status ingestor, and
//! the inbound auto-reply bot, all sharing one delivery ledger.

pub mod autoreply;
pub mod classify;
pub mod dispatch;
pub mod gateway;
pub mod ingest;

pub use autoreply::{AutoReplyBot, BotConfig};
pub use classify::{classify_send_failure, retry_backoff_ms, FailureKind};
pub use dispatch::{CampaignDispatcher, DispatchError, StartCampaign};
pub use gateway::{GatewayClient, GatewayError, SentText};
pub use ingest::WebhookIngestor;
