//! Repository layer for data access

pub mod blocks;
pub mod campaign_items;
pub mod campaigns;
pub mod inbound_messages;
pub mod messages;
pub mod recipients;
pub mod settings;
pub mod webhook_logs;

pub use blocks::BlockRepository;
pub use campaign_items::CampaignItemRepository;
pub use campaigns::CampaignRepository;
pub use inbound_messages::InboundMessageRepository;
pub use messages::MessageRepository;
pub use recipients::RecipientRepository;
pub use settings::SettingsRepository;
pub use webhook_logs::WebhookLogRepository;
