//! Common types for Outpost

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Unique identifier for recipient blocks
pub type BlockId = Uuid;

/// Unique identifier for recipients
pub type RecipientId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign items
pub type CampaignItemId = Uuid;

/// Unique identifier for delivery ledger entries
pub type MessageId = Uuid;

/// Unique identifier for inbound messages
pub type InboundMessageId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Normalize a phone address for the gateway: strip separators, keep digits
/// and a leading plus.
pub fn normalize_phone(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.trim().chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    out
}

/// A phone address is usable if it has at least a few digits after
/// normalization.
pub fn is_usable_phone(raw: &str) -> bool {
    normalize_phone(raw).chars().filter(|c| c.is_ascii_digit()).count() >= 6
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" +54 911 5555-1234 "), "+5491155551234");
        assert_eq!(normalize_phone("(351) 123 4567"), "3511234567");
        assert_eq!(normalize_phone("54+11"), "5411");
    }

    #[test]
    fn test_usable_phone() {
        assert!(is_usable_phone("+5491155551234"));
        assert!(!is_usable_phone(""));
        assert!(!is_usable_phone("n/a"));
        assert!(!is_usable_phone("12345"));
    }
}
