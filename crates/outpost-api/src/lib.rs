//! Outpost API - REST interface for the outreach console
//!
//! Campaign management, ad-hoc sends, the provider webhook endpoint, and
//! block/recipient/settings plumbing, all JSON over axum.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
