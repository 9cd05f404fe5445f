//! Outpost Common - Shared types and utilities
//!
//! This crate provides the error type, configuration, and id aliases
//! shared by every Outpost crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
