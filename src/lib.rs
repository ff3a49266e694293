//! Auth Gate - A timing-attack resistant first factor authentication gate
//!
//! This library verifies username/password credentials behind an account
//! lockout regulator, issues sessions, and equalizes response latency
//! across every outcome of an attempt.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod security_logger;

// Re-export main components
pub use config::*;
pub use constants::*;
