//! Security utilities

pub mod timing;

pub use timing::{actual_delay_ms, random_jitter_ms, AuthTimer, DelayPolicy};
