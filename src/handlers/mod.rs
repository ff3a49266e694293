//! Request handlers for the first factor endpoint

pub mod first_factor;
pub mod response;

// Re-export the gate and its reply types
pub use first_factor::{FirstFactorGate, FirstFactorRequest, GateProviders};
pub use response::{GateResponse, RedirectResponseEmitter, ReplyBody, ResponseEmitter};
