//! Credential verification and user attributes

pub mod provider;
pub mod user;

// Re-export main components
pub use provider::{hash_password, FileUserProvider, UserProvider, UserRecord};
pub use user::{AuthenticationLevel, UserDetails};
