use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum GateError {
    // Regulation errors
    RegulationError(String),

    // User provider errors
    UserNotFound(String),
    UserProviderError(String),

    // Session errors
    SessionNotFound(String),
    SessionError(String),

    // Response errors
    ResponseError(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegulationError(msg) => write!(f, "Regulation error: {}", msg),
            Self::UserNotFound(name) => write!(f, "User not found: {}", name),
            Self::UserProviderError(msg) => write!(f, "User provider error: {}", msg),
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::SessionError(msg) => write!(f, "Session error: {}", msg),
            Self::ResponseError(msg) => write!(f, "Response error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for GateError {}

// Generic result type for the gate and its collaborators
pub type Result<T> = std::result::Result<T, GateError>;

/// Answer of a regulator that refused to evaluate an attempt
#[derive(Debug)]
pub enum RegulationError {
    /// The account is locked out until the given instant
    Banned { until: DateTime<Utc> },
    /// The lockout state could not be evaluated
    Unavailable(GateError),
}

impl fmt::Display for RegulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Banned { until } => write!(f, "user is banned until {}", until.to_rfc3339()),
            Self::Unavailable(err) => write!(f, "unable to regulate: {}", err),
        }
    }
}

impl Error for RegulationError {}

impl From<GateError> for RegulationError {
    fn from(err: GateError) -> Self {
        RegulationError::Unavailable(err)
    }
}

/// Every way a single first factor attempt can fail.
///
/// These never reach the client as-is: `client_message` collapses them into the
/// generic failure reply, except `AccountLocked` which discloses the unlock time.
#[derive(Debug)]
pub enum AuthenticationError {
    MalformedRequest(String),
    AccountLocked { username: String, until: DateTime<Utc> },
    LockoutEvaluationFailed { username: String, source: GateError },
    CredentialCheckFailed { username: String, source: GateError },
    InvalidCredential { username: String },
    MarkFailed { username: String, source: GateError },
    SessionResetFailed { username: String, source: GateError },
    SessionRegenerateFailed { username: String, source: GateError },
    ExpirationUpdateFailed { username: String, source: GateError },
    UserDetailsFailed { username: String, source: GateError },
    SessionSaveFailed { username: String, source: GateError },
    ResponseFailed { username: String, source: GateError },
}

impl AuthenticationError {
    /// Username the attempt was made for, when the body could be parsed
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::MalformedRequest(_) => None,
            Self::AccountLocked { username, .. }
            | Self::LockoutEvaluationFailed { username, .. }
            | Self::CredentialCheckFailed { username, .. }
            | Self::InvalidCredential { username }
            | Self::MarkFailed { username, .. }
            | Self::SessionResetFailed { username, .. }
            | Self::SessionRegenerateFailed { username, .. }
            | Self::ExpirationUpdateFailed { username, .. }
            | Self::UserDetailsFailed { username, .. }
            | Self::SessionSaveFailed { username, .. }
            | Self::ResponseFailed { username, .. } => Some(username),
        }
    }

    /// The only text the client ever sees for this failure
    pub fn client_message(&self) -> String {
        match self {
            Self::AccountLocked { until, .. } => format!(
                "{} {}.",
                crate::constants::USER_BANNED_MESSAGE_PREFIX,
                until.to_rfc3339()
            ),
            _ => crate::constants::AUTHENTICATION_FAILED_MESSAGE.to_string(),
        }
    }
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest(msg) => write!(f, "Unable to parse body: {}", msg),
            Self::AccountLocked { username, until } => {
                write!(f, "User {} is banned until {}", username, until.to_rfc3339())
            }
            Self::LockoutEvaluationFailed { source, .. } => {
                write!(f, "Unable to regulate authentication: {}", source)
            }
            Self::CredentialCheckFailed { username, source } => {
                write!(f, "Error while checking password for user {}: {}", username, source)
            }
            Self::InvalidCredential { username } => {
                write!(f, "Credentials are wrong for user {}", username)
            }
            Self::MarkFailed { source, .. } => {
                write!(f, "Unable to mark authentication: {}", source)
            }
            Self::SessionResetFailed { username, source } => {
                write!(f, "Unable to reset the session for user {}: {}", username, source)
            }
            Self::SessionRegenerateFailed { username, source } => {
                write!(f, "Unable to regenerate session for user {}: {}", username, source)
            }
            Self::ExpirationUpdateFailed { username, source } => {
                write!(f, "Unable to update expiration timer for user {}: {}", username, source)
            }
            Self::UserDetailsFailed { username, source } => {
                write!(f, "Error while retrieving details from user {}: {}", username, source)
            }
            Self::SessionSaveFailed { username, source } => {
                write!(f, "Unable to save session of user {}: {}", username, source)
            }
            Self::ResponseFailed { username, source } => {
                write!(f, "Unable to finalize first factor of user {}: {}", username, source)
            }
        }
    }
}

impl Error for AuthenticationError {}
