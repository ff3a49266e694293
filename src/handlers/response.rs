//! Reply bodies and post-login response construction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use warp::http::StatusCode;

use crate::error::{GateError, Result};

/// Redirection target handed back to the login portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectData {
    pub redirect: String,
}

/// JSON body of every first factor reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<RedirectData>,
}

impl ReplyBody {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            message: None,
            data: None,
        }
    }

    pub fn redirect(target: String) -> Self {
        Self {
            data: Some(RedirectData { redirect: target }),
            ..Self::ok()
        }
    }

    pub fn ko(message: String) -> Self {
        Self {
            status: "KO".to_string(),
            message: Some(message),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}

/// Outcome of the gate, ready to be written by the transport
#[derive(Debug, Clone)]
pub struct GateResponse {
    pub status: StatusCode,
    pub body: ReplyBody,
    /// Session identifier the client must hold after this reply
    pub session_id: String,
    /// Set when the session lifetime was extended by remember me
    pub session_max_age: Option<Duration>,
}

/// Builds the final body of a successful first factor
#[async_trait]
pub trait ResponseEmitter: Send + Sync {
    async fn finalize(
        &self,
        target_url: Option<&str>,
        request_method: Option<&str>,
        username: &str,
        groups: &[String],
    ) -> Result<ReplyBody>;
}

/// Redirects only to https targets under the protected domain
pub struct RedirectResponseEmitter {
    protected_domain: Option<String>,
    default_redirection_url: Option<String>,
}

impl RedirectResponseEmitter {
    pub fn new(protected_domain: Option<String>, default_redirection_url: Option<String>) -> Self {
        Self {
            protected_domain: protected_domain.map(|d| d.trim_start_matches('.').to_lowercase()),
            default_redirection_url,
        }
    }

    /// Whether `target` may be used as a post-login redirection
    pub fn is_safe_redirection(&self, target: &Url) -> bool {
        let domain = match self.protected_domain {
            Some(ref domain) => domain,
            None => return false,
        };
        if target.scheme() != "https" {
            return false;
        }
        match target.host_str() {
            Some(host) => {
                let host = host.to_lowercase();
                host == *domain || host.ends_with(&format!(".{}", domain))
            }
            None => false,
        }
    }

    fn fallback(&self) -> ReplyBody {
        match self.default_redirection_url {
            Some(ref url) => ReplyBody::redirect(url.clone()),
            None => ReplyBody::ok(),
        }
    }
}

#[async_trait]
impl ResponseEmitter for RedirectResponseEmitter {
    async fn finalize(
        &self,
        target_url: Option<&str>,
        request_method: Option<&str>,
        username: &str,
        groups: &[String],
    ) -> Result<ReplyBody> {
        let target = match target_url.map(str::trim).filter(|t| !t.is_empty()) {
            Some(target) => target,
            None => {
                log::debug!("No target URL provided for user {}, using default redirection", username);
                return Ok(self.fallback());
            }
        };

        let parsed = Url::parse(target).map_err(|e| {
            GateError::ResponseError(format!("Unable to parse target URL {}: {}", target, e))
        })?;

        log::trace!(
            "Finalizing first factor of user {} (groups: {:?}) for {} {}",
            username,
            groups,
            request_method.unwrap_or("GET"),
            parsed
        );

        if !self.is_safe_redirection(&parsed) {
            log::debug!("Redirection URL {} is not safe", parsed);
            return Ok(ReplyBody::ok());
        }

        Ok(ReplyBody::redirect(parsed.to_string()))
    }
}
