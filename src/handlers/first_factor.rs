//! First factor authentication gate
//!
//! Verifies a username/password pair and issues a one-factor session. Every
//! request, whatever branch it exits through, is held back by the timing
//! compensation step before its reply is released.

use chrono::Utc;
use futures_util::FutureExt;
use serde::Deserialize;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

use crate::auth::provider::UserProvider;
use crate::auth::user::AuthenticationLevel;
use crate::config::{RefreshInterval, TimingConfig};
use crate::constants::AUTHENTICATION_FAILED_MESSAGE;
use crate::core::latency::LatencyTracker;
use crate::core::regulator::Regulator;
use crate::core::session::SessionProvider;
use crate::error::{AuthenticationError, RegulationError};
use crate::handlers::response::{GateResponse, ReplyBody, ResponseEmitter};
use crate::security::timing::{AuthTimer, DelayPolicy};
use crate::security_logger::{SecurityEvent, SecurityLogger};

/// JSON body of a first factor request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstFactorRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub keep_me_logged_in: Option<bool>,
    #[serde(rename = "targetURL", default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub request_method: Option<String>,
}

impl fmt::Debug for FirstFactorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstFactorRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("keep_me_logged_in", &self.keep_me_logged_in)
            .field("target_url", &self.target_url)
            .field("request_method", &self.request_method)
            .finish()
    }
}

/// Collaborators the gate delegates to
#[derive(Clone)]
pub struct GateProviders {
    pub regulator: Arc<dyn Regulator>,
    pub users: Arc<dyn UserProvider>,
    pub sessions: Arc<dyn SessionProvider>,
    pub responder: Arc<dyn ResponseEmitter>,
}

struct FirstFactorSuccess {
    body: ReplyBody,
    session_max_age: Option<Duration>,
}

/// Timing-attack resistant first factor endpoint logic
pub struct FirstFactorGate {
    providers: GateProviders,
    latency: LatencyTracker,
    delay_policy: DelayPolicy,
    timing_enabled: bool,
    refresh_interval: RefreshInterval,
    security_logger: Arc<SecurityLogger>,
}

impl FirstFactorGate {
    /// Create a gate; the latency window is seeded from `timing`
    ///
    /// # Panics
    ///
    /// Panics if `timing.window_size` is zero. `TimingConfig::validate` rejects
    /// such a configuration.
    pub fn new(providers: GateProviders, timing: &TimingConfig) -> Self {
        Self {
            providers,
            latency: LatencyTracker::new(
                timing.window_size,
                Duration::from_millis(timing.initial_delay_ms),
            ),
            delay_policy: DelayPolicy::new(timing.minimum_delay_ms, timing.maximum_jitter_ms),
            timing_enabled: timing.enabled,
            refresh_interval: RefreshInterval::Disabled,
            security_logger: Arc::new(SecurityLogger::new()),
        }
    }

    pub fn with_refresh_interval(mut self, refresh_interval: RefreshInterval) -> Self {
        self.refresh_interval = refresh_interval;
        self
    }

    pub fn with_security_logger(mut self, security_logger: Arc<SecurityLogger>) -> Self {
        self.security_logger = security_logger;
        self
    }

    /// Moving average of successful first factor durations
    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    pub fn timing_enabled(&self) -> bool {
        self.timing_enabled
    }

    /// Handle one first factor request carrying `session_id`
    pub async fn handle(&self, body: &[u8], session_id: String) -> GateResponse {
        log::trace!("Hit first factor post handler");
        let mut timer = AuthTimer::start();
        let mut session_id = session_id;

        let outcome = AssertUnwindSafe(self.verify(body, &mut session_id, &mut timer))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(success)) => GateResponse {
                status: StatusCode::OK,
                body: success.body,
                session_id,
                session_max_age: success.session_max_age,
            },
            Ok(Err(err)) => {
                self.report_failure(&err).await;
                GateResponse {
                    status: StatusCode::UNAUTHORIZED,
                    body: ReplyBody::ko(err.client_message()),
                    session_id,
                    session_max_age: None,
                }
            }
            Err(_) => {
                // A collaborator panicked: reply like any other failure, after the same delay
                log::error!("First factor handling panicked");
                timer.mark_unsuccessful();
                self.security_logger
                    .log_event(SecurityEvent::AuthenticationFailed {
                        username: None,
                        reason: "first factor handling panicked".to_string(),
                    })
                    .await;
                GateResponse {
                    status: StatusCode::UNAUTHORIZED,
                    body: ReplyBody::ko(AUTHENTICATION_FAILED_MESSAGE.to_string()),
                    session_id,
                    session_max_age: None,
                }
            }
        };

        if self.timing_enabled {
            timer.compensate(&self.latency, &self.delay_policy).await;
        }

        response
    }

    async fn verify(
        &self,
        body: &[u8],
        session_id: &mut String,
        timer: &mut AuthTimer,
    ) -> Result<FirstFactorSuccess, AuthenticationError> {
        log::trace!("Hit first factor post parsing body start");
        let attempt: FirstFactorRequest = serde_json::from_slice(body)
            .map_err(|e| AuthenticationError::MalformedRequest(e.to_string()))?;
        if attempt.username.is_empty() || attempt.password.is_empty() {
            return Err(AuthenticationError::MalformedRequest(
                "username and password are required".to_string(),
            ));
        }
        log::trace!("Hit first factor post parsing body complete");

        let username = attempt.username.clone();
        let providers = &self.providers;

        log::trace!("Hit first factor post regulator check start");
        match providers.regulator.regulate(&username).await {
            Ok(()) => {}
            Err(RegulationError::Banned { until }) => {
                return Err(AuthenticationError::AccountLocked { username, until });
            }
            Err(RegulationError::Unavailable(source)) => {
                return Err(AuthenticationError::LockoutEvaluationFailed { username, source });
            }
        }
        log::trace!("Hit first factor post regulator check complete");

        log::trace!("Hit first factor post password check start");
        let password_ok = providers
            .users
            .check_user_password(&username, &attempt.password)
            .await;
        log::trace!("Hit first factor post password check complete");

        match password_ok {
            Ok(true) => {}
            Ok(false) => {
                self.mark_failed(&username).await;
                return Err(AuthenticationError::InvalidCredential { username });
            }
            Err(source) => {
                self.mark_failed(&username).await;
                return Err(AuthenticationError::CredentialCheckFailed { username, source });
            }
        }

        log::debug!("Mark authentication attempt made by user {}", username);
        providers
            .regulator
            .mark(&username, true)
            .await
            .map_err(|source| AuthenticationError::MarkFailed {
                username: username.clone(),
                source,
            })?;

        log::debug!("Credentials validation of user {} is ok", username);

        // Drop whatever the previous session held before handing out a new identifier
        let mut user_session = providers.sessions.new_default_session();
        providers
            .sessions
            .save_session(session_id.as_str(), user_session.clone())
            .await
            .map_err(|source| AuthenticationError::SessionResetFailed {
                username: username.clone(),
                source,
            })?;

        let regenerated = providers
            .sessions
            .regenerate_session_id(session_id.as_str())
            .await
            .map_err(|source| AuthenticationError::SessionRegenerateFailed {
                username: username.clone(),
                source,
            })?;
        *session_id = regenerated;

        let remember_me = providers.sessions.remember_me();
        let keep_me_logged_in = !remember_me.is_zero() && attempt.keep_me_logged_in == Some(true);

        if keep_me_logged_in {
            providers
                .sessions
                .update_expiration(session_id.as_str(), remember_me)
                .await
                .map_err(|source| AuthenticationError::ExpirationUpdateFailed {
                    username: username.clone(),
                    source,
                })?;
        }

        let details = providers
            .users
            .get_details(&username)
            .await
            .map_err(|source| AuthenticationError::UserDetailsFailed {
                username: username.clone(),
                source,
            })?;

        log::trace!(
            "Details for user {} => groups: {:?}, emails {:?}",
            username,
            details.groups,
            details.emails
        );

        let now = Utc::now();
        user_session.username = details.username;
        user_session.display_name = details.display_name;
        user_session.groups = details.groups;
        user_session.emails = details.emails;
        user_session.authentication_level = AuthenticationLevel::OneFactor;
        user_session.last_activity = now.timestamp();
        user_session.keep_me_logged_in = keep_me_logged_in;
        user_session.refresh_ttl = self.refresh_interval.deadline(now);

        providers
            .sessions
            .save_session(session_id.as_str(), user_session.clone())
            .await
            .map_err(|source| AuthenticationError::SessionSaveFailed {
                username: username.clone(),
                source,
            })?;

        timer.mark_successful();
        self.security_logger
            .log_event(SecurityEvent::AuthenticationSuccess {
                username: user_session.username.clone(),
            })
            .await;

        let body = providers
            .responder
            .finalize(
                attempt.target_url.as_deref(),
                attempt.request_method.as_deref(),
                &user_session.username,
                &user_session.groups,
            )
            .await
            .map_err(|source| AuthenticationError::ResponseFailed { username, source })?;

        Ok(FirstFactorSuccess {
            body,
            session_max_age: keep_me_logged_in.then_some(remember_me),
        })
    }

    async fn mark_failed(&self, username: &str) {
        log::debug!("Mark authentication attempt made by user {}", username);
        if let Err(e) = self.providers.regulator.mark(username, false).await {
            log::error!("Unable to mark authentication: {}", e);
        }
    }

    async fn report_failure(&self, err: &AuthenticationError) {
        log::error!("{}", err);
        let event = match err {
            AuthenticationError::AccountLocked { username, until } => SecurityEvent::AccountLocked {
                username: username.clone(),
                until: *until,
            },
            _ => SecurityEvent::AuthenticationFailed {
                username: err.username().map(String::from),
                reason: err.to_string(),
            },
        };
        self.security_logger.log_event(event).await;
    }
}
