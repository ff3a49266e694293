//! Gate configuration module
//! Handles configuration parameters of the first factor gate, loaded from the environment

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BAN_TIME_SECS, DEFAULT_FIND_TIME_SECS, DEFAULT_HOST, DEFAULT_INITIAL_DELAY_MS,
    DEFAULT_MAXIMUM_RANDOM_DELAY_MS, DEFAULT_MAX_RETRIES, DEFAULT_MAX_TRACKED_USERS,
    DEFAULT_MINIMUM_DELAY_MS, DEFAULT_MOVING_AVERAGE_WINDOW, DEFAULT_PORT,
    DEFAULT_REMEMBER_ME_SECS, DEFAULT_SESSION_COOKIE, DEFAULT_SESSION_EXPIRATION_SECS,
};
use crate::core::regulator::RegulationPolicy;
use crate::error::{GateError, Result};

/// Timing attack mitigation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Disabling this lets responses return as fast as the code path allows
    pub enabled: bool,
    /// Number of successful durations kept in the moving average
    pub window_size: usize,
    /// Seed of every window slot at startup
    pub initial_delay_ms: u64,
    /// Floor of the target response time
    pub minimum_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter
    pub maximum_jitter_ms: u64,
}

impl TimingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(GateError::ConfigError(
                "Timing window size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: DEFAULT_MOVING_AVERAGE_WINDOW,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            minimum_delay_ms: DEFAULT_MINIMUM_DELAY_MS,
            maximum_jitter_ms: DEFAULT_MAXIMUM_RANDOM_DELAY_MS,
        }
    }
}

/// When the user profile must be refreshed from the user provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshInterval {
    Disabled,
    Always,
    Every(Duration),
}

impl RefreshInterval {
    /// Parse `disable`, `always` or a number of seconds
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "disable" | "disabled" => Ok(RefreshInterval::Disabled),
            "always" => Ok(RefreshInterval::Always),
            other => other
                .parse::<u64>()
                .map(|secs| RefreshInterval::Every(Duration::from_secs(secs)))
                .map_err(|_| {
                    GateError::ConfigError(format!(
                        "Refresh interval must be 'disable', 'always' or a number of seconds, got '{}'",
                        value
                    ))
                }),
        }
    }

    /// Profile refresh deadline of a session created at `now`
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            RefreshInterval::Disabled => None,
            RefreshInterval::Always => Some(now),
            RefreshInterval::Every(interval) => ChronoDuration::from_std(*interval)
                .ok()
                .and_then(|interval| now.checked_add_signed(interval)),
        }
    }
}

/// Session cookie and lifetime parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Protected domain, also the cookie domain
    pub domain: Option<String>,
    pub expiration: Duration,
    /// Zero disables remember me
    pub remember_me: Duration,
}

/// Gate configuration parameters
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub host: String,
    pub port: u16,
    pub timing: TimingConfig,
    pub regulation: RegulationPolicy,
    /// Maximum number of users the regulator keeps history for
    pub max_tracked_users: usize,
    pub session: SessionConfig,
    pub refresh_interval: RefreshInterval,
    pub default_redirection_url: Option<String>,
    /// JSON users database
    pub users_file: String,
    /// TLS configuration
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub enable_tls: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        panic!("GateConfig::default() is not allowed for security reasons. Use GateConfig::from_env() instead.");
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

impl GateConfig {
    /// Create a test configuration - DANGEROUS: Only for testing!
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            timing: TimingConfig {
                enabled: true,
                window_size: 3,
                initial_delay_ms: 20,
                minimum_delay_ms: 10,
                maximum_jitter_ms: 5,
            },
            regulation: RegulationPolicy {
                max_retries: DEFAULT_MAX_RETRIES,
                find_time: Duration::from_secs(DEFAULT_FIND_TIME_SECS),
                ban_time: Duration::from_secs(DEFAULT_BAN_TIME_SECS),
            },
            max_tracked_users: 100,
            session: SessionConfig {
                cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
                domain: Some("example.com".to_string()),
                expiration: Duration::from_secs(DEFAULT_SESSION_EXPIRATION_SECS),
                remember_me: Duration::from_secs(DEFAULT_REMEMBER_ME_SECS),
            },
            refresh_interval: RefreshInterval::Every(Duration::from_secs(300)),
            default_redirection_url: None,
            users_file: "users.json".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            enable_tls: false,
        }
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;

        if self.max_tracked_users == 0 {
            return Err(GateError::ConfigError(
                "Regulator must track at least one user".to_string(),
            ));
        }

        if self.session.cookie_name.is_empty()
            || !self.session.cookie_name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(GateError::ConfigError(format!(
                "Invalid session cookie name '{}'",
                self.session.cookie_name
            )));
        }

        if let Some(ref url) = self.default_redirection_url {
            url::Url::parse(url).map_err(|e| {
                GateError::ConfigError(format!("Invalid default redirection URL '{}': {}", url, e))
            })?;
        }

        if self.enable_tls {
            if self.tls_cert_path.is_none() || self.tls_key_path.is_none() {
                return Err(GateError::ConfigError(
                    "TLS is enabled but AUTH_GATE_TLS_CERT_PATH or AUTH_GATE_TLS_KEY_PATH is not set".to_string()
                ));
            }

            if let (Some(ref cert_path), Some(ref key_path)) = (&self.tls_cert_path, &self.tls_key_path) {
                if !std::path::Path::new(cert_path).exists() {
                    return Err(GateError::ConfigError(
                        format!("TLS certificate file does not exist: {}", cert_path)
                    ));
                }
                if !std::path::Path::new(key_path).exists() {
                    return Err(GateError::ConfigError(
                        format!("TLS private key file does not exist: {}", key_path)
                    ));
                }
            }
        }

        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("AUTH_GATE_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env_or("AUTH_GATE_PORT", DEFAULT_PORT);

        let timing = TimingConfig {
            enabled: env_flag("AUTH_GATE_TIMING_ENABLED", true), // SECURITY: Default to true
            window_size: env_or("AUTH_GATE_TIMING_WINDOW", DEFAULT_MOVING_AVERAGE_WINDOW),
            initial_delay_ms: env_or("AUTH_GATE_TIMING_INITIAL_DELAY_MS", DEFAULT_INITIAL_DELAY_MS),
            minimum_delay_ms: env_or("AUTH_GATE_TIMING_MINIMUM_DELAY_MS", DEFAULT_MINIMUM_DELAY_MS),
            maximum_jitter_ms: env_or("AUTH_GATE_TIMING_MAXIMUM_JITTER_MS", DEFAULT_MAXIMUM_RANDOM_DELAY_MS),
        };

        let regulation = RegulationPolicy {
            max_retries: env_or("AUTH_GATE_REGULATION_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            find_time: Duration::from_secs(env_or("AUTH_GATE_REGULATION_FIND_TIME", DEFAULT_FIND_TIME_SECS)),
            ban_time: Duration::from_secs(env_or("AUTH_GATE_REGULATION_BAN_TIME", DEFAULT_BAN_TIME_SECS)),
        };
        let max_tracked_users = env_or("AUTH_GATE_REGULATION_MAX_TRACKED_USERS", DEFAULT_MAX_TRACKED_USERS);

        let session = SessionConfig {
            cookie_name: env::var("AUTH_GATE_SESSION_COOKIE").unwrap_or(DEFAULT_SESSION_COOKIE.to_string()),
            domain: env::var("AUTH_GATE_SESSION_DOMAIN").ok().filter(|d| !d.is_empty()),
            expiration: Duration::from_secs(env_or("AUTH_GATE_SESSION_EXPIRATION", DEFAULT_SESSION_EXPIRATION_SECS)),
            remember_me: Duration::from_secs(env_or("AUTH_GATE_SESSION_REMEMBER_ME", DEFAULT_REMEMBER_ME_SECS)),
        };

        let refresh_interval = match env::var("AUTH_GATE_REFRESH_INTERVAL") {
            Ok(value) => RefreshInterval::parse(&value)?,
            Err(_) => RefreshInterval::Every(Duration::from_secs(300)),
        };

        let default_redirection_url = env::var("AUTH_GATE_DEFAULT_REDIRECTION_URL")
            .ok()
            .filter(|u| !u.is_empty());

        let users_file = env::var("AUTH_GATE_USERS_FILE").unwrap_or("users.json".to_string());

        // TLS configuration
        let enable_tls = env_flag("AUTH_GATE_ENABLE_TLS", false);
        let tls_cert_path = env::var("AUTH_GATE_TLS_CERT_PATH").ok();
        let tls_key_path = env::var("AUTH_GATE_TLS_KEY_PATH").ok();

        if !timing.enabled {
            log::warn!("SECURITY: Timing attack mitigation is disabled, first factor latency may leak attempt outcomes");
        }

        let config = Self {
            host,
            port,
            timing,
            regulation,
            max_tracked_users,
            session,
            refresh_interval,
            default_redirection_url,
            users_file,
            tls_cert_path,
            tls_key_path,
            enable_tls,
        };
        config.validate()?;
        Ok(config)
    }
}
