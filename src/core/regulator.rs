//! Account lockout regulation
//!
//! A user is banned once `max_retries` consecutive failed attempts happened
//! within `find_time`. The ban lasts `ban_time` from the latest failure.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lru::LruCache;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{GateError, RegulationError, Result};

/// Trait for lockout backends consulted before verifying credentials
#[async_trait]
pub trait Regulator: Send + Sync {
    /// `Err(RegulationError::Banned)` while the user is locked out
    async fn regulate(&self, username: &str) -> std::result::Result<(), RegulationError>;

    /// Record the outcome of an attempt
    async fn mark(&self, username: &str, successful: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    time: DateTime<Utc>,
    successful: bool,
}

/// Regulation policy parameters
#[derive(Debug, Clone, Copy)]
pub struct RegulationPolicy {
    /// Failed attempts before a ban, 0 disables regulation
    pub max_retries: usize,
    pub find_time: Duration,
    pub ban_time: Duration,
}

/// In-memory regulator tracking the latest attempts of each user
pub struct MemoryRegulator {
    policy: RegulationPolicy,
    find_time: ChronoDuration,
    ban_time: ChronoDuration,
    // newest attempt first, at most `max_retries` entries per user
    attempts: Mutex<LruCache<String, VecDeque<Attempt>>>,
}

impl MemoryRegulator {
    pub fn new(policy: RegulationPolicy, max_tracked_users: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_tracked_users).ok_or_else(|| {
            GateError::ConfigError("Regulator must track at least one user".to_string())
        })?;
        let find_time = ChronoDuration::from_std(policy.find_time)
            .map_err(|e| GateError::ConfigError(format!("Invalid find time: {}", e)))?;
        let ban_time = ChronoDuration::from_std(policy.ban_time)
            .map_err(|e| GateError::ConfigError(format!("Invalid ban time: {}", e)))?;
        if find_time > ban_time {
            log::warn!("Regulation find time is longer than ban time");
        }

        Ok(Self {
            policy,
            find_time,
            ban_time,
            attempts: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.max_retries > 0
    }

    pub(crate) async fn regulate_at(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), RegulationError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let failures: Vec<DateTime<Utc>> = {
            let mut attempts = self.attempts.lock().await;
            match attempts.get(username) {
                Some(history) => history
                    .iter()
                    .take_while(|attempt| !attempt.successful)
                    .map(|attempt| attempt.time)
                    .collect(),
                None => return Ok(()),
            }
        };

        if failures.len() < self.policy.max_retries {
            return Ok(());
        }

        let latest = failures[0];
        let oldest = failures[self.policy.max_retries - 1];
        let until = latest + self.ban_time;

        if now >= until {
            return Ok(());
        }
        if latest - oldest <= self.find_time {
            return Err(RegulationError::Banned { until });
        }
        Ok(())
    }

    pub(crate) async fn mark_at(&self, username: &str, successful: bool, time: DateTime<Utc>) {
        if !self.is_enabled() {
            return;
        }

        let mut attempts = self.attempts.lock().await;
        let history = attempts.get_or_insert_mut(username.to_string(), VecDeque::new);
        history.push_front(Attempt { time, successful });
        history.truncate(self.policy.max_retries);
    }

    pub async fn tracked_users(&self) -> usize {
        self.attempts.lock().await.len()
    }
}

#[async_trait]
impl Regulator for MemoryRegulator {
    async fn regulate(&self, username: &str) -> std::result::Result<(), RegulationError> {
        self.regulate_at(username, Utc::now()).await
    }

    async fn mark(&self, username: &str, successful: bool) -> Result<()> {
        self.mark_at(username, successful, Utc::now()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regulator(max_retries: usize) -> MemoryRegulator {
        MemoryRegulator::new(
            RegulationPolicy {
                max_retries,
                find_time: Duration::from_secs(30),
                ban_time: Duration::from_secs(180),
            },
            100,
        )
        .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_600_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_bans_after_max_retries_in_find_time() {
        let regulator = regulator(3);
        regulator.mark_at("john", false, at(0)).await;
        regulator.mark_at("john", false, at(10)).await;
        assert!(regulator.regulate_at("john", at(11)).await.is_ok());

        regulator.mark_at("john", false, at(20)).await;
        match regulator.regulate_at("john", at(21)).await {
            Err(RegulationError::Banned { until }) => assert_eq!(until, at(200)),
            other => panic!("expected ban, got {:?}", other),
        }

        assert!(regulator.regulate_at("john", at(200)).await.is_ok());
        assert!(regulator.regulate_at("harry", at(21)).await.is_ok());
    }

    #[tokio::test]
    async fn test_failures_spread_beyond_find_time_do_not_ban() {
        let regulator = regulator(3);
        regulator.mark_at("john", false, at(0)).await;
        regulator.mark_at("john", false, at(20)).await;
        regulator.mark_at("john", false, at(40)).await;
        assert!(regulator.regulate_at("john", at(41)).await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let regulator = regulator(3);
        regulator.mark_at("john", false, at(0)).await;
        regulator.mark_at("john", false, at(1)).await;
        regulator.mark_at("john", true, at(2)).await;
        regulator.mark_at("john", false, at(3)).await;
        assert!(regulator.regulate_at("john", at(4)).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_regulator_never_bans() {
        let regulator = regulator(0);
        for i in 0..10 {
            regulator.mark_at("john", false, at(i)).await;
        }
        assert!(regulator.regulate_at("john", at(10)).await.is_ok());
        assert_eq!(regulator.tracked_users().await, 0);
    }

    #[tokio::test]
    async fn test_tracked_users_are_bounded() {
        let regulator = MemoryRegulator::new(
            RegulationPolicy {
                max_retries: 3,
                find_time: Duration::from_secs(30),
                ban_time: Duration::from_secs(180),
            },
            2,
        )
        .unwrap();
        for name in ["a", "b", "c"] {
            regulator.mark(name, false).await.unwrap();
        }
        assert_eq!(regulator.tracked_users().await, 2);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let policy = RegulationPolicy {
            max_retries: 3,
            find_time: Duration::from_secs(30),
            ban_time: Duration::from_secs(180),
        };
        assert!(MemoryRegulator::new(policy, 0).is_err());
    }
}
