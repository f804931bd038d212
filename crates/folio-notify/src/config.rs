use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::scheduler::SchedulerConfig;

/// Runtime configuration. Every option has a development default and an
/// environment-variable override, loaded via `from_env`.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Follower database location.
    pub db_path: PathBuf,
    /// Mail queue file location.
    pub queue_path: PathBuf,
    /// Local time-of-day of the scheduled daily drain.
    pub drain_hour: u32,
    pub drain_minute: u32,
    /// Additional delivery attempts after the first failure.
    pub retry_budget: u32,
    /// Upper bound on a single mail-transport call.
    pub mail_timeout: Duration,
    /// Diagnostic override: also notify the account that caused an event.
    pub notify_self: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            db_path: "folio-followers.db".into(),
            queue_path: "folio-mail-queue.jsonl".into(),
            drain_hour: 3,
            drain_minute: 0,
            retry_budget: 3,
            mail_timeout: Duration::from_secs(30),
            notify_self: false,
        }
    }
}

impl NotifyConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("FOLIO_DB_PATH") {
            cfg.db_path = v.into();
        }
        if let Ok(v) = std::env::var("FOLIO_QUEUE_PATH") {
            cfg.queue_path = v.into();
        }
        if let Ok(v) = std::env::var("FOLIO_DRAIN_HOUR") {
            cfg.drain_hour = v.parse().context("FOLIO_DRAIN_HOUR must be a number")?;
        }
        if let Ok(v) = std::env::var("FOLIO_DRAIN_MINUTE") {
            cfg.drain_minute = v.parse().context("FOLIO_DRAIN_MINUTE must be a number")?;
        }
        if let Ok(v) = std::env::var("FOLIO_RETRY_BUDGET") {
            cfg.retry_budget = v.parse().context("FOLIO_RETRY_BUDGET must be a number")?;
        }
        if let Ok(v) = std::env::var("FOLIO_MAIL_TIMEOUT_SECS") {
            let secs: u64 = v.parse().context("FOLIO_MAIL_TIMEOUT_SECS must be a number")?;
            cfg.mail_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("FOLIO_NOTIFY_SELF") {
            cfg.notify_self = matches!(v.as_str(), "1" | "true" | "yes");
        }

        if cfg.drain_hour > 23 || cfg.drain_minute > 59 {
            bail!(
                "invalid drain time {}:{:02}",
                cfg.drain_hour,
                cfg.drain_minute
            );
        }

        Ok(cfg)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            drain_hour: self.drain_hour,
            drain_minute: self.drain_minute,
            retry_budget: self.retry_budget,
            mail_timeout: self.mail_timeout,
        }
    }
}
