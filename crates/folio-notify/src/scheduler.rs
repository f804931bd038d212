use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Local, NaiveDateTime, NaiveTime};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use folio_queue::MailQueue;
use folio_types::models::{DeliveryPreference, QueuedMail, RetryState};

use crate::notice;
use crate::transport::{AccountDirectory, MailTransport};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Local time-of-day of the scheduled daily drain.
    pub drain_hour: u32,
    pub drain_minute: u32,
    /// Attempts granted after the first failure; total attempts are
    /// bounded at 1 + budget.
    pub retry_budget: u32,
    /// Upper bound on a single mail-transport call. The transport is not
    /// trusted to time out on its own.
    pub mail_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drain_hour: 3,
            drain_minute: 0,
            retry_budget: 3,
            mail_timeout: Duration::from_secs(30),
        }
    }
}

/// Drives queue drains: once a day at the configured local time, and
/// whenever an on-demand drain is requested over the signal channel.
pub struct MailScheduler {
    queue: Arc<MailQueue>,
    mail: Arc<dyn MailTransport>,
    directory: Arc<dyn AccountDirectory>,
    drain_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    config: SchedulerConfig,
}

impl MailScheduler {
    pub fn new(
        queue: Arc<MailQueue>,
        mail: Arc<dyn MailTransport>,
        directory: Arc<dyn AccountDirectory>,
        drain_rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            queue,
            mail,
            directory,
            drain_rx,
            cancel,
            config,
        }
    }

    /// Run until cancelled. Each trigger spawns a detached drain task so a
    /// slow mail-transport call never delays the next scheduled wake-up.
    pub async fn run(mut self) {
        info!(
            "Mail scheduler running, daily drain at {:02}:{:02} local",
            self.config.drain_hour, self.config.drain_minute
        );

        loop {
            let wait = until_next_drain(
                self.config.drain_hour,
                self.config.drain_minute,
                Local::now().naive_local(),
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Mail scheduler stopping");
                    return;
                }
                signal = self.drain_rx.recv() => {
                    if signal.is_none() {
                        info!("Drain signal channel closed, mail scheduler stopping");
                        return;
                    }
                    debug!("On-demand drain requested");
                }
                _ = tokio::time::sleep(wait) => {
                    debug!("Scheduled daily drain");
                }
            }

            tokio::spawn(drain_cycle(
                self.queue.clone(),
                self.mail.clone(),
                self.directory.clone(),
                self.config,
            ));
        }
    }
}

/// Sleep until the next occurrence of (hour, minute): today if that
/// instant is still ahead, otherwise tomorrow.
fn until_next_drain(hour: u32, minute: u32, now: NaiveDateTime) -> Duration {
    let target = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);

    let next = if now.time() < target {
        now.date().and_time(target)
    } else {
        (now.date() + Days::new(1)).and_time(target)
    };

    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// One claim-and-process pass over the queue. Also invoked directly for
/// on-demand drains. The queue lock is released before any transport call.
pub async fn drain_cycle(
    queue: Arc<MailQueue>,
    mail: Arc<dyn MailTransport>,
    directory: Arc<dyn AccountDirectory>,
    config: SchedulerConfig,
) {
    let claim_queue = queue.clone();
    let claimed = match tokio::task::spawn_blocking(move || claim_queue.drain_and_claim()).await {
        Ok(Ok(claimed)) => claimed,
        Ok(Err(e)) => {
            // Claim failures (including quarantined segments) end the cycle;
            // nothing has been consumed.
            error!("Queue drain failed: {:#}", e);
            return;
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return;
        }
    };

    if claimed.is_empty() {
        debug!("Drain cycle: queue empty");
        return;
    }

    info!("Drain cycle: processing {} record(s)", claimed.len());

    let mut requeue = Vec::new();
    for record in claimed {
        // A record claimed with no attempts left was exhausted on a
        // previous cycle: drop it permanently. This structured line is the
        // only dead-letter surface.
        if let RetryState::Retry {
            remaining: 0,
            reason,
        } = &record.retry
        {
            warn!(
                "Dropping mail for {} on {} after exhausting retries (last failure: {})",
                record.account_id, record.document_id, reason
            );
            continue;
        }

        match attempt_delivery(mail.as_ref(), directory.as_ref(), &record, config.mail_timeout)
            .await
        {
            DeliveryOutcome::Delivered => {
                debug!(
                    "Mail for {} on {} delivered",
                    record.account_id, record.document_id
                );
            }
            DeliveryOutcome::Discarded => {
                debug!(
                    "Mail for {} discarded, preference is now never",
                    record.account_id
                );
            }
            DeliveryOutcome::Failed(reason) => {
                let retry = match &record.retry {
                    RetryState::New => RetryState::Retry {
                        remaining: config.retry_budget,
                        reason,
                    },
                    RetryState::Retry { remaining, .. } => RetryState::Retry {
                        remaining: remaining - 1,
                        reason,
                    },
                };
                requeue.push(QueuedMail { retry, ..record });
            }
        }
    }

    // Surviving records go back on the queue for the next cycle
    for record in requeue {
        let queue = queue.clone();
        let result = tokio::task::spawn_blocking(move || {
            let state = record.retry.clone();
            queue.enqueue(&record).map(|_| state)
        })
        .await;

        match result {
            Ok(Ok(state)) => debug!("Requeued failed mail with state {:?}", state),
            Ok(Err(e)) => error!("Requeue after failed delivery failed: {:#}", e),
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }
}

enum DeliveryOutcome {
    Delivered,
    /// Preference changed to never since enqueue; record is dropped.
    Discarded,
    Failed(String),
}

async fn attempt_delivery(
    mail: &dyn MailTransport,
    directory: &dyn AccountDirectory,
    record: &QueuedMail,
    timeout: Duration,
) -> DeliveryOutcome {
    // Preferences may have changed since the record was enqueued
    match directory.delivery_preference(&record.account_id).await {
        Ok(DeliveryPreference::Never) => return DeliveryOutcome::Discarded,
        Ok(_) => {}
        Err(e) => return DeliveryOutcome::Failed(format!("preference lookup failed: {:#}", e)),
    }

    let recipient = match directory.email(&record.account_id).await {
        Ok(Some(recipient)) => recipient,
        Ok(None) => return DeliveryOutcome::Failed("no email address on file".to_string()),
        Err(e) => return DeliveryOutcome::Failed(format!("address lookup failed: {:#}", e)),
    };

    let subject = notice::mail_subject(record);
    let body = notice::mail_body(record);

    match tokio::time::timeout(
        timeout,
        mail.send_mail(&record.account_id, &recipient, &body, &subject),
    )
    .await
    {
        Ok(Ok(())) => DeliveryOutcome::Delivered,
        Ok(Err(failure)) => DeliveryOutcome::Failed(failure.to_string()),
        Err(_) => DeliveryOutcome::Failed("mail transport timed out".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 6)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn drain_later_today_when_still_ahead() {
        let wait = until_next_drain(10, 30, at(10, 0, 0));
        assert_eq!(wait, Duration::from_secs(30 * 60));
    }

    #[test]
    fn drain_tomorrow_when_already_past() {
        let wait = until_next_drain(10, 30, at(11, 0, 0));
        assert_eq!(wait, Duration::from_secs(23 * 3600 + 30 * 60));
    }

    #[test]
    fn drain_exactly_at_configured_instant_waits_a_day() {
        let wait = until_next_drain(10, 30, at(10, 30, 0));
        assert_eq!(wait, Duration::from_secs(24 * 3600));
    }
}
