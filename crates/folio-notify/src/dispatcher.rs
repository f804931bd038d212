use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use folio_db::Database;
use folio_queue::MailQueue;
use folio_types::events::DocEvent;
use folio_types::models::{DeliveryPreference, FlagSet, QueuedMail};

use crate::config::NotifyConfig;
use crate::notice;
use crate::transport::{AccountDirectory, MailTransport, PresenceTransport};

/// Routes a document event to every follower of the document: an in-band
/// notice over the presence transport for everyone, and mail according to
/// the follower's flags and the account's delivery preference.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    db: Arc<Database>,
    queue: Arc<MailQueue>,
    presence: Arc<dyn PresenceTransport>,
    mail: Arc<dyn MailTransport>,
    directory: Arc<dyn AccountDirectory>,
    /// Nudges the scheduler after an immediate-send failure was requeued,
    /// so the fallback record does not wait a full day.
    drain_tx: mpsc::Sender<()>,
    mail_timeout: Duration,
    /// Diagnostic override: also notify the account that caused the event.
    notify_self: bool,
}

impl Dispatcher {
    pub fn new(
        db: Arc<Database>,
        queue: Arc<MailQueue>,
        presence: Arc<dyn PresenceTransport>,
        mail: Arc<dyn MailTransport>,
        directory: Arc<dyn AccountDirectory>,
        drain_tx: mpsc::Sender<()>,
        config: &NotifyConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                db,
                queue,
                presence,
                mail,
                directory,
                drain_tx,
                mail_timeout: config.mail_timeout,
                notify_self: config.notify_self,
            }),
        }
    }

    /// Fan an event out to the document's followers. Per-follower failures
    /// are logged and isolated so one bad record cannot block the rest.
    pub async fn dispatch(&self, event: &DocEvent) {
        let document_id = event.document_id().to_string();

        // Run the blocking store lookup off the async runtime
        let db = self.inner.db.clone();
        let doc = document_id.clone();
        let followers = match tokio::task::spawn_blocking(move || db.followers_of(&doc)).await {
            Ok(Ok(followers)) => followers,
            Ok(Err(e)) => {
                error!("Follower lookup failed for {}: {:#}", document_id, e);
                return;
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return;
            }
        };

        debug!(
            "Dispatching {:?} event on {} to {} follower(s)",
            event.required_flag(),
            document_id,
            followers.len()
        );

        for (account_id, flags) in followers {
            if let Err(e) = self.notify_follower(event, &account_id, &flags).await {
                warn!(
                    "Notifying {} about {} failed: {:#}",
                    account_id, document_id, e
                );
            }
        }
    }

    async fn notify_follower(
        &self,
        event: &DocEvent,
        account_id: &str,
        flags: &FlagSet,
    ) -> anyhow::Result<()> {
        // No self-notification unless the diagnostic override is on
        if !self.inner.notify_self && event.originating_account() == Some(account_id) {
            return Ok(());
        }

        // In-band notice goes out regardless of flags; best effort, never
        // retried. Flags only gate mail.
        self.inner
            .presence
            .send_to_account(account_id, &notice::short_notice(event))
            .await;

        if !flags.contains(&event.required_flag()) {
            return Ok(());
        }

        match self
            .inner
            .directory
            .delivery_preference(account_id)
            .await?
        {
            DeliveryPreference::Never => Ok(()),
            DeliveryPreference::Daily => self.enqueue(QueuedMail::new(account_id, event)).await,
            DeliveryPreference::Immediate => self.send_immediate(event, account_id).await,
        }
    }

    async fn send_immediate(&self, event: &DocEvent, account_id: &str) -> anyhow::Result<()> {
        let Some(recipient) = self.inner.directory.email(account_id).await? else {
            warn!("No email address for {}, skipping immediate mail", account_id);
            return Ok(());
        };

        let mail = QueuedMail::new(account_id, event);
        let subject = notice::mail_subject(&mail);
        let body = notice::mail_body(&mail);

        let attempt = tokio::time::timeout(
            self.inner.mail_timeout,
            self.inner
                .mail
                .send_mail(account_id, &recipient, &body, &subject),
        )
        .await;

        let reason = match attempt {
            Ok(Ok(())) => {
                debug!("Immediate mail to {} sent", account_id);
                return Ok(());
            }
            Ok(Err(failure)) => failure.to_string(),
            Err(_) => "mail transport timed out".to_string(),
        };

        warn!(
            "Immediate mail to {} failed ({}), queueing for retry",
            account_id, reason
        );

        // The failed immediate attempt does not consume retry budget: the
        // record enters the queue as New, exactly like the daily path.
        self.enqueue(mail).await?;

        // Ask the scheduler for an early drain to bound staleness. Best
        // effort: a full or closed channel just means the next drain picks
        // the record up.
        let _ = self.inner.drain_tx.try_send(());

        Ok(())
    }

    async fn enqueue(&self, mail: QueuedMail) -> anyhow::Result<()> {
        let queue = self.inner.queue.clone();
        tokio::task::spawn_blocking(move || queue.enqueue(&mail))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }
}
