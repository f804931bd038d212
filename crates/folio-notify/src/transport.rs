//! Interfaces to the collaborators this core drives but does not own:
//! the live-presence transport, the outbound mail relay, and the account
//! profile store.

use async_trait::async_trait;
use thiserror::Error;

use folio_types::models::DeliveryPreference;

/// Reason an outbound mail handoff failed.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct MailFailure {
    pub reason: String,
}

impl MailFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Delivers short in-band notices to currently connected accounts.
/// Best effort: no outcome is consulted and nothing is retried. An offline
/// account simply does not receive the notice.
#[async_trait]
pub trait PresenceTransport: Send + Sync {
    async fn send_to_account(&self, account_id: &str, notice: &str);
}

/// Hands a rendered message to the outbound mail relay.
/// Must be safe to call from the scheduler's drain loop and from request
/// tasks (immediate mode). Callers impose their own timeout.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send_mail(
        &self,
        account_id: &str,
        recipient: &str,
        body: &str,
        subject: &str,
    ) -> Result<(), MailFailure>;
}

/// Account profile store: addresses and mail cadence. Read-only here.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn email(&self, account_id: &str) -> anyhow::Result<Option<String>>;

    async fn delivery_preference(&self, account_id: &str) -> anyhow::Result<DeliveryPreference>;
}
