use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::events::DocEvent;

/// Event classes a follower can subscribe to on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFlag {
    /// Document content changed (update, delete, fork)
    Update,
    /// A chat message was posted
    Chat,
}

/// Canonical form of a follower's subscribed flags: ordered, duplicate-free.
/// A follower record with an empty set does not exist; removing the last
/// flag deletes the record.
pub type FlagSet = BTreeSet<EventFlag>;

/// Account-level mail cadence, owned by the account directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryPreference {
    Never,
    Immediate,
    Daily,
}

/// Delivery attempt state of a queued mail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RetryState {
    /// Never attempted from the queue
    New,
    /// Failed at least once; `remaining` further attempts are allowed
    Retry { remaining: u32, reason: String },
}

/// One pending notification, serialized as a single self-describing
/// JSON line in the mail queue file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMail {
    /// Follower the mail is addressed to.
    pub account_id: String,
    /// Document the event happened on.
    pub document_id: String,
    /// The event being reported.
    pub event: DocEvent,
    /// Retry bookkeeping, advanced by the scheduler on each failed attempt.
    pub retry: RetryState,
}

impl QueuedMail {
    pub fn new(account_id: impl Into<String>, event: &DocEvent) -> Self {
        Self {
            account_id: account_id.into(),
            document_id: event.document_id().to_string(),
            event: event.clone(),
            retry: RetryState::New,
        }
    }
}
