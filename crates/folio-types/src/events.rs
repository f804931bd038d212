use serde::{Deserialize, Serialize};

use crate::models::EventFlag;

/// Commit metadata supplied by the document store alongside an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Document name at the time of the commit.
    pub name: String,
    /// Account that authored the commit.
    pub author: String,
    /// Commit message.
    pub message: String,
    /// Link to the previous version, if any.
    pub previous_version: Option<String>,
}

/// Events raised on shared documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DocEvent {
    /// A new version of the document was committed
    Updated {
        document_id: String,
        commit: CommitInfo,
    },

    /// The document was deleted
    Deleted {
        document_id: String,
        account_id: String,
    },

    /// The document was forked into a new copy
    Forked {
        document_id: String,
        commit: CommitInfo,
    },

    /// A chat message was posted on the document
    Chat {
        document_id: String,
        account_id: String,
        message: String,
    },
}

impl DocEvent {
    /// The document this event is scoped to.
    pub fn document_id(&self) -> &str {
        match self {
            Self::Updated { document_id, .. } => document_id,
            Self::Deleted { document_id, .. } => document_id,
            Self::Forked { document_id, .. } => document_id,
            Self::Chat { document_id, .. } => document_id,
        }
    }

    /// The account that caused this event, used for self-exclusion.
    /// Every current variant carries one; future system-originated events may not.
    pub fn originating_account(&self) -> Option<&str> {
        match self {
            Self::Updated { commit, .. } => Some(&commit.author),
            Self::Deleted { account_id, .. } => Some(account_id),
            Self::Forked { commit, .. } => Some(&commit.author),
            Self::Chat { account_id, .. } => Some(account_id),
        }
    }

    /// The follower flag that authorizes mail for this event class.
    pub fn required_flag(&self) -> EventFlag {
        match self {
            Self::Chat { .. } => EventFlag::Chat,
            _ => EventFlag::Update,
        }
    }
}
