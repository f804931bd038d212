//! Plain-text notice and mail formatting. Rich HTML rendering is a
//! collaborator concern; these are the minimal one-liners the core hands
//! to the transports.

use folio_types::events::DocEvent;
use folio_types::models::QueuedMail;

/// One-line notice shown in-band to connected followers.
pub fn short_notice(event: &DocEvent) -> String {
    match event {
        DocEvent::Updated {
            document_id,
            commit,
        } => format!(
            "{} updated {}: {}",
            commit.author, document_id, commit.message
        ),
        DocEvent::Deleted {
            document_id,
            account_id,
        } => format!("{} deleted {}", account_id, document_id),
        DocEvent::Forked {
            document_id,
            commit,
        } => format!("{} forked {}", commit.author, document_id),
        DocEvent::Chat {
            document_id,
            account_id,
            message,
        } => format!("{} on {}: {}", account_id, document_id, message),
    }
}

pub fn mail_subject(mail: &QueuedMail) -> String {
    match &mail.event {
        DocEvent::Updated { document_id, .. } => {
            format!("Document {} was updated", document_id)
        }
        DocEvent::Deleted { document_id, .. } => {
            format!("Document {} was deleted", document_id)
        }
        DocEvent::Forked { document_id, .. } => {
            format!("Document {} was forked", document_id)
        }
        DocEvent::Chat { document_id, .. } => {
            format!("New chat message on {}", document_id)
        }
    }
}

pub fn mail_body(mail: &QueuedMail) -> String {
    let mut body = short_notice(&mail.event);

    if let DocEvent::Updated { commit, .. } | DocEvent::Forked { commit, .. } = &mail.event {
        if let Some(previous) = &commit.previous_version {
            body.push_str(&format!("\n\nPrevious version: {}", previous));
        }
    }

    body
}
