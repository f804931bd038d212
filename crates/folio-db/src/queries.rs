use anyhow::Result;
use rusqlite::OptionalExtension;
use tracing::warn;

use folio_types::models::FlagSet;

use crate::Database;
use crate::models::FollowerRow;

impl Database {
    /// Set the flags an account follows a document with, replacing any
    /// previous set. An empty set deletes the record. Idempotent.
    pub fn follow(&self, document_id: &str, account_id: &str, flags: &FlagSet) -> Result<()> {
        if flags.is_empty() {
            return self.with_conn(|conn| {
                conn.execute(
                    "DELETE FROM followers WHERE document_id = ?1 AND account_id = ?2",
                    (document_id, account_id),
                )?;
                Ok(())
            });
        }

        let encoded = serde_json::to_string(flags)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO followers (document_id, account_id, flags) VALUES (?1, ?2, ?3)
                 ON CONFLICT (document_id, account_id) DO UPDATE SET flags = excluded.flags",
                (document_id, account_id, &encoded),
            )?;
            Ok(())
        })
    }

    /// Remove `flags` from an account's subscription on a document.
    /// Removing the last flag deletes the record; not following is a no-op.
    pub fn unfollow(&self, document_id: &str, account_id: &str, flags: &FlagSet) -> Result<()> {
        let Some(current) = self.follower_flags(document_id, account_id)? else {
            return Ok(());
        };

        let remaining: FlagSet = current.difference(flags).copied().collect();
        self.follow(document_id, account_id, &remaining)
    }

    /// Current flags for one (document, account) pair, if following.
    pub fn follower_flags(&self, document_id: &str, account_id: &str) -> Result<Option<FlagSet>> {
        let raw: Option<String> = self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT flags FROM followers WHERE document_id = ?1 AND account_id = ?2",
                    (document_id, account_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(raw)
        })?;

        Ok(raw.and_then(|raw| decode_flags(document_id, account_id, &raw)))
    }

    /// All current followers of a document with their flags.
    /// Iteration order is the backing store's key order; callers must not
    /// rely on it.
    pub fn followers_of(&self, document_id: &str) -> Result<Vec<(String, FlagSet)>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT document_id, account_id, flags FROM followers WHERE document_id = ?1",
            )?;

            let rows = stmt
                .query_map([document_id], |row| {
                    Ok(FollowerRow {
                        document_id: row.get(0)?,
                        account_id: row.get(1)?,
                        flags: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                decode_flags(&row.document_id, &row.account_id, &row.flags)
                    .map(|flags| (row.account_id, flags))
            })
            .collect())
    }
}

/// Decode a stored flag set, skipping the row on corrupt JSON so one bad
/// record cannot block the rest of the fan-out.
fn decode_flags(document_id: &str, account_id: &str, raw: &str) -> Option<FlagSet> {
    match serde_json::from_str::<FlagSet>(raw) {
        Ok(flags) if flags.is_empty() => {
            warn!(
                "Empty flag set stored for ({}, {}), treating as not following",
                document_id, account_id
            );
            None
        }
        Ok(flags) => Some(flags),
        Err(e) => {
            warn!(
                "Corrupt flags '{}' for ({}, {}): {}",
                raw, document_id, account_id, e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use folio_types::models::EventFlag;

    use super::*;

    fn open_temp_db() -> Database {
        let path = std::env::temp_dir().join(format!("folio-db-test-{}.db", uuid::Uuid::new_v4()));
        Database::open(&path).unwrap()
    }

    fn flags(values: &[EventFlag]) -> FlagSet {
        values.iter().copied().collect()
    }

    #[test]
    fn follow_then_lookup() {
        let db = open_temp_db();

        db.follow("doc-1", "alice", &flags(&[EventFlag::Update]))
            .unwrap();

        assert_eq!(
            db.follower_flags("doc-1", "alice").unwrap(),
            Some(flags(&[EventFlag::Update]))
        );
        assert_eq!(db.follower_flags("doc-1", "bob").unwrap(), None);
    }

    #[test]
    fn follow_replaces_not_merges() {
        let db = open_temp_db();

        db.follow("doc-1", "alice", &flags(&[EventFlag::Update]))
            .unwrap();
        db.follow("doc-1", "alice", &flags(&[EventFlag::Chat]))
            .unwrap();

        assert_eq!(
            db.follower_flags("doc-1", "alice").unwrap(),
            Some(flags(&[EventFlag::Chat]))
        );
    }

    #[test]
    fn follow_empty_set_deletes() {
        let db = open_temp_db();

        db.follow("doc-1", "alice", &flags(&[EventFlag::Update, EventFlag::Chat]))
            .unwrap();
        db.follow("doc-1", "alice", &FlagSet::new()).unwrap();

        assert_eq!(db.follower_flags("doc-1", "alice").unwrap(), None);
        assert!(db.followers_of("doc-1").unwrap().is_empty());
    }

    #[test]
    fn unfollow_is_set_difference() {
        let db = open_temp_db();

        db.follow("doc-1", "alice", &flags(&[EventFlag::Update, EventFlag::Chat]))
            .unwrap();
        db.unfollow("doc-1", "alice", &flags(&[EventFlag::Chat]))
            .unwrap();

        assert_eq!(
            db.follower_flags("doc-1", "alice").unwrap(),
            Some(flags(&[EventFlag::Update]))
        );

        // Removing the last flag deletes the record
        db.unfollow("doc-1", "alice", &flags(&[EventFlag::Update]))
            .unwrap();
        assert_eq!(db.follower_flags("doc-1", "alice").unwrap(), None);
    }

    #[test]
    fn unfollow_when_not_following_is_noop() {
        let db = open_temp_db();

        db.unfollow("doc-1", "alice", &flags(&[EventFlag::Update]))
            .unwrap();

        assert_eq!(db.follower_flags("doc-1", "alice").unwrap(), None);
    }

    #[test]
    fn followers_of_lists_current_followers() {
        let db = open_temp_db();

        db.follow("doc-1", "alice", &flags(&[EventFlag::Update]))
            .unwrap();
        db.follow("doc-1", "bob", &flags(&[EventFlag::Chat]))
            .unwrap();
        db.follow("doc-2", "carol", &flags(&[EventFlag::Update]))
            .unwrap();

        let mut followers = db.followers_of("doc-1").unwrap();
        followers.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            followers,
            vec![
                ("alice".to_string(), flags(&[EventFlag::Update])),
                ("bob".to_string(), flags(&[EventFlag::Chat])),
            ]
        );
    }
}
