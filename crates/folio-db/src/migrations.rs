use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS followers (
            document_id  TEXT NOT NULL,
            account_id   TEXT NOT NULL,
            flags        TEXT NOT NULL,
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (document_id, account_id)
        );
        ",
    )?;

    info!("Follower database migrations complete");
    Ok(())
}
