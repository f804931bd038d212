//! Durable, append-only mail queue.
//!
//! Pending notifications live in a plain JSON-lines file, one
//! self-describing record per line. A drain atomically renames the live
//! file to a staging name before reading it, so enqueues racing the drain
//! land in a fresh live file and are never lost or double-processed.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};
use uuid::Uuid;

use folio_types::models::QueuedMail;

/// Suffix of the staging file a drain claims records through.
const STAGING_SUFFIX: &str = ".draining";

pub struct MailQueue {
    live_path: PathBuf,
    staging_path: PathBuf,
    /// Shared by `enqueue` and `drain_and_claim`. Held only across the
    /// local file rotate/read, never across transport calls.
    lock: Mutex<()>,
}

impl MailQueue {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let live_path = path.into();
        if let Some(parent) = live_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating queue dir {}", parent.display()))?;
            }
        }

        let staging_path = sibling(&live_path, STAGING_SUFFIX);
        info!("Mail queue at {}", live_path.display());

        Ok(Self {
            live_path,
            staging_path,
            lock: Mutex::new(()),
        })
    }

    /// Append one record to the live queue file. Returns only after the
    /// append has been synced to disk. Safe against concurrent enqueues
    /// from multiple request threads and against a racing drain.
    pub fn enqueue(&self, record: &QueuedMail) -> Result<()> {
        let line = serde_json::to_string(record)?;

        let _guard = self
            .lock
            .lock()
            .map_err(|e| anyhow::anyhow!("queue lock poisoned: {}", e))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.live_path)
            .with_context(|| format!("opening queue file {}", self.live_path.display()))?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        debug!(
            "Queued mail for {} on document {}",
            record.account_id, record.document_id
        );
        Ok(())
    }

    /// Atomically claim and remove everything currently queued.
    ///
    /// The live file is renamed to the staging name under the lock, then
    /// parsed and deleted. A staging file left over from an interrupted
    /// cycle is recovered first, ahead of newer records. If any line fails
    /// to parse the whole segment is moved to a unique `.poison-*` path and
    /// the cycle fails; well-formed sibling records are preserved there
    /// for manual inspection, never silently dropped.
    pub fn drain_and_claim(&self) -> Result<Vec<QueuedMail>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| anyhow::anyhow!("queue lock poisoned: {}", e))?;

        if self.staging_path.exists() {
            // Interrupted previous cycle. Fold any newer live records onto
            // the recovered segment to keep insertion order.
            if self.live_path.exists() {
                let newer = fs::read(&self.live_path)?;
                let mut staged = OpenOptions::new().append(true).open(&self.staging_path)?;
                staged.write_all(&newer)?;
                staged.sync_all()?;
                fs::remove_file(&self.live_path)?;
            }
            warn!(
                "Recovering interrupted drain segment {}",
                self.staging_path.display()
            );
        } else if self.live_path.exists() {
            fs::rename(&self.live_path, &self.staging_path).with_context(|| {
                format!(
                    "rotating {} to {}",
                    self.live_path.display(),
                    self.staging_path.display()
                )
            })?;
        } else {
            // Nothing pending
            return Ok(Vec::new());
        }

        let records = match self.parse_staging() {
            Ok(records) => records,
            Err(e) => {
                let poison = sibling(&self.live_path, &format!(".poison-{}", Uuid::new_v4()));
                fs::rename(&self.staging_path, &poison)?;
                bail!("{} (segment quarantined at {})", e, poison.display());
            }
        };

        fs::remove_file(&self.staging_path)?;
        Ok(records)
    }

    fn parse_staging(&self) -> Result<Vec<QueuedMail>> {
        let file = File::open(&self.staging_path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: QueuedMail = serde_json::from_str(&line).with_context(|| {
                format!(
                    "malformed queue record at line {} of {}",
                    idx + 1,
                    self.staging_path.display()
                )
            })?;
            records.push(record);
        }

        Ok(records)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}
