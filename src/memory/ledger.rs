use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persistent set of feed message ids that have been fully handled
/// (replied to, declined by the model, or dropped after a rate limit).
///
/// Membership only grows. The whole set is rewritten to disk on every
/// insertion, via a temporary file renamed over the old one, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Debug)]
pub struct ReplyLedger {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl ReplyLedger {
    /// Load the ledger from `path`. A missing or unreadable file yields an
    /// empty ledger; bad ledger state must never stop the bot from starting.
    pub fn load(path: &Path) -> Self {
        let ids = match Self::read_ids(path) {
            Ok(ids) => {
                info!("Loaded {} handled ids from {}", ids.len(), path.display());
                ids
            }
            Err(e) => {
                warn!("Starting with an empty ledger: {:#}", e);
                BTreeSet::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            ids,
        }
    }

    fn read_ids(path: &Path) -> Result<BTreeSet<String>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger: {}", path.display()))?;
        let ids: Vec<String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse ledger: {}", path.display()))?;
        Ok(ids.into_iter().collect())
    }

    pub fn is_handled(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id` as handled and persist the full set.
    ///
    /// The id stays in the in-memory set even if persisting fails, so the
    /// running process never revisits it.
    pub fn mark_handled(&mut self, id: &str) -> Result<()> {
        if !self.ids.insert(id.to_string()) {
            debug!("Id {} already in ledger", id);
        }
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.ids).context("Failed to serialize ledger")?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        std::fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write ledger: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace ledger: {}", self.path.display()))?;
        Ok(())
    }
}
