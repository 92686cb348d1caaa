//! In-memory store of every grant discovered in this process.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use grantscout_shared::{Grant, GrantScoutError, Result};
use tracing::info;

/// Accumulated grants across runs. Only grows, through [`merge_unique`].
///
/// [`merge_unique`]: GrantRepository::merge_unique
#[derive(Debug, Clone, Default)]
pub struct GrantRepository {
    grants: Vec<Grant>,
    keys: HashSet<String>,
}

impl GrantRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower-cased titles of every stored grant, for deduplication.
    pub fn titles_lowercased(&self) -> HashSet<String> {
        self.keys.clone()
    }

    pub fn contains_title(&self, title: &str) -> bool {
        self.keys.contains(&grantscout_shared::normalize_title(title))
    }

    /// Add every grant whose title is not stored yet, returning the ones added.
    ///
    /// The batch is normally pre-filtered by dedup; re-checking here keeps the
    /// one-title-one-grant invariant even when it is not.
    pub fn merge_unique(&mut self, batch: Vec<Grant>) -> Vec<Grant> {
        let mut added = Vec::with_capacity(batch.len());
        for grant in batch {
            if self.keys.insert(grant.dedup_key()) {
                self.grants.push(grant.clone());
                added.push(grant);
            }
        }
        added
    }

    /// Stored grants, oldest first.
    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Drop everything. Host-initiated only.
    pub fn clear(&mut self) {
        self.grants.clear();
        self.keys.clear();
    }

    /// Write every stored grant to `path` as a pretty-printed JSON array.
    pub fn export_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| GrantScoutError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.grants)
            .map_err(|e| GrantScoutError::io(path, e.into()))?;
        writer.flush().map_err(|e| GrantScoutError::io(path, e))?;

        info!(?path, grants = self.grants.len(), "exported grant repository");
        Ok(())
    }
}
