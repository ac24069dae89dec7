//! Index status inspection.
//!
//! Compares the committed manifest against a fresh scan without touching
//! the vector index, so `status` is cheap and side-effect free.

use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::manifest::load_manifest;
use crate::scanner::scan_project;

/// A snapshot of index freshness.
#[derive(Debug)]
pub struct StatusReport {
    pub tracked_files: usize,
    pub total_chunks: usize,
    /// Unix timestamp of the last committed sync, if any.
    pub indexed_at: Option<i64>,
    /// False when chunking/embedding settings changed since the last sync,
    /// which will force a full re-index.
    pub config_current: bool,
    pub pending_added: usize,
    pub pending_modified: usize,
    pub pending_removed: usize,
}

impl StatusReport {
    pub fn is_fresh(&self) -> bool {
        self.config_current
            && self.pending_added == 0
            && self.pending_modified == 0
            && self.pending_removed == 0
    }
}

/// Diff the working tree against the committed manifest.
pub fn project_status(project_root: &Path, config: &Config) -> Result<StatusReport> {
    let state_dir = Config::state_dir(project_root);
    let manifest = load_manifest(&state_dir)?;
    let scan = scan_project(project_root, config)?;

    let config_current = manifest.files.is_empty()
        || manifest.config_hash.as_deref() == Some(config.content_hash().as_str());

    let diff = manifest.diff(&scan.files, false);

    Ok(StatusReport {
        tracked_files: manifest.files.len(),
        total_chunks: manifest.total_chunks(),
        indexed_at: manifest.indexed_at,
        config_current,
        pending_added: diff.added.len(),
        pending_modified: diff.modified.len(),
        pending_removed: diff.removed.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{save_manifest, FileRecord, Manifest};

    #[test]
    fn unindexed_project_reports_everything_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "print('hi')\n").unwrap();

        let report = project_status(dir.path(), &Config::default()).unwrap();
        assert_eq!(report.tracked_files, 0);
        assert_eq!(report.pending_added, 1);
        assert!(!report.is_fresh());
    }

    #[test]
    fn stale_config_hash_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = Config::state_dir(dir.path());

        let mut manifest = Manifest {
            config_hash: Some("old-hash".into()),
            indexed_at: Some(1_700_000_000),
            ..Default::default()
        };
        manifest.files.insert(
            "a.py".into(),
            FileRecord {
                content_hash: "h".into(),
                size_bytes: 1,
                modified_at: 0,
                chunk_ids: vec!["c1".into()],
            },
        );
        save_manifest(&state_dir, &manifest).unwrap();

        let report = project_status(dir.path(), &Config::default()).unwrap();
        assert!(!report.config_current);
        assert!(!report.is_fresh());
        assert_eq!(report.total_chunks, 1);
    }
}
