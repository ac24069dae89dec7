//! The manifest: authoritative record of tracked files and chunk ownership.
//!
//! Maps each tracked path to its content hash and the chunk ids currently
//! stored for it in the vector index. The manifest is the reference point
//! for incremental syncs: a fresh scan is diffed against it to decide which
//! files need re-embedding and which stored chunks are stale.
//!
//! Persistence is a single JSON file replaced atomically on commit (write to
//! a temp file, then rename), so a crash mid-sync leaves the previous
//! manifest authoritative. An advisory file lock serializes sync passes
//! against live sessions touching the same index.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::IndexError;
use crate::scanner::ScannedFile;

pub const MANIFEST_FILE: &str = "manifest.json";
const LOCK_FILE: &str = "index.lock";

/// Per-file record: content identity plus the chunks the index holds for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub content_hash: String,
    pub size_bytes: u64,
    pub modified_at: i64,
    #[serde(default)]
    pub chunk_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Hash of the config that produced this index. A mismatch forces a
    /// full re-index.
    #[serde(default)]
    pub config_hash: Option<String>,
    /// Unix timestamp of the last committed sync pass.
    #[serde(default)]
    pub indexed_at: Option<i64>,
    /// path → record, sorted for stable serialization.
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,
}

fn default_version() -> u32 {
    1
}

/// Outcome of diffing a fresh scan against the manifest.
///
/// Unchanged files appear in none of the three sets; that exclusion is the
/// incrementality guarantee.
#[derive(Debug, Default)]
pub struct ManifestDiff {
    pub added: Vec<ScannedFile>,
    pub modified: Vec<ScannedFile>,
    /// Paths present in the manifest but absent from the scan.
    pub removed: Vec<String>,
}

impl ManifestDiff {
    /// Files that need chunking and embedding this pass.
    pub fn to_embed(&self) -> impl Iterator<Item = &ScannedFile> {
        self.added.iter().chain(self.modified.iter())
    }

    /// Paths whose stored chunks must be deleted before embedding begins.
    ///
    /// Covers added paths too, not just removed and modified ones: a pass
    /// that aborted after upserting a new file's chunks never committed a
    /// record for them, so only a path-keyed purge can reclaim those ids.
    /// Deleting a path with no stored chunks is a no-op.
    pub fn to_delete(&self) -> impl Iterator<Item = &str> {
        self.removed
            .iter()
            .map(String::as_str)
            .chain(self.to_embed().map(|f| f.path.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

impl Manifest {
    /// Compare a fresh scan against this manifest.
    ///
    /// Classification is by content hash, never mtime alone: touching a file
    /// without editing it does not mark it modified, and clock skew cannot
    /// hide a real edit. With `force`, every scanned file already present is
    /// treated as modified regardless of hash equality.
    pub fn diff(&self, scan: &[ScannedFile], force: bool) -> ManifestDiff {
        let mut diff = ManifestDiff::default();

        for file in scan {
            match self.files.get(&file.path) {
                None => diff.added.push(file.clone()),
                Some(record) => {
                    if force || record.content_hash != file.content_hash {
                        diff.modified.push(file.clone());
                    }
                }
            }
        }

        let scanned: std::collections::BTreeSet<&str> =
            scan.iter().map(|f| f.path.as_str()).collect();
        for path in self.files.keys() {
            if !scanned.contains(path.as_str()) {
                diff.removed.push(path.clone());
            }
        }

        diff
    }

    /// Every chunk id referenced by any file record.
    pub fn all_chunk_ids(&self) -> Vec<String> {
        self.files
            .values()
            .flat_map(|r| r.chunk_ids.iter().cloned())
            .collect()
    }

    pub fn total_chunks(&self) -> usize {
        self.files.values().map(|r| r.chunk_ids.len()).sum()
    }
}

pub fn manifest_path(state_dir: &Path) -> PathBuf {
    state_dir.join(MANIFEST_FILE)
}

/// Load the manifest, or an empty one if none has been committed yet.
pub fn load_manifest(state_dir: &Path) -> Result<Manifest> {
    let path = manifest_path(state_dir);
    if !path.exists() {
        return Ok(Manifest {
            version: 1,
            ..Default::default()
        });
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest = serde_json::from_str(&content)
        .map_err(|e| IndexError::Manifest(format!("parse {}: {}", path.display(), e)))?;
    Ok(manifest)
}

/// Atomically replace the manifest on disk.
///
/// The new manifest is fully written to a sibling temp file and renamed over
/// the old one, so readers observe either the previous committed state or the
/// new one — never a partial write.
pub fn save_manifest(state_dir: &Path, manifest: &Manifest) -> Result<()> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create {}", state_dir.display()))?;

    let path = manifest_path(state_dir);
    let tmp = path.with_extension("json.tmp");

    let content = serde_json::to_string_pretty(manifest)
        .map_err(|e| IndexError::Manifest(format!("serialize manifest: {}", e)))?;
    std::fs::write(&tmp, content)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("Failed to commit {}", path.display()))?;
    Ok(())
}

/// Advisory lock over the index state.
///
/// Held for the duration of a sync pass or an interactive session so the two
/// never race on the vector index. The OS releases the flock if the process
/// dies, so a crash cannot leave the index permanently locked.
pub struct IndexLock {
    file: std::fs::File,
}

impl IndexLock {
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;
        let path = state_dir.join(LOCK_FILE);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive()
            .map_err(|_| IndexError::Locked(path.display().to_string()))?;
        Ok(Self { file })
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(path: &str, hash: &str) -> ScannedFile {
        ScannedFile {
            path: path.to_string(),
            content_hash: hash.to_string(),
            size_bytes: 10,
            modified_at: 0,
        }
    }

    fn record(hash: &str, chunks: &[&str]) -> FileRecord {
        FileRecord {
            content_hash: hash.to_string(),
            size_bytes: 10,
            modified_at: 0,
            chunk_ids: chunks.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn diff_classifies_added_modified_removed() {
        let mut manifest = Manifest::default();
        manifest.files.insert("a.py".into(), record("h1", &["c1"]));
        manifest.files.insert("b.py".into(), record("h2", &["c2"]));

        let scan = vec![scanned("a.py", "h1-changed"), scanned("c.py", "h3")];
        let diff = manifest.diff(&scan, false);

        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].path, "c.py");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].path, "a.py");
        assert_eq!(diff.removed, vec!["b.py".to_string()]);
    }

    #[test]
    fn unchanged_files_are_excluded_entirely() {
        let mut manifest = Manifest::default();
        manifest.files.insert("a.py".into(), record("h1", &["c1"]));

        let diff = manifest.diff(&[scanned("a.py", "h1")], false);
        assert!(diff.is_empty());
        assert_eq!(diff.to_embed().count(), 0);
        assert_eq!(diff.to_delete().count(), 0);
    }

    #[test]
    fn force_marks_tracked_files_modified() {
        let mut manifest = Manifest::default();
        manifest.files.insert("a.py".into(), record("h1", &["c1"]));

        let diff = manifest.diff(&[scanned("a.py", "h1")], true);
        assert_eq!(diff.modified.len(), 1);
        assert!(diff.added.is_empty());
    }

    #[test]
    fn delete_set_covers_every_changed_path() {
        let mut manifest = Manifest::default();
        manifest.files.insert("a.py".into(), record("h1", &["c1"]));
        manifest.files.insert("b.py".into(), record("h2", &["c2"]));

        // a.py modified, b.py removed, c.py added: all three get purged
        // before embedding so an earlier aborted pass cannot leave orphans.
        let diff = manifest.diff(&[scanned("a.py", "new"), scanned("c.py", "h3")], false);
        let mut delete: Vec<&str> = diff.to_delete().collect();
        delete.sort();
        assert_eq!(delete, vec!["a.py", "b.py", "c.py"]);
    }

    #[test]
    fn save_and_load_round_trip_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest {
            version: 1,
            config_hash: Some("cfg".into()),
            indexed_at: Some(1700000000),
            ..Default::default()
        };
        manifest.files.insert("a.py".into(), record("h1", &["c1", "c2"]));

        save_manifest(dir.path(), &manifest).unwrap();
        // No temp file left behind after a committed save.
        assert!(!dir.path().join("manifest.json.tmp").exists());

        let loaded = load_manifest(dir.path()).unwrap();
        assert_eq!(loaded.config_hash.as_deref(), Some("cfg"));
        assert_eq!(loaded.files["a.py"], manifest.files["a.py"]);
        assert_eq!(loaded.total_chunks(), 2);
    }

    #[test]
    fn missing_manifest_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = load_manifest(dir.path()).unwrap();
        assert!(manifest.files.is_empty());
        assert!(manifest.config_hash.is_none());
    }

    #[test]
    fn lock_is_exclusive_within_process_scope() {
        let dir = tempfile::tempdir().unwrap();
        let lock = IndexLock::acquire(dir.path()).unwrap();
        drop(lock);
        // Re-acquirable after release.
        let _again = IndexLock::acquire(dir.path()).unwrap();
    }
}
