//! Filesystem scanner.
//!
//! Walks the project tree, applies include/exclude globs, and produces a
//! deterministic, sorted list of [`ScannedFile`]s with SHA-256 content
//! hashes. Files that cannot be read or hashed are collected as warnings
//! and skipped; the scan itself never aborts on a single bad file.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::ScanWarning;

/// One tracked file as observed on disk during a scan.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path relative to the project root, with `/` separators.
    pub path: String,
    pub content_hash: String,
    pub size_bytes: u64,
    /// Modification time as a unix timestamp (seconds).
    pub modified_at: i64,
}

/// Result of a full project scan: tracked files plus per-file warnings.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub warnings: Vec<ScanWarning>,
}

pub fn scan_project(project_root: &Path, config: &Config) -> Result<ScanResult> {
    if !project_root.exists() {
        bail!("Project root does not exist: {}", project_root.display());
    }

    let include_set = build_globset(&config.scan.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/.bugscout/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/venv/**".to_string(),
    ];
    default_excludes.extend(config.scan.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut result = ScanResult::default();

    let walker = WalkDir::new(project_root).follow_links(config.scan.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                result.warnings.push(ScanWarning {
                    path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(project_root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        match scan_file(path, &rel_str) {
            Ok(file) => result.files.push(file),
            Err(e) => result.warnings.push(ScanWarning {
                path: PathBuf::from(&rel_str),
                reason: e.to_string(),
            }),
        }
    }

    // Sort for deterministic ordering
    result.files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(result)
}

fn scan_file(path: &Path, relative_path: &str) -> Result<ScannedFile> {
    let metadata = std::fs::metadata(path)?;
    let modified_at = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    Ok(ScannedFile {
        path: relative_path.to_string(),
        content_hash: hash_file(path)?,
        size_bytes: metadata.len(),
        modified_at,
    })
}

/// SHA-256 of a file's contents, streamed in 8 KiB blocks.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
