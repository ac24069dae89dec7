//! The incremental sync pass.
//!
//! One pass takes the project from its current indexed state to a state
//! consistent with the working tree:
//!
//! 1. take the index lock, scan the tree, diff against the manifest;
//! 2. delete stored chunks for every path this pass touches — removed,
//!    modified, and added alike (keyed by path, so a retried pass
//!    converges even when an aborted run upserted chunks it never
//!    committed);
//! 3. chunk and embed added and modified files, upserting as it goes;
//! 4. commit the new manifest atomically.
//!
//! The manifest is only written at the end. An embedding or store failure
//! aborts before commit, leaving the previous manifest authoritative; the
//! next pass re-detects the same work from the unchanged hashes.
//!
//! A config change that affects chunk content (chunking or embedding
//! settings) is detected by hash and forces a full re-index, since an
//! incremental pass would silently mix chunk generations.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use crate::chunk::{chunk_id, chunk_lines};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::ScanWarning;
use crate::manifest::{load_manifest, save_manifest, FileRecord, IndexLock, Manifest};
use crate::progress::{IndexProgressEvent, ProgressReporter};
use crate::scanner::scan_project;
use crate::vector_store::{ChunkMeta, VectorRecord, VectorStore};

/// Outcome of one sync pass.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub scanned: usize,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub chunks_embedded: usize,
    pub chunks_deleted: usize,
    pub warnings: Vec<ScanWarning>,
    /// True when the pass found nothing to do and wrote nothing.
    pub up_to_date: bool,
}

/// Run one sync pass over `project_root`.
///
/// Holds the index lock for the duration. With `force`, every tracked file
/// is re-embedded regardless of hash equality.
pub async fn sync_index(
    project_root: &Path,
    config: &Config,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    force: bool,
    progress: &dyn ProgressReporter,
) -> Result<SyncStats> {
    let state_dir = Config::state_dir(project_root);
    let _lock = IndexLock::acquire(&state_dir)?;

    progress.report(IndexProgressEvent::Scanning);
    let scan = scan_project(project_root, config)?;

    let manifest = load_manifest(&state_dir)?;
    let config_hash = config.content_hash();

    // A chunking/embedding config change invalidates every stored chunk.
    let config_changed =
        !manifest.files.is_empty() && manifest.config_hash.as_deref() != Some(&config_hash);

    let diff = manifest.diff(&scan.files, force || config_changed);

    let mut stats = SyncStats {
        scanned: scan.files.len(),
        added: diff.added.len(),
        modified: diff.modified.len(),
        removed: diff.removed.len(),
        warnings: scan.warnings.clone(),
        ..Default::default()
    };

    if diff.is_empty() {
        stats.up_to_date = true;
        return Ok(stats);
    }

    // Stale chunks go first so a pass that dies mid-embed can simply be
    // re-run: deletion by path is idempotent, and purging added paths too
    // reclaims chunks an aborted run upserted but never committed.
    let delete_paths: Vec<&str> = diff.to_delete().collect();
    if !delete_paths.is_empty() {
        progress.report(IndexProgressEvent::Cleaning {
            paths: delete_paths.len() as u64,
        });
        for path in &delete_paths {
            stats.chunks_deleted += manifest
                .files
                .get(*path)
                .map(|r| r.chunk_ids.len())
                .unwrap_or(0);
            store.delete_for_path(path).await?;
        }
    }

    // Carry forward records for files untouched by this pass.
    let mut next = Manifest {
        version: manifest.version,
        config_hash: Some(config_hash),
        indexed_at: Some(Utc::now().timestamp()),
        files: manifest.files.clone(),
    };
    for path in &diff.removed {
        next.files.remove(path);
    }

    let to_embed: Vec<_> = diff.to_embed().cloned().collect();
    let total = to_embed.len() as u64;

    for (i, file) in to_embed.iter().enumerate() {
        progress.report(IndexProgressEvent::Embedding {
            path: file.path.clone(),
            n: (i + 1) as u64,
            total,
        });

        let abs = project_root.join(&file.path);
        let content = match std::fs::read_to_string(&abs) {
            Ok(c) => c,
            Err(e) => {
                // Vanished or unreadable since the scan: drop it from the
                // manifest and move on.
                stats.warnings.push(ScanWarning {
                    path: abs,
                    reason: e.to_string(),
                });
                next.files.remove(&file.path);
                continue;
            }
        };

        let spans = chunk_lines(
            &content,
            config.chunking.max_chars,
            config.chunking.overlap_chars,
        );
        let ids: Vec<String> = spans.iter().map(|s| chunk_id(&file.path, s)).collect();

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(config.embedding.batch_size.max(1)) {
            let embedded = embedder
                .embed_batch(batch)
                .await
                .with_context(|| format!("embedding {}", file.path))?;
            vectors.extend(embedded);
        }

        for ((span, id), vector) in spans.iter().zip(ids.iter()).zip(vectors) {
            let meta = ChunkMeta {
                path: file.path.clone(),
                start_line: span.start_line,
                end_line: span.end_line,
                text: span.text.clone(),
            };
            store
                .upsert(VectorRecord {
                    id: id.clone(),
                    path: file.path.clone(),
                    vector,
                    metadata: serde_json::to_value(&meta)?,
                })
                .await?;
            stats.chunks_embedded += 1;
        }

        next.files.insert(
            file.path.clone(),
            FileRecord {
                content_hash: file.content_hash.clone(),
                size_bytes: file.size_bytes,
                modified_at: file.modified_at,
                chunk_ids: ids,
            },
        );
    }

    save_manifest(&state_dir, &next)?;
    Ok(stats)
}
