//! Evidence-gathering tools available during analysis.
//!
//! The tool set is a closed enum, not a plugin registry: each variant has a
//! fixed implementation and a uniform result shape, so the orchestrator can
//! treat evidence from code, logs, and configuration interchangeably.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{Config, ToolsConfig};
use crate::embedding::{embed_query, Embedder};
use crate::vector_store::{ChunkMeta, VectorStore};

/// The tools an analysis turn may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTool {
    CodeSearch,
    LogSearch,
    ConfigCheck,
}

impl AnalysisTool {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisTool::CodeSearch => "code_search",
            AnalysisTool::LogSearch => "log_search",
            AnalysisTool::ConfigCheck => "config_check",
        }
    }

    pub fn enabled(&self, tools: &ToolsConfig) -> bool {
        match self {
            AnalysisTool::CodeSearch => tools.code_search,
            AnalysisTool::LogSearch => tools.log_search,
            AnalysisTool::ConfigCheck => tools.config_check,
        }
    }

    /// Every enabled tool, in fixed invocation order.
    pub fn all_enabled(tools: &ToolsConfig) -> Vec<AnalysisTool> {
        [
            AnalysisTool::CodeSearch,
            AnalysisTool::LogSearch,
            AnalysisTool::ConfigCheck,
        ]
        .into_iter()
        .filter(|t| t.enabled(tools))
        .collect()
    }
}

/// One piece of evidence with a human-checkable source citation.
#[derive(Debug, Clone)]
pub struct Evidence {
    /// Citation: `path:start-end` for code, `path:line` for logs and config.
    pub source: String,
    pub snippet: String,
    /// Retrieval similarity for code hits; keyword hits report 0.
    pub score: f32,
}

/// Uniform result of executing one tool.
#[derive(Debug, Clone)]
pub struct EvidenceResult {
    pub tool: AnalysisTool,
    pub evidence: Vec<Evidence>,
}

/// A retrieved code chunk with its citation fields intact.
#[derive(Debug, Clone)]
pub struct CodeHit {
    pub chunk_id: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub text: String,
    pub score: f32,
}

impl CodeHit {
    pub fn citation(&self) -> String {
        format!("{}:{}-{}", self.path, self.start_line, self.end_line)
    }
}

/// Top-K similarity search over the code collection.
pub async fn search_code(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
) -> Result<Vec<CodeHit>> {
    let vector = embed_query(embedder, query).await?;
    let hits = store.query(&vector, top_k).await?;

    Ok(hits
        .into_iter()
        .filter_map(|hit| {
            let meta: ChunkMeta = serde_json::from_value(hit.metadata).ok()?;
            Some(CodeHit {
                chunk_id: hit.id,
                path: meta.path,
                start_line: meta.start_line,
                end_line: meta.end_line,
                text: meta.text,
                score: hit.score,
            })
        })
        .collect())
}

/// Everything a tool invocation may consult.
pub struct ToolContext<'a> {
    pub project_root: &'a Path,
    pub config: &'a Config,
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
}

/// Execute one tool against a query.
pub async fn execute(
    tool: AnalysisTool,
    query: &str,
    ctx: &ToolContext<'_>,
) -> Result<EvidenceResult> {
    let evidence = match tool {
        AnalysisTool::CodeSearch => {
            search_code(ctx.store, ctx.embedder, query, ctx.config.retrieval.top_k)
                .await?
                .into_iter()
                .map(|hit| Evidence {
                    source: hit.citation(),
                    snippet: hit.text,
                    score: hit.score,
                })
                .collect()
        }
        AnalysisTool::LogSearch => {
            grep_files(&log_files(ctx.project_root, ctx.config), query, MAX_GREP_HITS)
        }
        AnalysisTool::ConfigCheck => {
            grep_files(&config_files(ctx.project_root), query, MAX_GREP_HITS)
        }
    };

    Ok(EvidenceResult { tool, evidence })
}

const MAX_GREP_HITS: usize = 20;

/// Configured log files and the files inside configured log directories.
fn log_files(project_root: &Path, config: &Config) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in &config.scan.logs {
        let path = if entry.is_absolute() {
            entry.clone()
        } else {
            project_root.join(entry)
        };
        if path.is_dir() {
            if let Ok(read) = std::fs::read_dir(&path) {
                let mut children: Vec<PathBuf> = read
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect();
                children.sort();
                files.extend(children);
            }
        } else if path.is_file() {
            files.push(path);
        }
    }
    files
}

const CONFIG_FILE_NAMES: &[&str] = &[
    "bugscout.toml",
    "Cargo.toml",
    "pyproject.toml",
    "package.json",
    "settings.toml",
    "config.toml",
    "config.yaml",
    "docker-compose.yml",
];

fn config_files(project_root: &Path) -> Vec<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| project_root.join(name))
        .filter(|p| p.is_file())
        .collect()
}

/// Case-insensitive keyword match over whole lines, cited as `path:line`.
fn grep_files(files: &[PathBuf], query: &str, max_hits: usize) -> Vec<Evidence> {
    let keywords: Vec<String> = query
        .split_whitespace()
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_ascii_lowercase())
        .collect();
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut evidence = Vec::new();
    for path in files {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => continue,
        };
        for (line_no, line) in content.lines().enumerate() {
            let lowered = line.to_ascii_lowercase();
            if keywords.iter().any(|k| lowered.contains(k.as_str())) {
                evidence.push(Evidence {
                    source: format!("{}:{}", path.display(), line_no + 1),
                    snippet: line.trim_end().to_string(),
                    score: 0.0,
                });
                if evidence.len() >= max_hits {
                    return evidence;
                }
            }
        }
    }
    evidence
}
