use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = "bugscout.toml";

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".bugscout";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Log files or directories consulted by the log-search tool.
    #[serde(default)]
    pub logs: Vec<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            logs: Vec::new(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.rs".to_string(),
        "**/*.py".to_string(),
        "**/*.js".to_string(),
        "**/*.ts".to_string(),
        "**/*.go".to_string(),
        "**/*.java".to_string(),
        "**/*.md".to_string(),
        "**/*.toml".to_string(),
        "**/*.yaml".to_string(),
    ]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum total size of a composed context, in characters.
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_budget_chars: default_context_budget(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_context_budget() -> usize {
    12_000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    /// Turns kept verbatim in the conversation buffer before eviction.
    #[serde(default = "default_buffer_turns")]
    pub buffer_turns: usize,
    /// Evicted turns recalled per query from semantic memory.
    #[serde(default = "default_recall_top_n")]
    pub recall_top_n: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            buffer_turns: default_buffer_turns(),
            recall_top_n: default_recall_top_n(),
        }
    }
}

fn default_buffer_turns() -> usize {
    10
}
fn default_recall_top_n() -> usize {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: default_embed_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            base_url: default_ollama_url(),
        }
    }
}

fn default_embed_provider() -> String {
    "ollama".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            temperature: default_temperature(),
            base_url: default_ollama_url(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_temperature() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Upper bound on retrieval/reasoning steps per turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_steps() -> usize {
    5
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_true")]
    pub code_search: bool,
    #[serde(default = "default_true")]
    pub log_search: bool,
    #[serde(default = "default_true")]
    pub config_check: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            code_search: true,
            log_search: true,
            config_check: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// State directory for a project root (`.bugscout/`).
    pub fn state_dir(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR)
    }

    /// Stable hash of the effective configuration.
    ///
    /// A changed hash forces a full re-index: chunking or embedding settings
    /// affect every stored chunk, so an incremental pass would silently mix
    /// chunk generations.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub fn load_config(project_root: &Path) -> Result<Config> {
    let path = project_root.join(CONFIG_FILE);

    let config: Config = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    if config.retrieval.top_k == 0 || config.retrieval.top_k > 50 {
        anyhow::bail!("retrieval.top_k must be between 1 and 50");
    }
    if config.retrieval.context_budget_chars == 0 {
        anyhow::bail!("retrieval.context_budget_chars must be > 0");
    }

    if config.memory.buffer_turns == 0 {
        anyhow::bail!("memory.buffer_turns must be >= 1");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be ollama or openai.",
            other
        ),
    }

    match config.llm.provider.as_str() {
        "ollama" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be ollama.", other),
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.analysis.max_steps == 0 || config.analysis.max_steps > 20 {
        anyhow::bail!("analysis.max_steps must be between 1 and 20");
    }

    Ok(())
}

/// Create `bugscout.toml` with defaults. Returns false if it already exists.
pub fn create_default_config(project_root: &Path, llm_model: Option<&str>) -> Result<bool> {
    let path = project_root.join(CONFIG_FILE);
    if path.exists() {
        return Ok(false);
    }

    let mut config = Config::default();
    if let Some(model) = llm_model {
        config.llm.model = model.to_string();
    }

    let content =
        toml::to_string_pretty(&config).with_context(|| "Failed to serialize default config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
