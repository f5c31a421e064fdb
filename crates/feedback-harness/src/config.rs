//! TOML configuration.
//!
//! Every field has a default, so a minimal config file only needs the
//! corpus path. Validation happens once at load time; the rest of the
//! system can assume the invariants hold (overlap smaller than window,
//! positive k, normalized ensemble weights).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Path to the feedback CSV file.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Parent passage width for the parent/child strategy.
    #[serde(default = "default_parent_window")]
    pub parent_window: usize,
    /// Child match width for the parent/child strategy.
    #[serde(default = "default_child_window")]
    pub child_window: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
            parent_window: default_parent_window(),
            child_window: default_child_window(),
        }
    }
}

fn default_window_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    100
}
fn default_parent_window() -> usize {
    2000
}
fn default_child_window() -> usize {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default strategy tag for `ask` when none is given on the CLI.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_k")]
    pub k: usize,
    /// Candidate over-fetch factor for the rerank strategy.
    #[serde(default = "default_rerank_multiplier")]
    pub rerank_multiplier: usize,
    /// Paraphrase count for the multi-query strategy.
    #[serde(default = "default_multi_query_count")]
    pub multi_query_count: usize,
    /// Fusion weights for the ensemble arms (similarity, keyword).
    #[serde(default = "default_ensemble_weights")]
    pub ensemble_weights: Vec<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            k: default_k(),
            rerank_multiplier: default_rerank_multiplier(),
            multi_query_count: default_multi_query_count(),
            ensemble_weights: default_ensemble_weights(),
        }
    }
}

fn default_strategy() -> String {
    "similarity".to_string()
}
fn default_k() -> usize {
    10
}
fn default_rerank_multiplier() -> usize {
    2
}
fn default_multi_query_count() -> usize {
    3
}
fn default_ensemble_weights() -> Vec<f64> {
    vec![0.5, 0.5]
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_web_results")]
    pub max_web_results: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_iterations: default_max_iterations(),
            max_web_results: default_max_web_results(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f64 {
    0.0
}
fn default_max_iterations() -> usize {
    10
}
fn default_max_web_results() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_rerank_model")]
    pub rerank_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            embedding_model: default_embedding_model(),
            rerank_model: default_rerank_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_rerank_model() -> String {
    "rerank-english-v3.0".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EvalConfig {
    /// Judge model for metric scoring; heuristics are used when unset.
    #[serde(default)]
    pub judge_model: Option<String>,
    /// Path to the golden question set (TOML, `[[questions]]` tables).
    #[serde(default)]
    pub questions: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_size == 0 {
        anyhow::bail!("chunking.window_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.window_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.window_size ({})",
            config.chunking.overlap,
            config.chunking.window_size
        );
    }
    if config.chunking.child_window == 0 || config.chunking.child_window >= config.chunking.parent_window {
        anyhow::bail!(
            "chunking.child_window ({}) must be > 0 and smaller than chunking.parent_window ({})",
            config.chunking.child_window,
            config.chunking.parent_window
        );
    }

    if config.retrieval.k == 0 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.rerank_multiplier == 0 {
        anyhow::bail!("retrieval.rerank_multiplier must be >= 1");
    }
    if config.retrieval.multi_query_count == 0 {
        anyhow::bail!("retrieval.multi_query_count must be >= 1");
    }
    config
        .retrieval
        .strategy
        .parse::<feedback_harness_core::retriever::StrategyKind>()
        .map_err(|e| anyhow::anyhow!("retrieval.strategy: {e}"))?;

    let weights = &config.retrieval.ensemble_weights;
    if weights.len() < 2 {
        anyhow::bail!("retrieval.ensemble_weights needs at least two entries");
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        anyhow::bail!("retrieval.ensemble_weights must sum to 1.0, got {total}");
    }

    if !(0.0..=2.0).contains(&config.agent.temperature) {
        anyhow::bail!("agent.temperature must be in [0.0, 2.0]");
    }
    if config.agent.max_iterations == 0 {
        anyhow::bail!("agent.max_iterations must be >= 1");
    }

    Ok(())
}
