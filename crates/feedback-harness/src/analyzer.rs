//! High-level analysis facade.
//!
//! [`FeedbackAnalyzer`] owns the loaded corpus, the shared index, and
//! the provider handles. `analyze` runs the full agent loop for one
//! question and is total: every failure path collapses into a
//! human-readable string so callers never branch on errors.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use feedback_harness_core::agent::{AgentConfig, FeedbackAgent};
use feedback_harness_core::eval::{self, GoldenQuestion};
use feedback_harness_core::models::{EvaluationRecord, FeedbackRecord};
use feedback_harness_core::provider::{ChatModel, Reranker, WebSearch};
use feedback_harness_core::retriever::{Retriever, StrategyKind};

use crate::config::Config;
use crate::corpus;
use crate::index::SharedIndex;
use crate::providers::cohere::CohereReranker;
use crate::providers::openai::{OpenAiChat, OpenAiEmbedder};
use crate::providers::tavily::TavilySearch;
use crate::strategies::RetrieverSet;

pub struct FeedbackAnalyzer {
    config: Config,
    records: Vec<FeedbackRecord>,
    shared: SharedIndex,
    retrievers: RetrieverSet,
    chat: Arc<dyn ChatModel>,
    reranker: Arc<dyn Reranker>,
    web: Arc<dyn WebSearch>,
}

impl FeedbackAnalyzer {
    /// Wire up real providers from the environment and load the corpus.
    pub fn from_config(config: Config) -> Result<Self> {
        let providers = &config.providers;
        let chat = OpenAiChat::new(
            &config.agent.model,
            config.agent.temperature,
            providers.timeout_secs,
            providers.max_retries,
        )?;
        let embedder = OpenAiEmbedder::new(
            &providers.embedding_model,
            providers.timeout_secs,
            providers.max_retries,
        )?;
        let reranker = CohereReranker::from_env(
            &providers.rerank_model,
            providers.timeout_secs,
            providers.max_retries,
        )?;
        let web = TavilySearch::from_env(providers.timeout_secs, providers.max_retries)?;

        Self::with_providers(
            config,
            Arc::new(chat),
            Arc::new(embedder),
            Arc::new(reranker),
            Arc::new(web),
        )
    }

    /// Constructor with injectable providers, used directly by tests.
    pub fn with_providers(
        config: Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn feedback_harness_core::provider::Embedder>,
        reranker: Arc<dyn Reranker>,
        web: Arc<dyn WebSearch>,
    ) -> Result<Self> {
        let records = corpus::load_corpus(&config.corpus.path)?;
        let shared = SharedIndex::new(&records, &config.chunking, embedder)?;
        Ok(Self {
            config,
            records,
            shared,
            retrievers: RetrieverSet::new(),
            chat,
            reranker,
            web,
        })
    }

    pub fn records(&self) -> &[FeedbackRecord] {
        &self.records
    }

    /// Resolve a strategy to its retriever, built at most once per
    /// analyzer and reused across requests.
    async fn retriever(&self, strategy: Option<StrategyKind>) -> feedback_harness_core::Result<Arc<dyn Retriever>> {
        let kind = match strategy {
            Some(kind) => kind,
            None => self.config.retrieval.strategy.parse()?,
        };
        self.retrievers
            .get_or_build(
                kind,
                &self.config,
                &self.shared,
                &self.records,
                self.chat.clone(),
                self.reranker.clone(),
            )
            .await
    }

    /// Answer a question through the agent loop.
    ///
    /// Total by contract: infrastructure failures come back as an
    /// apologetic string, not an error.
    pub async fn analyze(&self, query: &str, strategy: Option<StrategyKind>) -> String {
        match self.try_analyze(query, strategy).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("analysis failed: {e}");
                format!("An error occurred while analyzing your query: {e}")
            }
        }
    }

    async fn try_analyze(
        &self,
        query: &str,
        strategy: Option<StrategyKind>,
    ) -> feedback_harness_core::Result<String> {
        let retriever = self.retriever(strategy).await?;
        let agent = FeedbackAgent::new(
            self.chat.clone(),
            retriever,
            self.web.clone(),
            AgentConfig {
                max_iterations: self.config.agent.max_iterations,
                max_web_results: self.config.agent.max_web_results,
            },
        );
        let outcome = agent.run(query).await?;
        info!(iterations = outcome.iterations, "analysis complete");
        Ok(outcome.answer)
    }

    /// Compare retrieval strategies over the configured golden set.
    ///
    /// Strategies that cannot be constructed (for example rerank
    /// without its API key) are skipped with a warning rather than
    /// failing the comparison.
    pub async fn evaluate(&self, kinds: &[StrategyKind]) -> Result<Vec<EvaluationRecord>> {
        let questions_path = self
            .config
            .eval
            .questions
            .as_ref()
            .context("eval.questions not configured")?;
        let questions = load_questions(questions_path)?;

        let mut strategies: Vec<(String, Arc<dyn Retriever>)> = Vec::new();
        for &kind in kinds {
            match self.retriever(Some(kind)).await {
                Ok(retriever) => strategies.push((kind.to_string(), retriever)),
                Err(e) => warn!(strategy = %kind, "skipping strategy: {e}"),
            }
        }

        let judge = match &self.config.eval.judge_model {
            Some(model) => Some(OpenAiChat::new(
                model,
                0.0,
                self.config.providers.timeout_secs,
                self.config.providers.max_retries,
            )?),
            None => None,
        };

        let records = eval::compare(
            &strategies,
            &questions,
            self.chat.as_ref(),
            judge.as_ref().map(|j| j as &dyn ChatModel),
        )
        .await?;
        Ok(records)
    }
}

/// On-disk shape of the golden question set: a TOML file with one
/// `[[questions]]` table per entry.
#[derive(serde::Deserialize)]
struct QuestionsFile {
    #[serde(default)]
    questions: Vec<GoldenQuestion>,
}

/// Load the golden question set from TOML.
pub fn load_questions(path: &Path) -> Result<Vec<GoldenQuestion>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read questions file: {}", path.display()))?;
    let file: QuestionsFile =
        toml::from_str(&content).context("Failed to parse questions file")?;
    if file.questions.is_empty() {
        anyhow::bail!("questions file has no [[questions]] entries");
    }
    Ok(file.questions)
}
