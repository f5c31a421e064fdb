//! Retriever strategy factory.
//!
//! Maps a [`StrategyKind`] tag plus the loaded configuration onto a
//! constructed retriever. Strategies that need the vector index
//! trigger its lazy build here; the keyword strategy stays free of
//! embedding work entirely.
//!
//! Construction can be expensive — parent/child chunks and embeds its
//! own child index — so built retrievers are memoized in a
//! [`RetrieverSet`] under the same once-initialized discipline as the
//! shared vector index: at most one build per strategy per process,
//! with concurrent first callers awaiting the same in-flight build.

use std::sync::Arc;

use tokio::sync::OnceCell;

use feedback_harness_core::models::FeedbackRecord;
use feedback_harness_core::provider::{ChatModel, Reranker};
use feedback_harness_core::retriever::{
    EnsembleRetriever, KeywordRetriever, MultiQueryRetriever, ParentChildRetriever,
    RerankRetriever, Retriever, SimilarityRetriever, StrategyKind,
};
use feedback_harness_core::{HarnessError, Result};

use crate::config::Config;
use crate::index::SharedIndex;

/// One lazily-built retriever slot per strategy.
///
/// A failed build (for example rerank without its credential) leaves
/// the slot empty, so a later call after fixing the environment can
/// still succeed.
#[derive(Default)]
pub struct RetrieverSet {
    cells: [OnceCell<Arc<dyn Retriever>>; 6],
}

impl RetrieverSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(kind: StrategyKind) -> usize {
        StrategyKind::all()
            .iter()
            .position(|k| *k == kind)
            .expect("every strategy has a slot")
    }

    /// Get the retriever for `kind`, building it on first use.
    pub async fn get_or_build(
        &self,
        kind: StrategyKind,
        config: &Config,
        shared: &SharedIndex,
        records: &[FeedbackRecord],
        chat: Arc<dyn ChatModel>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Arc<dyn Retriever>> {
        self.cells[Self::slot(kind)]
            .get_or_try_init(|| build_retriever(kind, config, shared, records, chat, reranker))
            .await
            .map(Arc::clone)
    }
}

pub async fn build_retriever(
    kind: StrategyKind,
    config: &Config,
    shared: &SharedIndex,
    records: &[FeedbackRecord],
    chat: Arc<dyn ChatModel>,
    reranker: Arc<dyn Reranker>,
) -> Result<Arc<dyn Retriever>> {
    let k = config.retrieval.k;

    match kind {
        StrategyKind::Similarity => {
            let index = shared.vector_index().await?;
            Ok(Arc::new(SimilarityRetriever::new(index, shared.embedder(), k)))
        }
        StrategyKind::Keyword => Ok(Arc::new(KeywordRetriever::new(shared.chunks(), k))),
        StrategyKind::MultiQuery => {
            let index = shared.vector_index().await?;
            Ok(Arc::new(MultiQueryRetriever::new(
                index,
                shared.embedder(),
                chat,
                config.retrieval.multi_query_count,
                k,
            )))
        }
        StrategyKind::ParentChild => {
            let retriever = ParentChildRetriever::build(
                records,
                config.chunking.parent_window,
                config.chunking.child_window,
                k,
                shared.embedder(),
            )
            .await?;
            Ok(Arc::new(retriever))
        }
        StrategyKind::Rerank => {
            let index = shared.vector_index().await?;
            Ok(Arc::new(RerankRetriever::new(
                index,
                shared.embedder(),
                reranker,
                k,
                config.retrieval.rerank_multiplier,
            )?))
        }
        StrategyKind::Ensemble => {
            let weights = &config.retrieval.ensemble_weights;
            if weights.len() != 2 {
                return Err(HarnessError::InvalidConfig(format!(
                    "ensemble has two arms (similarity, keyword) but {} weights were given",
                    weights.len()
                )));
            }
            let index = shared.vector_index().await?;
            let arms: Vec<(Box<dyn Retriever>, f64)> = vec![
                (
                    Box::new(SimilarityRetriever::new(index, shared.embedder(), k)),
                    weights[0],
                ),
                (Box::new(KeywordRetriever::new(shared.chunks(), k)), weights[1]),
            ];
            Ok(Arc::new(EnsembleRetriever::new(arms, k)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, CorpusConfig};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use feedback_harness_core::models::{ChatMessage, FeedbackSource, Sentiment};
    use feedback_harness_core::provider::{Completion, Embedder, ToolSpec};

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    struct StubChat;

    #[async_trait]
    impl ChatModel for StubChat {
        async fn complete(&self, _messages: &[ChatMessage], _tools: &[ToolSpec]) -> Result<Completion> {
            Ok(Completion {
                message: ChatMessage::assistant("variant one\nvariant two"),
                usage: None,
            })
        }
    }

    struct StubReranker {
        available: bool,
    }

    #[async_trait]
    impl Reranker for StubReranker {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn rerank(&self, _query: &str, candidates: &[String]) -> Result<Vec<usize>> {
            Ok((0..candidates.len()).collect())
        }
    }

    fn config() -> Config {
        Config {
            corpus: CorpusConfig {
                path: "feedback.csv".into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: Default::default(),
            agent: Default::default(),
            providers: Default::default(),
            eval: Default::default(),
        }
    }

    fn records() -> Vec<FeedbackRecord> {
        vec![FeedbackRecord {
            id: "FB-001".to_string(),
            source: FeedbackSource::AppStoreReview,
            date: NaiveDate::from_ymd_opt(2024, 2, 2).unwrap(),
            user_id: "u1".to_string(),
            text: "Please add dark mode, the white screen hurts at night".to_string(),
            sentiment: Sentiment::Negative,
        }]
    }

    #[tokio::test]
    async fn test_every_strategy_constructs_with_credentials() {
        let config = config();
        let records = records();
        let shared =
            SharedIndex::new(&records, &config.chunking, Arc::new(StubEmbedder)).unwrap();

        for kind in StrategyKind::all() {
            let retriever = build_retriever(
                kind,
                &config,
                &shared,
                &records,
                Arc::new(StubChat),
                Arc::new(StubReranker { available: true }),
            )
            .await
            .unwrap();
            assert_eq!(retriever.name(), kind.as_str());
        }
    }

    #[tokio::test]
    async fn test_rerank_without_credential_is_config_time_error() {
        let config = config();
        let records = records();
        let shared =
            SharedIndex::new(&records, &config.chunking, Arc::new(StubEmbedder)).unwrap();

        let err = build_retriever(
            StrategyKind::Rerank,
            &config,
            &shared,
            &records,
            Arc::new(StubChat),
            Arc::new(StubReranker { available: false }),
        )
        .await
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, HarnessError::MissingCredential(_)));
    }
}
