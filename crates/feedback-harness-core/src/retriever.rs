//! Retriever strategies.
//!
//! Six interchangeable retrieval algorithms behind one contract:
//! `retrieve(query) -> ranked evidence`. The agent loop and the
//! evaluation harness swap strategies without branching logic.
//!
//! | Strategy | Tag | Approach |
//! |----------|-----|----------|
//! | [`SimilarityRetriever`] | `similarity` | k-NN against the vector index |
//! | [`KeywordRetriever`] | `keyword` | BM25 over raw chunks, no embeddings |
//! | [`MultiQueryRetriever`] | `multi_query` | LLM paraphrase expansion, merged by best rank |
//! | [`ParentChildRetriever`] | `parent_child` | match small child windows, return parent passages |
//! | [`RerankRetriever`] | `rerank` | 2×k similarity candidates reordered by a cross-encoder |
//! | [`EnsembleRetriever`] | `ensemble` | weighted reciprocal rank fusion of other strategies |

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::bm25::Bm25Index;
use crate::chunk::Chunker;
use crate::error::{HarnessError, Result};
use crate::index::VectorIndex;
use crate::models::{Chunk, ChunkMeta, EvidenceItem, FeedbackRecord};
use crate::provider::{ChatModel, Embedder, Reranker};

/// Smoothing constant for reciprocal rank fusion. Higher values reduce
/// the influence of any single list's top ranks.
const RRF_K: f64 = 60.0;

/// The shared retrieval contract.
///
/// Implementations must be cheap to call concurrently: all state is
/// read-only after construction.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Strategy tag, e.g. `"similarity"`.
    fn name(&self) -> &str;

    /// Return at most the configured `k` evidence items for `query`,
    /// in non-increasing relevance order (position 0 = most relevant).
    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>>;
}

/// Tag identifying a retriever strategy, used by the factory and the
/// evaluation harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Similarity,
    Keyword,
    MultiQuery,
    ParentChild,
    Rerank,
    Ensemble,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Similarity => "similarity",
            StrategyKind::Keyword => "keyword",
            StrategyKind::MultiQuery => "multi_query",
            StrategyKind::ParentChild => "parent_child",
            StrategyKind::Rerank => "rerank",
            StrategyKind::Ensemble => "ensemble",
        }
    }

    /// Every known strategy, in factory order.
    pub fn all() -> [StrategyKind; 6] {
        [
            StrategyKind::Similarity,
            StrategyKind::Keyword,
            StrategyKind::MultiQuery,
            StrategyKind::ParentChild,
            StrategyKind::Rerank,
            StrategyKind::Ensemble,
        ]
    }
}

impl FromStr for StrategyKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "similarity" => Ok(StrategyKind::Similarity),
            "keyword" => Ok(StrategyKind::Keyword),
            "multi_query" => Ok(StrategyKind::MultiQuery),
            "parent_child" => Ok(StrategyKind::ParentChild),
            "rerank" => Ok(StrategyKind::Rerank),
            "ensemble" => Ok(StrategyKind::Ensemble),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown retriever strategy: {other:?} \
                 (expected similarity, keyword, multi_query, parent_child, rerank, or ensemble)"
            ))),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Similarity ============

/// Direct nearest-neighbor lookup against the vector index.
pub struct SimilarityRetriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    k: usize,
}

impl SimilarityRetriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, k: usize) -> Self {
        Self { index, embedder, k }
    }
}

#[async_trait]
impl Retriever for SimilarityRetriever {
    fn name(&self) -> &str {
        "similarity"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>> {
        self.index.query(self.embedder.as_ref(), query, self.k).await
    }
}

// ============ Keyword (BM25) ============

/// Term-frequency scoring over the raw chunk corpus. No embedding
/// dependency, independently configurable `k`.
pub struct KeywordRetriever {
    index: Bm25Index,
    k: usize,
}

impl KeywordRetriever {
    pub fn new(chunks: &[Chunk], k: usize) -> Self {
        Self {
            index: Bm25Index::build(chunks),
            k,
        }
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>> {
        Ok(self.index.search(query, self.k))
    }
}

// ============ Multi-Query ============

const MULTI_QUERY_PROMPT: &str = "You are an assistant that rewrites search queries. \
Generate {n} different phrasings of the user question below, one per line, \
with no numbering and no extra commentary. The phrasings should retrieve \
the same information from a database of user feedback.\n\nQuestion: {question}";

/// LLM-driven query expansion: the original query plus several
/// paraphrases are each retrieved independently, then merged keeping
/// the best rank per chunk.
pub struct MultiQueryRetriever {
    base: SimilarityRetriever,
    chat: Arc<dyn ChatModel>,
    num_paraphrases: usize,
    k: usize,
}

impl MultiQueryRetriever {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        num_paraphrases: usize,
        k: usize,
    ) -> Self {
        Self {
            base: SimilarityRetriever::new(index, embedder, k),
            chat,
            num_paraphrases,
            k,
        }
    }

    /// Ask the chat model for paraphrases. A provider failure here is
    /// non-fatal: retrieval degrades to the original query alone.
    async fn expand(&self, query: &str) -> Vec<String> {
        let prompt = MULTI_QUERY_PROMPT
            .replace("{n}", &self.num_paraphrases.to_string())
            .replace("{question}", query);
        let messages = [crate::models::ChatMessage::user(prompt)];

        match self.chat.complete(&messages, &[]).await {
            Ok(completion) => completion
                .message
                .content
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .take(self.num_paraphrases)
                .collect(),
            Err(e) => {
                warn!(error = %e, "query expansion failed, using original query only");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Retriever for MultiQueryRetriever {
    fn name(&self) -> &str {
        "multi_query"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>> {
        let mut queries = vec![query.to_string()];
        queries.extend(self.expand(query).await);
        debug!(variants = queries.len(), "multi-query expansion");

        let lists = join_all(queries.iter().map(|q| self.base.retrieve(q))).await;

        // Dedup by chunk identity, keeping the best rank a chunk
        // achieved under any query variant.
        let mut best: HashMap<usize, EvidenceItem> = HashMap::new();
        for list in lists {
            for item in list? {
                best.entry(item.chunk_ordinal)
                    .and_modify(|existing| {
                        if item.rank < existing.rank {
                            *existing = item.clone();
                        }
                    })
                    .or_insert(item);
            }
        }

        let mut merged: Vec<EvidenceItem> = best.into_values().collect();
        merged.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.chunk_ordinal.cmp(&b.chunk_ordinal)));
        merged.truncate(self.k);
        for (rank, item) in merged.iter_mut().enumerate() {
            item.rank = rank;
        }
        Ok(merged)
    }
}

// ============ Parent/Child ============

/// Hierarchical retrieval: small child windows are indexed for precise
/// matching, but the larger parent passage containing the matched child
/// is returned, trading precision for answer context completeness.
///
/// The child→parent table is built once at indexing time. Parent and
/// child chunks live in separate ordinal spaces; returned evidence
/// carries parent ordinals.
pub struct ParentChildRetriever {
    child_index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    parents: Vec<Chunk>,
    child_to_parent: HashMap<usize, usize>,
    k: usize,
}

impl ParentChildRetriever {
    /// Split records into parent passages, re-split each parent into
    /// child windows, and index the children.
    pub async fn build(
        records: &[FeedbackRecord],
        parent_window: usize,
        child_window: usize,
        k: usize,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let parent_chunker = Chunker::new(parent_window, 0)?;
        let child_chunker = Chunker::new(child_window, 0)?;

        let parents = parent_chunker.chunk_records(records);

        let mut children = Vec::new();
        let mut child_to_parent = HashMap::new();
        let mut child_ordinal = 0usize;
        for parent in &parents {
            let before = children.len();
            child_chunker.chunk_text(
                &parent.record_id,
                &parent.meta,
                &parent.text,
                &mut child_ordinal,
                &mut children,
            );
            for child in &children[before..] {
                child_to_parent.insert(child.ordinal, parent.ordinal);
            }
        }

        let child_index = VectorIndex::build(&children, embedder.as_ref()).await?;
        debug!(
            parents = parents.len(),
            children = children.len(),
            "parent/child index built"
        );

        Ok(Self {
            child_index: Arc::new(child_index),
            embedder,
            parents,
            child_to_parent,
            k,
        })
    }
}

#[async_trait]
impl Retriever for ParentChildRetriever {
    fn name(&self) -> &str {
        "parent_child"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>> {
        // Over-fetch children so parent dedup can still fill k slots.
        let child_hits = self
            .child_index
            .query(self.embedder.as_ref(), query, self.k * 4)
            .await?;

        let mut out: Vec<EvidenceItem> = Vec::new();
        let mut seen_parents = std::collections::HashSet::new();
        for hit in child_hits {
            let Some(&parent_ordinal) = self.child_to_parent.get(&hit.chunk_ordinal) else {
                continue;
            };
            if !seen_parents.insert(parent_ordinal) {
                continue;
            }
            let parent = &self.parents[parent_ordinal];
            out.push(EvidenceItem {
                rank: out.len(),
                score: hit.score,
                text: parent.text.clone(),
                chunk_ordinal: parent.ordinal,
                record_id: parent.record_id.clone(),
            });
            if out.len() == self.k {
                break;
            }
        }
        Ok(out)
    }
}

// ============ Rerank ============

/// Two-stage retrieval: a wider similarity candidate set reordered by
/// an external cross-encoder, keeping the top `k`.
pub struct RerankRetriever {
    base: SimilarityRetriever,
    reranker: Arc<dyn Reranker>,
    k: usize,
}

impl RerankRetriever {
    /// Construct the retriever, over-fetching `candidate_multiplier × k`
    /// candidates from the similarity stage.
    ///
    /// The rerank credential is verified here, before any retrieval
    /// call — absence is a configuration fault, not a runtime surprise.
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        k: usize,
        candidate_multiplier: usize,
    ) -> Result<Self> {
        if !reranker.is_available() {
            return Err(HarnessError::MissingCredential(
                "rerank provider requires an API key".to_string(),
            ));
        }
        Ok(Self {
            base: SimilarityRetriever::new(index, embedder, k * candidate_multiplier.max(1)),
            reranker,
            k,
        })
    }
}

#[async_trait]
impl Retriever for RerankRetriever {
    fn name(&self) -> &str {
        "rerank"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>> {
        let candidates = self.base.retrieve(query).await?;
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let order = self.reranker.rerank(query, &texts).await?;

        let mut out = Vec::with_capacity(self.k);
        for &idx in order.iter().take(self.k) {
            let Some(candidate) = candidates.get(idx) else {
                return Err(HarnessError::MalformedResponse(format!(
                    "rerank returned out-of-range index {idx} for {} candidates",
                    candidates.len()
                )));
            };
            out.push(EvidenceItem {
                rank: out.len(),
                ..candidate.clone()
            });
        }
        Ok(out)
    }
}

// ============ Ensemble ============

/// Weighted reciprocal rank fusion over two or more strategies.
///
/// Each arm contributes `weight / (60 + rank + 1)` per item; weights
/// must sum to 1.0. Ties break by (arm index, source rank), so two
/// equal-weight arms with disjoint results interleave deterministically
/// while preserving each arm's internal order.
pub struct EnsembleRetriever {
    arms: Vec<(Box<dyn Retriever>, f64)>,
    k: usize,
}

impl EnsembleRetriever {
    pub fn new(arms: Vec<(Box<dyn Retriever>, f64)>, k: usize) -> Result<Self> {
        if arms.len() < 2 {
            return Err(HarnessError::InvalidConfig(
                "ensemble requires at least two strategies".to_string(),
            ));
        }
        let total: f64 = arms.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(HarnessError::InvalidConfig(format!(
                "ensemble weights must sum to 1.0, got {total}"
            )));
        }
        Ok(Self { arms, k })
    }
}

#[async_trait]
impl Retriever for EnsembleRetriever {
    fn name(&self) -> &str {
        "ensemble"
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<EvidenceItem>> {
        let lists = join_all(self.arms.iter().map(|(arm, _)| arm.retrieve(query))).await;

        let mut ranked_lists = Vec::with_capacity(lists.len());
        for list in lists {
            ranked_lists.push(list?);
        }
        let weights: Vec<f64> = self.arms.iter().map(|(_, w)| *w).collect();
        Ok(fuse_ranked(&ranked_lists, &weights, self.k))
    }
}

/// Weighted reciprocal rank fusion of multiple ranked lists.
///
/// Items appearing in several lists accumulate score; dedup is by chunk
/// ordinal. The fused ordering sorts by score descending, then by the
/// (list index, rank) of an item's first appearance.
pub fn fuse_ranked(lists: &[Vec<EvidenceItem>], weights: &[f64], k: usize) -> Vec<EvidenceItem> {
    struct Fused {
        item: EvidenceItem,
        score: f64,
        first_seen: (usize, usize),
    }

    let mut by_chunk: HashMap<usize, Fused> = HashMap::new();
    for (list_idx, (list, weight)) in lists.iter().zip(weights).enumerate() {
        for item in list {
            let contribution = weight / (RRF_K + item.rank as f64 + 1.0);
            by_chunk
                .entry(item.chunk_ordinal)
                .and_modify(|fused| fused.score += contribution)
                .or_insert(Fused {
                    item: item.clone(),
                    score: contribution,
                    first_seen: (list_idx, item.rank),
                });
        }
    }

    let mut fused: Vec<Fused> = by_chunk.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.first_seen.cmp(&b.first_seen))
    });
    fused.truncate(k);

    fused
        .into_iter()
        .enumerate()
        .map(|(rank, fused)| EvidenceItem {
            rank,
            score: fused.score,
            ..fused.item
        })
        .collect()
}
