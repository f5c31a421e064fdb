//! End-to-end tests over the analyzer facade with in-process fakes:
//! a real CSV corpus on disk, deterministic embeddings, and a scripted
//! chat model driving the agent loop.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use feedback_harness::analyzer::FeedbackAnalyzer;
use feedback_harness::config::{Config, CorpusConfig};
use feedback_harness_core::models::ChatMessage;
use feedback_harness_core::provider::{
    ChatModel, Completion, Embedder, Reranker, ToolSpec, WebSearch,
};
use feedback_harness_core::retriever::StrategyKind;
use feedback_harness_core::Result;

const CSV: &str = "\
feedback_id,source,date,user_id,feedback_text,sentiment
FB-001,App Store Review,2024-03-02,u-101,Please add dark mode. The bright theme hurts my eyes at night.,Negative
FB-002,Support Ticket,2024-03-04,u-102,Dark mode would be great for late work sessions.,Neutral
FB-003,Survey,2024-03-09,u-103,Love the analytics dashboard. Very clear charts.,Positive
FB-004,Twitter Mention,2024-03-11,u-104,Billing page keeps timing out when I update my card.,Negative
";

fn corpus_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CSV.as_bytes()).unwrap();
    file
}

fn config(path: std::path::PathBuf) -> Config {
    Config {
        corpus: CorpusConfig { path },
        chunking: Default::default(),
        retrieval: Default::default(),
        agent: Default::default(),
        providers: Default::default(),
        eval: Default::default(),
    }
}

/// Deterministic bag-of-words embedding: each word hashes into one of
/// 64 buckets. Shared vocabulary means shared direction.
struct BucketEmbedder;

#[async_trait]
impl Embedder for BucketEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 64];
                for word in text.to_lowercase().split_whitespace() {
                    let mut h = 0xcbf29ce484222325u64;
                    for b in word.bytes() {
                        h ^= b as u64;
                        h = h.wrapping_mul(0x100000001b3);
                    }
                    v[(h % 64) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Chat fake: with tools offered it first requests `feedback_search`,
/// then finalizes; without tools (the grounded-answer call) it summarizes.
struct ToolOnceChat {
    decisions: AtomicUsize,
}

#[async_trait]
impl ChatModel for ToolOnceChat {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion> {
        if tools.is_empty() {
            // Grounded answer over retrieved context.
            let prompt = &messages.last().unwrap().content;
            assert!(prompt.contains("dark mode"), "context should mention dark mode");
            return Ok(Completion {
                message: ChatMessage::assistant("Multiple users are asking for dark mode."),
                usage: None,
            });
        }
        match self.decisions.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(Completion {
                message: ChatMessage::assistant_with_tools(
                    "",
                    vec![feedback_harness_core::models::ToolCallRequest {
                        id: "call-1".to_string(),
                        name: "feedback_search".to_string(),
                        arguments: r#"{"query": "dark mode"}"#.to_string(),
                    }],
                ),
                usage: None,
            }),
            _ => {
                // The tool result must be in the transcript by now.
                assert!(messages
                    .iter()
                    .any(|m| m.tool_call_id.as_deref() == Some("call-1")));
                Ok(Completion {
                    message: ChatMessage::assistant(
                        "Users frequently request dark mode, citing eye strain at night.",
                    ),
                    usage: None,
                })
            }
        }
    }
}

struct FailingChat;

#[async_trait]
impl ChatModel for FailingChat {
    async fn complete(&self, _messages: &[ChatMessage], _tools: &[ToolSpec]) -> Result<Completion> {
        Err(feedback_harness_core::HarnessError::Provider(
            "upstream unreachable".to_string(),
        ))
    }
}

struct NoReranker;

#[async_trait]
impl Reranker for NoReranker {
    fn is_available(&self) -> bool {
        false
    }

    async fn rerank(&self, _query: &str, _candidates: &[String]) -> Result<Vec<usize>> {
        unreachable!("never called when unavailable")
    }
}

struct NoWeb;

#[async_trait]
impl WebSearch for NoWeb {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<String> {
        Ok("no external results".to_string())
    }
}

fn analyzer(chat: Arc<dyn ChatModel>, path: std::path::PathBuf) -> FeedbackAnalyzer {
    FeedbackAnalyzer::with_providers(
        config(path),
        chat,
        Arc::new(BucketEmbedder),
        Arc::new(NoReranker),
        Arc::new(NoWeb),
    )
    .unwrap()
}

#[tokio::test]
async fn test_end_to_end_dark_mode_question() {
    let file = corpus_file();
    let analyzer = analyzer(
        Arc::new(ToolOnceChat {
            decisions: AtomicUsize::new(0),
        }),
        file.path().to_path_buf(),
    );

    let answer = analyzer
        .analyze("What do users say about dark mode?", None)
        .await;
    assert!(answer.contains("dark mode"), "unexpected answer: {answer}");
    assert!(answer.contains("eye strain"));
}

#[tokio::test]
async fn test_keyword_strategy_needs_no_embeddings() {
    /// Embedder that panics if touched.
    struct PanicEmbedder;

    #[async_trait]
    impl Embedder for PanicEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            panic!("keyword retrieval must not embed");
        }
    }

    let file = corpus_file();
    let analyzer = FeedbackAnalyzer::with_providers(
        config(file.path().to_path_buf()),
        Arc::new(ToolOnceChat {
            decisions: AtomicUsize::new(0),
        }),
        Arc::new(PanicEmbedder),
        Arc::new(NoReranker),
        Arc::new(NoWeb),
    )
    .unwrap();

    let answer = analyzer
        .analyze("What do users say about dark mode?", Some(StrategyKind::Keyword))
        .await;
    assert!(answer.contains("dark mode"));
}

#[tokio::test]
async fn test_analyze_is_total_on_provider_failure() {
    let file = corpus_file();
    let analyzer = analyzer(Arc::new(FailingChat), file.path().to_path_buf());

    let answer = analyzer.analyze("anything", Some(StrategyKind::Keyword)).await;
    assert!(
        answer.starts_with("An error occurred while analyzing your query:"),
        "unexpected answer: {answer}"
    );
}

#[tokio::test]
async fn test_parent_child_index_built_once_across_queries() {
    /// Counts corpus-sized embed batches; single-query embeds pass through.
    struct BatchCountingEmbedder {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for BatchCountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.len() > 1 {
                self.batches.fetch_add(1, Ordering::SeqCst);
            }
            BucketEmbedder.embed(texts).await
        }
    }

    /// Chat fake that answers directly, never requesting tools.
    struct DirectChat;

    #[async_trait]
    impl ChatModel for DirectChat {
        async fn complete(&self, _messages: &[ChatMessage], _tools: &[ToolSpec]) -> Result<Completion> {
            Ok(Completion {
                message: ChatMessage::assistant("Dark mode comes up a lot."),
                usage: None,
            })
        }
    }

    let file = corpus_file();
    let embedder = Arc::new(BatchCountingEmbedder {
        batches: AtomicUsize::new(0),
    });
    let analyzer = FeedbackAnalyzer::with_providers(
        config(file.path().to_path_buf()),
        Arc::new(DirectChat),
        embedder.clone(),
        Arc::new(NoReranker),
        Arc::new(NoWeb),
    )
    .unwrap();

    analyzer
        .analyze("dark mode?", Some(StrategyKind::ParentChild))
        .await;
    analyzer
        .analyze("billing issues?", Some(StrategyKind::ParentChild))
        .await;

    // The child index is embedded once; later queries reuse it.
    assert_eq!(embedder.batches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_similarity_k1_grounds_on_the_single_matching_chunk() {
    const THREE_ROWS: &str = "\
feedback_id,source,date,user_id,feedback_text,sentiment
FB-101,App Store Review,2024-03-02,u-201,Please add dark mode for night shifts.,Negative
FB-102,Support Ticket,2024-03-04,u-202,Billing page keeps timing out.,Negative
FB-103,Survey,2024-03-09,u-203,The analytics dashboard is wonderful.,Positive
";

    /// Chat fake recording the grounded-answer prompt it receives.
    struct GroundRecordingChat {
        decisions: AtomicUsize,
        grounded_prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for GroundRecordingChat {
        async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<Completion> {
            if tools.is_empty() {
                self.grounded_prompts
                    .lock()
                    .unwrap()
                    .push(messages.last().unwrap().content.clone());
                return Ok(Completion {
                    message: ChatMessage::assistant("Users want dark mode."),
                    usage: None,
                });
            }
            match self.decisions.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(Completion {
                    message: ChatMessage::assistant_with_tools(
                        "",
                        vec![feedback_harness_core::models::ToolCallRequest {
                            id: "call-1".to_string(),
                            name: "feedback_search".to_string(),
                            arguments: r#"{"query": "dark mode"}"#.to_string(),
                        }],
                    ),
                    usage: None,
                }),
                _ => Ok(Completion {
                    message: ChatMessage::assistant("Users are asking for dark mode."),
                    usage: None,
                }),
            }
        }
    }

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(THREE_ROWS.as_bytes()).unwrap();

    let mut config = config(file.path().to_path_buf());
    config.retrieval.k = 1;

    let chat = Arc::new(GroundRecordingChat {
        decisions: AtomicUsize::new(0),
        grounded_prompts: std::sync::Mutex::new(Vec::new()),
    });
    let analyzer = FeedbackAnalyzer::with_providers(
        config,
        chat.clone(),
        Arc::new(BucketEmbedder),
        Arc::new(NoReranker),
        Arc::new(NoWeb),
    )
    .unwrap();

    let answer = analyzer
        .analyze("What do users say about dark mode?", Some(StrategyKind::Similarity))
        .await;
    assert_eq!(answer, "Users are asking for dark mode.");

    let prompts = chat.grounded_prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    // The matching chunk appears verbatim, and it is the only evidence:
    // the other two rows' texts must be absent from the context block.
    assert!(prompts[0].contains("Please add dark mode for night shifts."));
    assert!(!prompts[0].contains("Billing page keeps timing out."));
    assert!(!prompts[0].contains("The analytics dashboard is wonderful."));
}

#[tokio::test]
async fn test_rerank_without_key_reports_credential_error() {
    let file = corpus_file();
    let analyzer = analyzer(
        Arc::new(ToolOnceChat {
            decisions: AtomicUsize::new(0),
        }),
        file.path().to_path_buf(),
    );

    let answer = analyzer
        .analyze("dark mode?", Some(StrategyKind::Rerank))
        .await;
    assert!(answer.starts_with("An error occurred while analyzing your query:"));
}
