//! `fbh` — feedback analysis from the command line.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use feedback_harness::analyzer::FeedbackAnalyzer;
use feedback_harness::config::load_config;
use feedback_harness::corpus;
use feedback_harness_core::retriever::StrategyKind;

#[derive(Parser)]
#[command(name = "fbh", version, about = "Agentic analysis over a user-feedback corpus")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "feedback-harness.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question about the feedback corpus.
    Ask {
        /// The question to analyze.
        query: String,
        /// Retrieval strategy (similarity, keyword, multi_query,
        /// parent_child, rerank, ensemble). Defaults to the config.
        #[arg(short, long)]
        strategy: Option<String>,
    },
    /// Compare retrieval strategies over the golden question set.
    Eval {
        /// Strategies to compare; all six when omitted.
        #[arg(short, long, value_delimiter = ',')]
        strategies: Vec<String>,
    },
    /// Print corpus statistics.
    Corpus,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Ask { query, strategy } => {
            let strategy = strategy
                .as_deref()
                .map(|s| s.parse::<StrategyKind>())
                .transpose()?;
            let analyzer = FeedbackAnalyzer::from_config(config)?;
            let answer = analyzer.analyze(&query, strategy).await;
            println!("{answer}");
        }
        Commands::Eval { strategies } => {
            let kinds: Vec<StrategyKind> = if strategies.is_empty() {
                StrategyKind::all().to_vec()
            } else {
                strategies
                    .iter()
                    .map(|s| s.parse())
                    .collect::<feedback_harness_core::Result<_>>()?
            };
            let analyzer = FeedbackAnalyzer::from_config(config)?;
            let records = analyzer.evaluate(&kinds).await?;
            print_eval_table(&records);
        }
        Commands::Corpus => {
            let records = corpus::load_corpus(&config.corpus.path)?;
            let summary = corpus::summarize(&records);
            println!("Records: {}", summary.records);
            if let Some((lo, hi)) = summary.date_range {
                println!("Date range: {lo} — {hi}");
            }
            println!("\nBy source:");
            for (source, count) in &summary.by_source {
                println!("  {source:<20} {count}");
            }
            println!("\nBy sentiment:");
            for (sentiment, count) in &summary.by_sentiment {
                println!("  {sentiment:<20} {count}");
            }
        }
    }

    Ok(())
}

fn print_eval_table(records: &[feedback_harness_core::models::EvaluationRecord]) {
    println!(
        "{:<14} {:>7} {:>7} {:>7} {:>7} {:>9} {:>9} {:>5}",
        "strategy", "recall", "faith", "relev", "precis", "avg_lat", "cost_usd", "mode"
    );
    for record in records {
        println!(
            "{:<14} {:>7.3} {:>7.3} {:>7.3} {:>7.3} {:>8.2}s {:>9.4} {:>5}",
            record.retriever_name,
            record.context_recall,
            record.faithfulness,
            record.answer_relevancy,
            record.context_precision,
            record.avg_latency_seconds,
            record.total_cost_usd,
            if record.degraded { "heur" } else { "judge" },
        );
    }
}
