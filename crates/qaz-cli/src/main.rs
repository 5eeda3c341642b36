//! qaz - Command-line interface for Kazakh passage retrieval.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use qaz_core::{PassageId, QazConfig, RerankStrategy, RerankedResult, RetrievalResult};
use qaz_query::{
    JsonlCorpus, LexicalRetriever, RetrieveParams, SearchEngine, SearchFilters, SearchRequest,
};
use qaz_rerank::{MockCrossEncoder, MockEmbedder, Reranker};

/// qaz - BM25 retrieval and reranking over Kazakh passages
#[derive(Parser)]
#[command(name = "qaz")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Corpus file in JSON Lines format (default: <data dir>/qazsearch/corpus.jsonl)
    #[arg(short, long, global = true)]
    corpus: Option<PathBuf>,

    /// Configuration file (default: user config dir, then ./qaz.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the corpus
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum lexical score
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Disable synonym expansion
        #[arg(long)]
        no_expand: bool,

        /// Rerank the lexical candidates
        #[arg(short, long)]
        rerank: bool,

        /// Use the built-in mock models instead of loading ONNX files
        #[arg(long)]
        mock_models: bool,
    },

    /// Show how a query is tokenized, expanded and scored
    Analyze {
        /// Query to analyze
        query: String,
    },

    /// Find passages similar to a passage in the corpus
    Similar {
        /// Passage id (numeric or string key)
        passage_id: String,

        /// Maximum number of results
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Search, then filter results by passage properties
    Filter {
        /// Search query
        query: String,

        /// Minimum passage length in characters
        #[arg(long)]
        min_length: Option<usize>,

        /// Maximum passage length in characters
        #[arg(long)]
        max_length: Option<usize>,

        /// Minimum number of Kazakh-specific letters
        #[arg(long)]
        min_special: Option<usize>,

        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Run every query in a file, one per line
    Batch {
        /// File with one query per line
        queries: PathBuf,

        /// Maximum number of results per query
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Show corpus and retriever statistics
    Stats,
}

fn get_corpus_path(corpus: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = corpus {
        return Ok(path);
    }

    let data_dir = dirs::data_local_dir().ok_or("Could not determine data directory")?;
    Ok(data_dir.join("qazsearch").join("corpus.jsonl"))
}

fn load_config(path: Option<&Path>) -> Result<QazConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => QazConfig::load(path)?,
        None => QazConfig::load_default()?,
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let corpus_path = get_corpus_path(cli.corpus)?;
    if !corpus_path.exists() {
        eprintln!(
            "Corpus file {} does not exist. Specify one with --corpus.",
            corpus_path.display()
        );
        std::process::exit(1);
    }

    let retriever = LexicalRetriever::from_source(
        &JsonlCorpus::new(&corpus_path),
        config.index.clone(),
        config.retrieval.clone(),
    )?;
    let json = cli.json;

    match cli.command {
        Commands::Search {
            query,
            top_k,
            threshold,
            no_expand,
            rerank,
            mock_models,
        } => {
            let top_k = top_k.unwrap_or(config.retrieval.default_top_k);
            if rerank {
                let reranker = build_reranker(&config, mock_models)?;
                let engine = SearchEngine::new(Arc::new(retriever), Arc::new(reranker))
                    .with_fusion(&config.fusion);
                let request = SearchRequest {
                    top_k,
                    threshold,
                    expand_query: Some(!no_expand),
                    hybrid: false,
                    candidates: config.fusion.candidates,
                    rerank_deadline: Duration::from_millis(config.rerank.deadline_ms),
                };
                let response = engine.search(&query, request).await?;
                if json {
                    print_json(&response)?;
                } else {
                    if !response.reranked {
                        println!("(reranker missed its deadline, showing lexical order)");
                    }
                    print_reranked(&response.results);
                    println!("\n{} results in {}ms", response.results.len(), response.latency_ms);
                }
            } else {
                let mut params = RetrieveParams::new().top_k(top_k).expand_query(!no_expand);
                params.threshold = threshold;
                let results = retriever.retrieve(&query, params);
                output_results(&results, json)?;
            }
        }
        Commands::Analyze { query } => {
            let analysis = retriever.query_analysis(&query);
            if json {
                print_json(&analysis)?;
            } else {
                println!("Query:     {}", analysis.query);
                println!("Tokens:    {}", analysis.tokenized_query.join(" "));
                println!("Expanded:  {}", analysis.expanded_query.join(" "));
                println!("Time:      {:?}", analysis.execution_time);
                println!();
                print_results(&analysis.results);
                if !analysis.common_tokens.is_empty() {
                    println!("\nCommon tokens:");
                    for (token, count) in &analysis.common_tokens {
                        println!("  {:<20} {}", token, count);
                    }
                }
            }
        }
        Commands::Similar { passage_id, top_k } => {
            let results = retriever.similar_passages(&parse_passage_id(&passage_id), top_k)?;
            output_results(&results, json)?;
        }
        Commands::Filter {
            query,
            min_length,
            max_length,
            min_special,
            top_k,
        } => {
            let filters = SearchFilters {
                min_length,
                max_length,
                min_special_chars: min_special,
                top_k,
            };
            let results = retriever.search_with_filters(&query, &filters);
            output_results(&results, json)?;
        }
        Commands::Batch { queries, top_k } => {
            let queries: Vec<String> = fs::read_to_string(&queries)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect();
            let batch = retriever.batch_retrieve(&queries, top_k);
            if json {
                print_json(&batch)?;
            } else {
                for (query, results) in &batch {
                    println!("== {} ==", query);
                    print_results(results);
                    println!();
                }
            }
        }
        Commands::Stats => {
            if json {
                print_json(&serde_json::json!({
                    "corpus": retriever.corpus_stats(),
                    "retriever": retriever.stats(),
                }))?;
            } else {
                print_stats(&retriever);
            }
        }
    }

    Ok(())
}

fn build_reranker(
    config: &QazConfig,
    mock_models: bool,
) -> Result<Reranker, Box<dyn std::error::Error>> {
    if !mock_models {
        return Ok(Reranker::from_config(&config.rerank)?);
    }

    Ok(match config.rerank.strategy {
        RerankStrategy::CrossEncoder => {
            Reranker::cross_encoder(Arc::new(MockCrossEncoder::new()), &config.rerank)
        }
        RerankStrategy::EmbeddingSimilarity => {
            Reranker::embedding_similarity(Arc::new(MockEmbedder::new()), &config.rerank)
        }
    })
}

/// Numeric ids are looked up as numbers, everything else as a string key.
fn parse_passage_id(raw: &str) -> PassageId {
    match raw.parse::<u64>() {
        Ok(id) => PassageId::Num(id),
        Err(_) => PassageId::Key(raw.to_string()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn output_results(results: &[RetrievalResult], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        print_json(&results)
    } else {
        print_results(results);
        Ok(())
    }
}

fn print_results(results: &[RetrievalResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] score={:.4}",
            i + 1,
            result.passage_id,
            result.lexical_score
        );
        println!("   {}", preview(&result.text));
    }
}

fn print_reranked(results: &[RerankedResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, reranked) in results.iter().enumerate() {
        println!(
            "{}. [{}] rerank={:.4} lexical={:.4}",
            i + 1,
            reranked.result.passage_id,
            reranked.rerank_score,
            reranked.result.lexical_score
        );
        println!("   {}", preview(&reranked.result.text));
    }
}

fn print_stats(retriever: &LexicalRetriever) {
    let corpus = retriever.corpus_stats();
    let stats = retriever.stats();

    println!("Snapshot:        {}", corpus.snapshot_id);
    println!("Passages:        {}", corpus.total_passages);
    println!("Unique tokens:   {}", corpus.unique_tokens);
    println!(
        "Passage length:  min {} / max {} / avg {:.1} / median {}",
        corpus.passage_lengths.min,
        corpus.passage_lengths.max,
        corpus.passage_lengths.avg,
        corpus.passage_lengths.median
    );
    println!(
        "Tokens/passage:  min {} / max {} / avg {:.1} / total {}",
        corpus.token_counts.min,
        corpus.token_counts.max,
        corpus.token_counts.avg,
        corpus.token_counts.total
    );
    println!("Cleaning:        {:?}", corpus.cleaning);
    println!("Cached queries:  {}", stats.cached_entries);
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 160;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_CHARS).collect();
    format!("{}...", cut)
}
