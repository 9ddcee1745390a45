use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::KccError;
use crate::config::Config;
use crate::corpus::{self, NormalizeOptions};
use crate::embeddings::ollama::OllamaClient;
use crate::embeddings::{Embedder, encode_corpus};
use crate::generator::GeneratorClient;
use crate::index::FlatIndex;
use crate::retrieval::{CorpusCoverage, RetrievalEngine};
use crate::store::ArtifactStore;
use crate::web;

/// Write the default configuration file if none exists yet.
#[inline]
pub fn init_config() -> Result<()> {
    let config = Config::load()?;
    let path = config.config_file_path();

    if path.exists() {
        println!("Configuration already exists: {}", path.display());
    } else {
        config.save()?;
        println!("Wrote default configuration: {}", path.display());
    }
    println!("Edit this file to change Ollama connection or search settings.");

    Ok(())
}

/// Print the active configuration.
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration file: {}", config.config_file_path().display());
    println!();
    println!("Ollama:");
    println!("  URL: {}", config.ollama_url()?);
    println!("  Embedding model: {}", config.ollama.embedding_model);
    println!("  Generation model: {}", config.ollama.generation_model);
    println!("  Batch size: {}", config.ollama.batch_size);
    println!("  Embedding dimension: {}", config.ollama.embedding_dimension);
    println!("Corpus:");
    println!("  Sample cap: {}", config.corpus.sample_cap);
    println!("  Sample seed: {}", config.corpus.sample_seed);
    println!("Search:");
    println!("  Top k: {}", config.search.top_k);
    println!("  Distance threshold: {}", config.search.threshold);
    println!("Artifact store: {}", config.store_path().display());

    Ok(())
}

/// Normalize a raw KCC CSV export into the cleaned JSONL corpus.
#[inline]
pub fn prepare(input: &Path, output: Option<PathBuf>, sample: Option<usize>) -> Result<()> {
    let config = Config::load()?;

    let mut options = NormalizeOptions::from(&config.corpus);
    if let Some(cap) = sample {
        options.sample_cap = cap;
    }

    let records = corpus::normalize_csv(input, &options)?;
    let output = output.unwrap_or_else(|| PathBuf::from("cleaned_kcc.jsonl"));
    corpus::write_jsonl(&records, &output)?;

    println!(
        "Cleaned {} Q&A pairs written to {}",
        records.len(),
        output.display()
    );

    Ok(())
}

/// Embed the cleaned corpus and publish the index/vectors/texts artifact
/// set.
#[inline]
pub fn build(corpus_path: &Path, store_override: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?;
    let store = ArtifactStore::new(store_override.unwrap_or_else(|| config.store_path()));

    let records = corpus::read_jsonl(corpus_path)?;
    if records.is_empty() {
        warn!("Corpus {} contains no records", corpus_path.display());
    }
    let texts = corpus::display_texts(&records);
    println!("Loaded {} records from {}", texts.len(), corpus_path.display());

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    client
        .health_check()
        .context("Ollama is not ready for embedding")?;

    let matrix = encode_corpus(&client, &texts, config.ollama.batch_size as usize)?;

    let dimension = matrix
        .first()
        .map(Vec::len)
        .unwrap_or(config.ollama.embedding_dimension as usize);
    if dimension != config.ollama.embedding_dimension as usize {
        warn!(
            "Model produced dimension {} but config declares {}",
            dimension, config.ollama.embedding_dimension
        );
    }

    let index = FlatIndex::build(dimension, &matrix)?;
    let manifest = store.publish(&index, &matrix, &texts, client.model_id())?;

    println!(
        "Published artifact set {} to {}",
        manifest.build_id,
        store.path().display()
    );
    println!("  Rows: {}", manifest.row_count);
    println!("  Dimension: {}", manifest.dimension);
    println!("  Embedding model: {}", manifest.embedding_model);

    Ok(())
}

fn load_engine(config: &Config, store_override: Option<PathBuf>) -> Result<RetrievalEngine> {
    let store = ArtifactStore::new(store_override.unwrap_or_else(|| config.store_path()));

    if !store.exists() {
        anyhow::bail!(
            "No artifact set found at {}. Run 'kcc-assist build' first.",
            store.path().display()
        );
    }

    let artifacts = store.load().context("Failed to load artifact set")?;
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;

    info!(
        "Loaded {} corpus rows (build {})",
        artifacts.texts.len(),
        artifacts.manifest.build_id
    );

    Ok(RetrievalEngine::new(Arc::new(client), artifacts)?)
}

/// Run a bare retrieval query and print the surviving matches.
#[inline]
pub fn search(
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
    store_override: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load()?;
    let engine = load_engine(&config, store_override)?;

    let top_k = top_k.unwrap_or(config.search.top_k);
    let threshold = threshold.unwrap_or(config.search.threshold);

    let matches = engine.search(query, top_k, threshold)?;

    if matches.is_empty() {
        println!("No corpus match within distance {threshold}.");
        return Ok(());
    }

    println!("{} match(es) within distance {threshold}:", matches.len());
    for m in &matches {
        println!("  [{:.4}] {}", m.distance, m.text);
    }

    Ok(())
}

/// Answer a question end to end: retrieve, decide coverage, generate, and
/// fall back to a web link when the corpus has nothing close enough.
#[inline]
pub fn ask(question: &str, store_override: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?;
    let engine = load_engine(&config, store_override)?;
    let generator =
        GeneratorClient::new(&config.ollama).context("Failed to create generator client")?;

    let matches = engine.search(question, config.search.top_k, config.search.threshold)?;
    let coverage = CorpusCoverage::evaluate(&matches);

    match &coverage {
        CorpusCoverage::Covered { context } => {
            println!("{}", style("Context retrieved from the KCC dataset:").green());
            for m in &matches {
                println!("  [{:.4}] {}", m.distance, m.text);
            }
            println!();

            let answer = generator.answer(question, Some(context))?;
            println!(
                "{}",
                style("Answer generated using KCC dataset context:").green().bold()
            );
            println!("{answer}");
        }
        CorpusCoverage::NotCovered => {
            println!(
                "{}",
                style("No relevant context found in the KCC database.").yellow()
            );

            match generator.answer(question, None) {
                Ok(answer) => {
                    println!(
                        "{}",
                        style(
                            "This answer comes from general model knowledge (not the KCC \
                             dataset). Please verify before applying."
                        )
                        .yellow()
                    );
                    println!("{answer}");

                    if let Some(link) = web::fallback_search_link(question) {
                        println!();
                        println!("Live web search result: {link}");
                    }
                }
                Err(KccError::Generation(reason)) => {
                    // Distinct terminal state: the model failed to answer.
                    println!(
                        "{}",
                        style("No answer was generated. Please try a more detailed or \
                               different question.")
                        .red()
                    );
                    info!("Generation produced no answer: {reason}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

/// Report configuration, Ollama connectivity, and artifact-set health.
#[inline]
pub fn show_status(store_override: Option<PathBuf>) -> Result<()> {
    let config = Config::load()?;

    println!("KCC Query Assistant status");
    println!("{}", "=".repeat(40));

    println!("Ollama:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "  Connected ({}:{}), embedding model {}",
                    config.ollama.host, config.ollama.port, config.ollama.embedding_model
                );
            }
            Err(e) => {
                println!("  Reachable but unhealthy: {e:#}");
            }
        },
        Err(e) => {
            println!("  Unavailable: {e:#}");
        }
    }

    let store = ArtifactStore::new(store_override.unwrap_or_else(|| config.store_path()));
    println!("Artifact store: {}", store.path().display());
    if store.exists() {
        match store.read_manifest() {
            Ok(manifest) => {
                println!("  Build: {}", manifest.build_id);
                println!("  Rows: {}", manifest.row_count);
                println!("  Dimension: {}", manifest.dimension);
                println!("  Embedding model: {}", manifest.embedding_model);
                println!(
                    "  Built at: {}",
                    manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Err(e) => {
                println!("  Manifest unreadable: {e}");
            }
        }
    } else {
        println!("  No artifact set published yet. Run 'kcc-assist build'.");
    }

    Ok(())
}
