use clap::{Parser, Subcommand};
use kcc_assist::commands::{ask, build, init_config, prepare, search, show_config, show_status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kcc-assist")]
#[command(about = "Retrieval-augmented query assistant for the KCC agricultural Q&A corpus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or inspect the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Normalize a raw KCC CSV export into a cleaned JSONL corpus
    Prepare {
        /// Path to the raw CSV export
        input: PathBuf,
        /// Output path for the cleaned corpus
        #[arg(long)]
        output: Option<PathBuf>,
        /// Override the sample cap from the config
        #[arg(long)]
        sample: Option<usize>,
    },
    /// Embed a cleaned corpus and publish the search artifact set
    Build {
        /// Path to the cleaned JSONL corpus
        corpus: PathBuf,
        /// Override the artifact store directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Run a retrieval query and print the matches
    Search {
        /// The question to search for
        query: String,
        /// Number of nearest neighbors to consider
        #[arg(long)]
        top_k: Option<usize>,
        /// Maximum distance for a match to count
        #[arg(long)]
        threshold: Option<f32>,
        /// Override the artifact store directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Answer a question, using corpus context when available
    Ask {
        /// The agricultural question to answer
        question: String,
        /// Override the artifact store directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Show Ollama connectivity and artifact set details
    Status {
        /// Override the artifact store directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Prepare {
            input,
            output,
            sample,
        } => {
            prepare(&input, output, sample)?;
        }
        Commands::Build { corpus, store } => {
            build(&corpus, store)?;
        }
        Commands::Search {
            query,
            top_k,
            threshold,
            store,
        } => {
            search(&query, top_k, threshold, store)?;
        }
        Commands::Ask { question, store } => {
            ask(&question, store)?;
        }
        Commands::Status { store } => {
            show_status(store)?;
        }
    }

    Ok(())
}
