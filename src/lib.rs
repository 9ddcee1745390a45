use thiserror::Error;

pub type Result<T> = std::result::Result<T, KccError>;

#[derive(Error, Debug)]
pub enum KccError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("Artifact alignment error: {0}")]
    Alignment(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod generator;
pub mod index;
pub mod retrieval;
pub mod store;
pub mod web;
