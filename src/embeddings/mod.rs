#[cfg(test)]
mod tests;

pub mod ollama;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::{KccError, Result};

/// Black-box embedding function: one fixed-dimension vector per input
/// string, returned in input order.
///
/// Implementations must be deterministic for a given model and input, and
/// batch-size-invariant: embedding a text alone or inside a larger batch
/// yields the same vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Identifier of the underlying model, recorded in the artifact
    /// manifest so a serve-time model mismatch is detectable.
    fn model_id(&self) -> &str;
}

/// Encode the ordered text stream into the vector matrix.
///
/// Batching is purely a throughput concern; outputs are concatenated in
/// input order so the matrix stays positionally aligned with the texts. Any
/// embedder failure aborts the build: skipping a row or substituting a
/// placeholder vector would silently corrupt the alignment.
#[inline]
pub fn encode_corpus(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    info!(
        "Encoding {} texts in batches of {} with model {}",
        texts.len(),
        batch_size,
        embedder.model_id()
    );

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(texts.len() as u64).with_style(
            ProgressStyle::with_template("{bar:40} [{pos}/{len}] Encoding")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    let mut matrix: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    let mut dimension: Option<usize> = None;

    for batch in texts.chunks(batch_size) {
        let vectors = embedder.embed(batch)?;

        if vectors.len() != batch.len() {
            return Err(KccError::Embedding(format!(
                "Embedder returned {} vectors for a batch of {}",
                vectors.len(),
                batch.len()
            )));
        }

        for vector in vectors {
            match dimension {
                None => dimension = Some(vector.len()),
                Some(dim) if dim != vector.len() => {
                    return Err(KccError::Embedding(format!(
                        "Inconsistent embedding dimension: expected {dim}, got {}",
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
            matrix.push(vector);
        }

        bar.inc(batch.len() as u64);
    }

    bar.finish_and_clear();
    debug!(
        "Encoded {} vectors of dimension {}",
        matrix.len(),
        dimension.unwrap_or(0)
    );

    Ok(matrix)
}

/// Encode a single query string, enforcing the one-in/one-out contract.
#[inline]
pub fn encode_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    let mut vectors = embedder.embed(&[query.to_string()])?;

    if vectors.len() != 1 {
        return Err(KccError::Embedding(format!(
            "Embedder returned {} vectors for a single query",
            vectors.len()
        )));
    }

    Ok(vectors.remove(0))
}
