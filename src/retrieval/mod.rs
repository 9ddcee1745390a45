#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::{Embedder, encode_query};
use crate::index::FlatIndex;
use crate::store::ArtifactSet;
use crate::{KccError, Result};

/// One surviving retrieval candidate: a display string and its squared L2
/// distance to the query. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub text: String,
    pub distance: f32,
}

/// Read-only retrieval service built from a verified artifact set.
///
/// Constructed once at startup and injected into request handlers; nothing
/// here mutates after construction, so one engine may serve any number of
/// concurrent queries.
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    index: FlatIndex,
    texts: Vec<String>,
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("embedder", &self.embedder.model_id())
            .field("index", &self.index)
            .field("texts", &self.texts)
            .finish()
    }
}

impl RetrievalEngine {
    /// Wrap a loaded artifact set with the query-time embedder.
    ///
    /// The embedder must be the same model the set was built with; the
    /// manifest makes that checkable, and a mismatch is a configuration
    /// error, not something retrieval can paper over.
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, artifacts: ArtifactSet) -> Result<Self> {
        if artifacts.manifest.embedding_model != embedder.model_id() {
            return Err(KccError::Config(format!(
                "Artifact set was built with model '{}' but the configured embedder is '{}'",
                artifacts.manifest.embedding_model,
                embedder.model_id()
            )));
        }

        Ok(Self {
            embedder,
            index: artifacts.index,
            texts: artifacts.texts,
        })
    }

    /// Number of knowledge-base rows available for retrieval.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.texts.len()
    }

    /// Encode the query, find the `k` nearest corpus rows, and keep those
    /// strictly closer than `threshold`.
    ///
    /// The threshold is a maximum-distance cutoff, not a similarity score:
    /// a candidate at exactly the threshold is rejected. Results come back
    /// nearest-first with ties in original row order. An empty result is a
    /// normal outcome, routed through [`CorpusCoverage`].
    #[inline]
    pub fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<ScoredMatch>> {
        let query_vector = encode_query(self.embedder.as_ref(), query)?;

        let neighbors = self.index.search(&query_vector, k)?;
        debug!(
            "Query matched {} of {} candidates before threshold {}",
            neighbors.len(),
            k,
            threshold
        );

        let mut matches = Vec::new();
        for neighbor in neighbors {
            if neighbor.distance >= threshold {
                continue;
            }
            let text = self.texts.get(neighbor.row).ok_or_else(|| {
                KccError::Alignment(format!(
                    "Index returned row {} but only {} texts are loaded",
                    neighbor.row,
                    self.texts.len()
                ))
            })?;
            matches.push(ScoredMatch {
                text: text.clone(),
                distance: neighbor.distance,
            });
        }

        if matches.is_empty() {
            warn!("No corpus match within threshold {threshold} for query");
        }

        Ok(matches)
    }
}

/// Decision between "trust the corpus" and "fall back to general
/// knowledge," made purely from the filtered retrieval result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusCoverage {
    /// The corpus covers the query; `context` is the newline-joined display
    /// strings, nearest first, ready to condition the generator.
    Covered { context: String },
    /// Nothing in the corpus was close enough; the downstream generator
    /// runs unconditioned.
    NotCovered,
}

impl CorpusCoverage {
    #[inline]
    pub fn evaluate(matches: &[ScoredMatch]) -> Self {
        if matches.is_empty() {
            return Self::NotCovered;
        }

        let context = matches
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self::Covered { context }
    }

    #[inline]
    pub fn is_covered(&self) -> bool {
        matches!(self, Self::Covered { .. })
    }

    #[inline]
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Covered { context } => Some(context),
            Self::NotCovered => None,
        }
    }
}
