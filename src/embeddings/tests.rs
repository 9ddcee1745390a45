use super::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic per-item embedding derived from a hash of the text, so
/// batch splits cannot change the result.
struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    fn vector_for(&self, text: &str) -> Vec<f32> {
        (0..self.dimension)
            .map(|component| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                component.hash(&mut hasher);
                (hasher.finish() % 1000) as f32 / 1000.0
            })
            .collect()
    }
}

impl Embedder for StubEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_id(&self) -> &str {
        "stub-embedder"
    }
}

/// Misbehaving embedder that drops the last vector of every batch.
struct ShortChangingEmbedder;

impl Embedder for ShortChangingEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![0.0, 0.0]).collect())
    }

    fn model_id(&self) -> &str {
        "short-changing"
    }
}

/// Misbehaving embedder whose output dimension depends on the text length.
struct RaggedEmbedder;

impl Embedder for RaggedEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![0.0; t.len()]).collect())
    }

    fn model_id(&self) -> &str {
        "ragged"
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn embed(&self, _texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Err(crate::KccError::Embedding("model unavailable".to_string()))
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

fn sample_texts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("Q: question {i} A: answer {i}")).collect()
}

#[test]
fn encode_preserves_input_order() {
    let embedder = StubEmbedder { dimension: 8 };
    let texts = sample_texts(10);

    let matrix = encode_corpus(&embedder, &texts, 4).expect("should encode");

    assert_eq!(matrix.len(), texts.len());
    for (text, vector) in texts.iter().zip(&matrix) {
        assert_eq!(vector, &embedder.vector_for(text));
    }
}

#[test]
fn encode_is_batch_size_invariant() {
    let embedder = StubEmbedder { dimension: 16 };
    let texts = sample_texts(17);

    let one_at_a_time = encode_corpus(&embedder, &texts, 1).expect("should encode");
    let big_batches = encode_corpus(&embedder, &texts, 7).expect("should encode");
    let single_batch = encode_corpus(&embedder, &texts, 1000).expect("should encode");

    assert_eq!(one_at_a_time, big_batches);
    assert_eq!(one_at_a_time, single_batch);
}

#[test]
fn encode_empty_corpus() {
    let embedder = StubEmbedder { dimension: 4 };
    let matrix = encode_corpus(&embedder, &[], 8).expect("should encode");
    assert!(matrix.is_empty());
}

#[test]
fn encode_rejects_count_mismatch() {
    let texts = sample_texts(3);
    let err = encode_corpus(&ShortChangingEmbedder, &texts, 8).expect_err("should fail");
    assert!(matches!(err, crate::KccError::Embedding(_)));
}

#[test]
fn encode_rejects_inconsistent_dimensions() {
    let texts = vec!["short".to_string(), "a longer text".to_string()];
    let err = encode_corpus(&RaggedEmbedder, &texts, 8).expect_err("should fail");
    assert!(matches!(err, crate::KccError::Embedding(_)));
    assert!(err.to_string().contains("dimension"));
}

#[test]
fn encode_propagates_embedder_failure() {
    let texts = sample_texts(2);
    let err = encode_corpus(&FailingEmbedder, &texts, 8).expect_err("should fail");
    assert!(matches!(err, crate::KccError::Embedding(_)));
}

#[test]
fn query_encoding_matches_corpus_encoding() {
    let embedder = StubEmbedder { dimension: 8 };
    let text = "Q: fertilizer for tomato A: use NPK 19:19:19".to_string();

    let matrix = encode_corpus(&embedder, std::slice::from_ref(&text), 1).expect("should encode");
    let query_vector = encode_query(&embedder, &text).expect("should encode query");

    assert_eq!(matrix[0], query_vector);
}
