use super::*;
use crate::store::Manifest;
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Stub embedding model with a fixed vector per known text. Unknown text is
/// an embedding failure, which doubles as the per-query error case.
struct KeyedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl KeyedEmbedder {
    fn new(entries: &[(&str, [f32; 2])]) -> Self {
        Self {
            vectors: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.to_vec()))
                .collect(),
        }
    }
}

impl Embedder for KeyedEmbedder {
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| KccError::Embedding(format!("unknown text: {t}")))
            })
            .collect()
    }

    fn model_id(&self) -> &str {
        "stub-embedder"
    }
}

const TOMATO: &str = "Q: fertilizer for tomato A: use NPK 19:19:19";
const PADDY: &str = "Q: paddy blast control A: spray tricyclazole";
const RAIN: &str = "Q: rain forecast A: expect light showers";

fn fixture_embedder() -> KeyedEmbedder {
    KeyedEmbedder::new(&[
        (TOMATO, [0.0, 0.0]),
        (PADDY, [1.0, 0.0]),
        (RAIN, [0.5, 0.0]),
        ("fertilizer for tomato", [0.0, 0.0]),
        ("something about paddy", [0.9, 0.0]),
        ("drip irrigation schedule", [10.0, 10.0]),
    ])
}

fn fixture_artifacts(embedder: &KeyedEmbedder) -> ArtifactSet {
    let texts = vec![TOMATO.to_string(), PADDY.to_string(), RAIN.to_string()];
    let vectors: Vec<Vec<f32>> = texts
        .iter()
        .map(|t| embedder.vectors[t].clone())
        .collect();
    let index = FlatIndex::build(2, &vectors).expect("should build index");

    ArtifactSet {
        index,
        vectors,
        texts,
        manifest: Manifest {
            row_count: 3,
            dimension: 2,
            embedding_model: "stub-embedder".to_string(),
            built_at: Utc::now(),
            build_id: Uuid::new_v4(),
        },
    }
}

fn fixture_engine() -> RetrievalEngine {
    let embedder = fixture_embedder();
    let artifacts = fixture_artifacts(&embedder);
    RetrievalEngine::new(Arc::new(embedder), artifacts).expect("should build engine")
}

#[test]
fn rejects_model_mismatch() {
    let embedder = fixture_embedder();
    let mut artifacts = fixture_artifacts(&embedder);
    artifacts.manifest.embedding_model = "some-other-model".to_string();

    let err = RetrievalEngine::new(Arc::new(embedder), artifacts).expect_err("should fail");
    assert!(matches!(err, KccError::Config(_)));
}

#[test]
fn exact_match_is_first_with_zero_distance() {
    let engine = fixture_engine();

    let matches = engine
        .search("fertilizer for tomato", 5, 0.5)
        .expect("should search");

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].text, TOMATO);
    assert_eq!(matches[0].distance, 0.0);
    // Rain at distance 0.25 also survives; paddy at 1.0 does not.
    assert_eq!(matches[1].text, RAIN);
    assert_eq!(matches[1].distance, 0.25);
}

#[test]
fn threshold_is_a_strict_maximum_distance() {
    let engine = fixture_engine();

    // Rain sits at squared distance exactly 0.25 from the tomato query.
    let at_threshold = engine
        .search("fertilizer for tomato", 5, 0.25)
        .expect("should search");
    assert_eq!(at_threshold.len(), 1);
    assert_eq!(at_threshold[0].text, TOMATO);

    let above_threshold = engine
        .search("fertilizer for tomato", 5, 0.26)
        .expect("should search");
    assert_eq!(above_threshold.len(), 2);
}

#[test]
fn widening_the_threshold_never_drops_results() {
    let engine = fixture_engine();

    let mut previous: Vec<ScoredMatch> = Vec::new();
    for threshold in [0.1, 0.25, 0.26, 0.5, 1.0, 1.5, 10.0] {
        let current = engine
            .search("fertilizer for tomato", 5, threshold)
            .expect("should search");

        assert!(current.len() >= previous.len());
        // The smaller result set is always a prefix of the larger one.
        assert_eq!(&current[..previous.len()], previous.as_slice());
        previous = current;
    }
}

#[test]
fn results_are_sorted_ascending() {
    let engine = fixture_engine();

    let matches = engine
        .search("something about paddy", 5, 10.0)
        .expect("should search");

    assert_eq!(matches.len(), 3);
    assert!(
        matches
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance)
    );
    assert_eq!(matches[0].text, PADDY);
}

#[test]
fn k_caps_the_candidate_set() {
    let engine = fixture_engine();

    let matches = engine
        .search("something about paddy", 1, 10.0)
        .expect("should search");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].text, PADDY);
}

#[test]
fn distant_query_yields_empty_result() {
    let engine = fixture_engine();

    let matches = engine
        .search("drip irrigation schedule", 5, 0.3)
        .expect("should search");
    assert!(matches.is_empty());
}

#[test]
fn per_query_failure_leaves_engine_usable() {
    let engine = fixture_engine();

    let err = engine
        .search("never embedded before", 5, 0.5)
        .expect_err("unknown query should fail");
    assert!(matches!(err, KccError::Embedding(_)));

    // The loaded index is still good for the next query.
    let matches = engine
        .search("fertilizer for tomato", 5, 0.5)
        .expect("should search");
    assert!(!matches.is_empty());
}

#[test]
fn coverage_covered_joins_context_in_order() {
    let matches = vec![
        ScoredMatch {
            text: TOMATO.to_string(),
            distance: 0.0,
        },
        ScoredMatch {
            text: RAIN.to_string(),
            distance: 0.25,
        },
    ];

    let coverage = CorpusCoverage::evaluate(&matches);
    assert!(coverage.is_covered());
    assert_eq!(coverage.context(), Some(format!("{TOMATO}\n{RAIN}").as_str()));
}

#[test]
fn coverage_not_covered_on_empty_result() {
    let coverage = CorpusCoverage::evaluate(&[]);
    assert!(!coverage.is_covered());
    assert_eq!(coverage.context(), None);
    assert_eq!(coverage, CorpusCoverage::NotCovered);
}

#[test]
fn engine_is_shareable_across_threads() {
    let engine = Arc::new(fixture_engine());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .search("fertilizer for tomato", 5, 0.5)
                    .expect("should search")
                    .len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("thread should finish"), 2);
    }
}
