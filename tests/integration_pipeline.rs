//! End-to-end pipeline tests: normalize, encode, index, publish, load, and
//! retrieve with a deterministic stub embedding model.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use kcc_assist::corpus::{self, NormalizeOptions, Record};
use kcc_assist::embeddings::{Embedder, encode_corpus};
use kcc_assist::index::FlatIndex;
use kcc_assist::retrieval::{CorpusCoverage, RetrievalEngine};
use kcc_assist::store::{ArtifactSet, ArtifactStore};

/// Stub embedding model: one vector component per vocabulary keyword, set
/// when the text mentions the keyword. Deterministic, batch-size-invariant,
/// and close in L2 for texts that share vocabulary.
struct KeywordEmbedder;

const VOCAB: &[&str] = &[
    "fertilizer",
    "tomato",
    "npk",
    "drip",
    "irrigation",
    "paddy",
    "blast",
    "rain",
];

impl Embedder for KeywordEmbedder {
    fn embed(&self, texts: &[String]) -> kcc_assist::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCAB
                    .iter()
                    .map(|word| if lower.contains(word) { 0.5 } else { 0.0 })
                    .collect()
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "keyword-stub"
    }
}

fn record(question: &str, answer: &str) -> Record {
    Record {
        question: question.to_string(),
        answer: answer.to_string(),
        crop: None,
        district: None,
        query_type: None,
        season: None,
        state: None,
    }
}

fn build_and_publish(store: &ArtifactStore, records: &[Record]) {
    let texts = corpus::display_texts(records);
    let matrix = encode_corpus(&KeywordEmbedder, &texts, 2).expect("should encode");
    let index = FlatIndex::build(VOCAB.len(), &matrix).expect("should build index");
    store
        .publish(&index, &matrix, &texts, KeywordEmbedder.model_id())
        .expect("should publish");
}

fn load_engine(store: &ArtifactStore) -> RetrievalEngine {
    let artifacts = store.load().expect("should load artifact set");
    RetrievalEngine::new(Arc::new(KeywordEmbedder), artifacts).expect("should build engine")
}

#[test]
fn scenario_a_single_record_corpus_is_covered() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path().join("vector_store"));

    build_and_publish(&store, &[record("fertilizer for tomato", "use NPK 19:19:19")]);
    let engine = load_engine(&store);

    let matches = engine
        .search("fertilizer for tomato", 5, 0.5)
        .expect("should search");

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].text, "Q: fertilizer for tomato A: use NPK 19:19:19");
    assert!(matches[0].distance < 0.5);

    let coverage = CorpusCoverage::evaluate(&matches);
    assert!(coverage.is_covered());
    assert_eq!(
        coverage.context(),
        Some("Q: fertilizer for tomato A: use NPK 19:19:19")
    );
}

#[test]
fn scenario_b_uncovered_query_signals_no_context() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path().join("vector_store"));

    build_and_publish(
        &store,
        &[
            record("fertilizer for tomato", "use NPK 19:19:19"),
            record("paddy blast control", "spray tricyclazole"),
        ],
    );
    let engine = load_engine(&store);

    let matches = engine
        .search("how to set up drip irrigation", 5, 0.3)
        .expect("should search");
    assert!(matches.is_empty());

    let coverage = CorpusCoverage::evaluate(&matches);
    assert_eq!(coverage, CorpusCoverage::NotCovered);
}

#[test]
fn csv_to_retrieval_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let csv_path = temp_dir.path().join("raw.csv");
    std::fs::write(
        &csv_path,
        "StateName,DistrictName,QueryType,Season,Crop,QueryText,KccAns\n\
         KARNATAKA,Tumkur,Fertilizer,Kharif,Tomato,fertilizer for tomato,use NPK 19:19:19\n\
         KARNATAKA,Mysore,Pest,Rabi,Paddy,,dropped row\n\
         KARNATAKA,Mandya,Weather,Kharif,Paddy,paddy blast control,spray tricyclazole\n",
    )
    .expect("should write csv");

    let options = NormalizeOptions {
        sample_cap: 100_000,
        sample_seed: 42,
    };
    let records = corpus::normalize_csv(&csv_path, &options).expect("should normalize");
    assert_eq!(records.len(), 2);

    let jsonl_path = temp_dir.path().join("cleaned_kcc.jsonl");
    corpus::write_jsonl(&records, &jsonl_path).expect("should write jsonl");
    let reloaded = corpus::read_jsonl(&jsonl_path).expect("should read jsonl");
    assert_eq!(reloaded, records);

    let store = ArtifactStore::new(temp_dir.path().join("vector_store"));
    build_and_publish(&store, &reloaded);
    let engine = load_engine(&store);

    assert_eq!(engine.row_count(), 2);
    let matches = engine
        .search("paddy blast control", 5, 0.5)
        .expect("should search");
    assert_eq!(matches[0].text, "Q: paddy blast control A: spray tricyclazole");
}

#[test]
fn rebuild_then_swap_leaves_readers_unaffected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path().join("vector_store"));

    build_and_publish(&store, &[record("fertilizer for tomato", "use NPK 19:19:19")]);
    let first_manifest = store.read_manifest().expect("should read manifest");

    // An in-flight reader loads the first build.
    let engine = load_engine(&store);

    // The corpus is updated and republished while the reader is live.
    build_and_publish(
        &store,
        &[
            record("paddy blast control", "spray tricyclazole"),
            record("rain forecast", "expect light showers"),
        ],
    );

    // The reader's loaded set is complete and still answers correctly.
    let matches = engine
        .search("fertilizer for tomato", 5, 0.5)
        .expect("should search");
    assert_eq!(matches.len(), 1);
    assert_eq!(engine.row_count(), 1);

    // A fresh load observes only the new set, never a mixture.
    let second_manifest = store.read_manifest().expect("should read manifest");
    assert_ne!(first_manifest.build_id, second_manifest.build_id);

    let fresh = load_engine(&store);
    assert_eq!(fresh.row_count(), 2);
    let matches = fresh
        .search("fertilizer for tomato", 5, 0.5)
        .expect("should search");
    assert!(matches.is_empty());

    assert_no_stray_directories(temp_dir.path());
}

fn assert_no_stray_directories(parent: &Path) {
    let names: Vec<String> = std::fs::read_dir(parent)
        .expect("should list dir")
        .map(|entry| {
            entry
                .expect("should read entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(names, vec!["vector_store".to_string()]);
}

#[test]
fn artifact_sets_from_different_builds_do_not_mix() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = ArtifactStore::new(temp_dir.path().join("vector_store"));

    build_and_publish(&store, &[record("fertilizer for tomato", "use NPK 19:19:19")]);
    let ArtifactSet { texts, .. } = store.load().expect("should load");

    build_and_publish(
        &store,
        &[
            record("paddy blast control", "spray tricyclazole"),
            record("rain forecast", "expect light showers"),
        ],
    );

    // Graft the old text list onto the new build: the loader must refuse it.
    let stale = serde_json::to_vec(&texts).expect("should encode");
    std::fs::write(store.path().join("texts.json"), stale).expect("should write");

    let err = store.load().expect_err("should reject mixed artifact set");
    assert!(matches!(err, kcc_assist::KccError::Alignment(_)));
}
