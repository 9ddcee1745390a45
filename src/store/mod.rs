
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::index::FlatIndex;
use crate::{KccError, Result};

pub const INDEX_FILE: &str = "index.bin";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const TEXTS_FILE: &str = "texts.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Describes one published artifact set. The three data artifacts are only
/// valid as a matched triple; the manifest is what lets a loader prove it
/// has one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub row_count: usize,
    pub dimension: usize,
    pub embedding_model: String,
    pub built_at: DateTime<Utc>,
    pub build_id: Uuid,
}

/// A fully loaded, verified artifact set: index, vector matrix, and text
/// list from the same build.
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub index: FlatIndex,
    pub vectors: Vec<Vec<f32>>,
    pub texts: Vec<String>,
    pub manifest: Manifest,
}

/// On-disk home of the artifact set. Publication is build-then-swap: a new
/// set is written to a temporary sibling directory and renamed into place,
/// so a reader never observes a half-written or mixed set. Readers that
/// loaded the previous set keep working from memory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).exists()
    }

    /// Atomically publish a new artifact set, replacing any previous one.
    #[inline]
    pub fn publish(
        &self,
        index: &FlatIndex,
        vectors: &[Vec<f32>],
        texts: &[String],
        embedding_model: &str,
    ) -> Result<Manifest> {
        verify_aligned(index, vectors, texts)?;

        let manifest = Manifest {
            row_count: texts.len(),
            dimension: index.dimension(),
            embedding_model: embedding_model.to_string(),
            built_at: Utc::now(),
            build_id: Uuid::new_v4(),
        };

        let parent = self.dir.parent().ok_or_else(|| {
            KccError::Store(format!(
                "Store path {} has no parent directory",
                self.dir.display()
            ))
        })?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create store parent: {}", parent.display()))?;

        let dir_name = self
            .dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("vector_store");
        let staging = parent.join(format!(".{dir_name}-build-{}", manifest.build_id));

        if let Err(e) = write_artifacts(&staging, index, vectors, texts, &manifest) {
            // Leave no partial set behind
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        self.swap_into_place(&staging, &manifest)?;

        info!(
            "Published artifact set {} ({} rows, dimension {}, model {})",
            manifest.build_id, manifest.row_count, manifest.dimension, manifest.embedding_model
        );

        Ok(manifest)
    }

    fn swap_into_place(&self, staging: &Path, manifest: &Manifest) -> Result<()> {
        if self.dir.exists() {
            let parent = staging.parent().unwrap_or_else(|| Path::new("."));
            let dir_name = self
                .dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("vector_store");
            let retired = parent.join(format!(".{dir_name}-old-{}", manifest.build_id));

            fs::rename(&self.dir, &retired).with_context(|| {
                format!("Failed to retire previous store: {}", self.dir.display())
            })?;
            fs::rename(staging, &self.dir)
                .with_context(|| format!("Failed to publish new store: {}", self.dir.display()))?;

            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!(
                    "Failed to remove retired artifact set {}: {}",
                    retired.display(),
                    e
                );
            }
        } else {
            fs::rename(staging, &self.dir)
                .with_context(|| format!("Failed to publish new store: {}", self.dir.display()))?;
        }

        Ok(())
    }

    /// Load and verify the artifact set. Any disagreement between the
    /// manifest and the three artifacts aborts the load: serving from a
    /// misaligned set would return wrong answers confidently.
    #[inline]
    pub fn load(&self) -> Result<ArtifactSet> {
        let manifest = self.read_manifest()?;

        let index_bytes = fs::read(self.dir.join(INDEX_FILE))
            .with_context(|| format!("Failed to read {INDEX_FILE}"))?;
        let index: FlatIndex = bincode::deserialize(&index_bytes)
            .map_err(|e| KccError::Store(format!("Failed to decode {INDEX_FILE}: {e}")))?;

        let vector_bytes = fs::read(self.dir.join(VECTORS_FILE))
            .with_context(|| format!("Failed to read {VECTORS_FILE}"))?;
        let vectors: Vec<Vec<f32>> = bincode::deserialize(&vector_bytes)
            .map_err(|e| KccError::Store(format!("Failed to decode {VECTORS_FILE}: {e}")))?;

        let texts_bytes = fs::read(self.dir.join(TEXTS_FILE))
            .with_context(|| format!("Failed to read {TEXTS_FILE}"))?;
        let texts: Vec<String> = serde_json::from_slice(&texts_bytes)
            .map_err(|e| KccError::Store(format!("Failed to decode {TEXTS_FILE}: {e}")))?;

        verify_aligned(&index, &vectors, &texts)?;
        verify_manifest(&manifest, &index, &texts)?;

        debug!(
            "Loaded artifact set {} ({} rows)",
            manifest.build_id, manifest.row_count
        );

        Ok(ArtifactSet {
            index,
            vectors,
            texts,
            manifest,
        })
    }

    /// Read only the manifest, e.g. for status reporting.
    #[inline]
    pub fn read_manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| KccError::Store(format!("Failed to decode {MANIFEST_FILE}: {e}")))?;
        Ok(manifest)
    }
}

fn write_artifacts(
    staging: &Path,
    index: &FlatIndex,
    vectors: &[Vec<f32>],
    texts: &[String],
    manifest: &Manifest,
) -> Result<()> {
    fs::create_dir_all(staging)
        .with_context(|| format!("Failed to create staging dir: {}", staging.display()))?;

    let index_bytes = bincode::serialize(index)
        .map_err(|e| KccError::Store(format!("Failed to encode {INDEX_FILE}: {e}")))?;
    fs::write(staging.join(INDEX_FILE), index_bytes)
        .with_context(|| format!("Failed to write {INDEX_FILE}"))?;

    let vector_bytes = bincode::serialize(vectors)
        .map_err(|e| KccError::Store(format!("Failed to encode {VECTORS_FILE}: {e}")))?;
    fs::write(staging.join(VECTORS_FILE), vector_bytes)
        .with_context(|| format!("Failed to write {VECTORS_FILE}"))?;

    let texts_bytes = serde_json::to_vec(texts)
        .map_err(|e| KccError::Store(format!("Failed to encode {TEXTS_FILE}: {e}")))?;
    fs::write(staging.join(TEXTS_FILE), texts_bytes)
        .with_context(|| format!("Failed to write {TEXTS_FILE}"))?;

    let manifest_bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| KccError::Store(format!("Failed to encode {MANIFEST_FILE}: {e}")))?;
    fs::write(staging.join(MANIFEST_FILE), manifest_bytes)
        .with_context(|| format!("Failed to write {MANIFEST_FILE}"))?;

    Ok(())
}

/// The single most important invariant in the system: index rows, vector
/// matrix rows, and text entries must line up one to one.
fn verify_aligned(index: &FlatIndex, vectors: &[Vec<f32>], texts: &[String]) -> Result<()> {
    if index.len() != texts.len() || vectors.len() != texts.len() {
        return Err(KccError::Alignment(format!(
            "Row counts disagree: index has {}, vectors have {}, texts have {}",
            index.len(),
            vectors.len(),
            texts.len()
        )));
    }

    for (row, vector) in vectors.iter().enumerate() {
        if vector.len() != index.dimension() {
            return Err(KccError::Alignment(format!(
                "Vector row {row} has dimension {}, index expects {}",
                vector.len(),
                index.dimension()
            )));
        }
    }

    Ok(())
}

fn verify_manifest(manifest: &Manifest, index: &FlatIndex, texts: &[String]) -> Result<()> {
    if manifest.row_count != texts.len() {
        return Err(KccError::Alignment(format!(
            "Manifest row count {} does not match loaded rows {}",
            manifest.row_count,
            texts.len()
        )));
    }

    if manifest.dimension != index.dimension() {
        return Err(KccError::Alignment(format!(
            "Manifest dimension {} does not match index dimension {}",
            manifest.dimension,
            index.dimension()
        )));
    }

    Ok(())
}
