use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::DistanceMetric;
use crate::error::IndexError;
use crate::models::IndexedRecord;

pub const INDEX_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

/// Everything the index needs to come back after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub version: u32,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub embedding_model: String,
    pub updated_at: DateTime<Utc>,
    pub records: Vec<IndexedRecord>,
}

impl IndexFile {
    pub fn new(
        dimension: usize,
        metric: DistanceMetric,
        embedding_model: impl Into<String>,
        records: Vec<IndexedRecord>,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            dimension,
            metric,
            embedding_model: embedding_model.into(),
            updated_at: Utc::now(),
            records,
        }
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Missing,
    Loaded(IndexFile),
    /// Present but unusable; the reason is logged and the index starts empty.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct IndexStorage {
    dir: PathBuf,
}

impl IndexStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Startup load. Never fails: problems are reported through the outcome.
    pub fn load(&self) -> LoadOutcome {
        let path = self.path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return LoadOutcome::Missing,
            Err(e) => {
                return LoadOutcome::Corrupt(format!("failed to read {}: {}", path.display(), e))
            }
        };

        let file: IndexFile = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                return LoadOutcome::Corrupt(format!("failed to parse {}: {}", path.display(), e))
            }
        };

        if file.version != FORMAT_VERSION {
            return LoadOutcome::Corrupt(format!(
                "unsupported index format version {} (expected {})",
                file.version, FORMAT_VERSION
            ));
        }

        if let Some(bad) = file.records.iter().find(|r| r.vector.len() != file.dimension) {
            return LoadOutcome::Corrupt(format!(
                "record '{}' has {} dimensions, file declares {}",
                bad.id,
                bad.vector.len(),
                file.dimension
            ));
        }

        LoadOutcome::Loaded(file)
    }

    /// Full rewrite through a temp file and rename, so a crash mid-write leaves
    /// the previous index intact.
    pub async fn save(&self, file: &IndexFile) -> Result<(), IndexError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let bytes = serde_json::to_vec(file)?;
        let tmp = self.dir.join(format!("{}.tmp", INDEX_FILE));
        let mut out = tokio::fs::File::create(&tmp).await?;
        out.write_all(&bytes).await?;
        // Data must be on disk before the rename makes it the live index.
        out.sync_all().await?;
        drop(out);
        tokio::fs::rename(&tmp, self.path()).await?;
        Ok(())
    }
}
