use crate::domain::model::ProximityDocument;
use crate::domain::ports::ResultSink;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// Writes every chunk as `<prefix>_<index>.json` under `base_path`.
#[derive(Debug, Clone)]
pub struct LocalJsonSink {
    base_path: PathBuf,
    prefix: String,
}

impl LocalJsonSink {
    pub fn new(base_path: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            prefix: prefix.into(),
        }
    }

    pub fn chunk_path(&self, chunk_index: usize) -> PathBuf {
        Path::new(&self.base_path).join(format!("{}_{:04}.json", self.prefix, chunk_index))
    }
}

impl ResultSink for LocalJsonSink {
    async fn save_chunk(&self, chunk_index: usize, documents: &[ProximityDocument]) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;
        let data = serde_json::to_vec_pretty(documents)?;
        tokio::fs::write(self.chunk_path(chunk_index), data).await?;
        Ok(())
    }
}
