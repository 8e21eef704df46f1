use crate::core::orchestrator::{RunReport, RunState};
use crate::domain::model::{ProximityDocument, ProximityResult};
use crate::domain::ports::ResultSink;
use serde::Serialize;

pub const MIN_CHUNK_SIZE: usize = 20;
pub const MAX_CHUNK_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOutcome {
    pub index: usize,
    pub documents: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistSummary {
    pub chunks: Vec<ChunkOutcome>,
}

impl PersistSummary {
    pub fn saved_documents(&self) -> usize {
        self.chunks
            .iter()
            .filter(|chunk| chunk.error.is_none())
            .map(|chunk| chunk.documents)
            .sum()
    }

    pub fn failed_chunks(&self) -> usize {
        self.chunks.iter().filter(|chunk| chunk.error.is_some()).count()
    }
}

/// Hands results to the sink in chunks; a failed chunk is recorded and the rest still go out.
pub async fn persist_results<S: ResultSink>(
    sink: &S,
    results: &[ProximityResult],
    category: &str,
    chunk_size: usize,
) -> PersistSummary {
    let chunk_size = chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
    let resolved_at = chrono::Utc::now();
    let documents: Vec<ProximityDocument> = results
        .iter()
        .map(|result| ProximityDocument::from_result(result, category, resolved_at))
        .collect();

    let mut summary = PersistSummary::default();
    for (index, chunk) in documents.chunks(chunk_size).enumerate() {
        let error = match sink.save_chunk(index, chunk).await {
            Ok(()) => {
                tracing::debug!("💾 Saved chunk {} ({} documents)", index + 1, chunk.len());
                None
            }
            Err(e) => {
                tracing::error!("❌ Failed to save chunk {} ({} documents): {}", index + 1, chunk.len(), e);
                Some(e.to_string())
            }
        };
        summary.chunks.push(ChunkOutcome {
            index,
            documents: chunk.len(),
            error,
        });
    }

    tracing::info!(
        "💾 Persisted {}/{} results in {} chunks ({} failed)",
        summary.saved_documents(),
        documents.len(),
        summary.chunks.len(),
        summary.failed_chunks()
    );
    summary
}

/// Persists a run's results only when it completed; cancelled and failed
/// runs keep their partial results in the report alone.
pub async fn persist_report<S: ResultSink>(
    sink: &S,
    report: &RunReport,
    category: &str,
    chunk_size: usize,
) -> Option<PersistSummary> {
    if report.state != RunState::Completed {
        tracing::warn!(
            "⚠️ Run ended {:?}, keeping {} partial results out of storage",
            report.state,
            report.results.len()
        );
        return None;
    }
    Some(persist_results(sink, &report.results, category, chunk_size).await)
}
