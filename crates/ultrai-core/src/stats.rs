use tracing::debug;

use ultrai_store::ArtifactStore;
use ultrai_types::{
    ModelResponse, RoundStats, StatsArtifact, UltraRecord, UltraRoundStats, ARTIFACT_INITIAL,
    ARTIFACT_META, ARTIFACT_ULTRAI,
};

/// Reads the round artifacts back and reduces them to per-round counts and
/// average latencies. Missing or unreadable inputs produce zeros; statistics
/// never fail a run.
pub async fn aggregate(store: &ArtifactStore, run_id: &str) -> StatsArtifact {
    let initial = read_records(store, run_id, ARTIFACT_INITIAL).await;
    let meta = read_records(store, run_id, ARTIFACT_META).await;
    let ultra: Option<UltraRecord> = store.read_typed(run_id, ARTIFACT_ULTRAI).await.ok();

    StatsArtifact {
        initial: round_stats(&initial),
        meta: round_stats(&meta),
        ultrai: ultra
            .map(|record| UltraRoundStats {
                count: 1,
                ms: record.ms,
            })
            .unwrap_or_default(),
    }
}

async fn read_records(store: &ArtifactStore, run_id: &str, name: &str) -> Vec<ModelResponse> {
    match store.read_typed::<Vec<ModelResponse>>(run_id, name).await {
        Ok(records) => records,
        Err(err) => {
            debug!(run_id, artifact = name, error = %err, "round artifact unavailable for stats");
            Vec::new()
        }
    }
}

fn round_stats(records: &[ModelResponse]) -> RoundStats {
    let ok: Vec<&ModelResponse> = records.iter().filter(|r| !r.error).collect();
    if ok.is_empty() {
        return RoundStats::default();
    }
    let total_ms: u64 = ok.iter().map(|r| r.ms).sum();
    RoundStats {
        count: ok.len(),
        avg_ms: total_ms / ok.len() as u64,
    }
}
