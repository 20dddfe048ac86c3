use chrono::Utc;
use tracing::warn;

use ultrai_store::{ArtifactStore, StoreError};
use ultrai_types::{
    ArtifactCheck, ArtifactState, DeliveryManifest, DeliveryMeta, REQUIRED_ARTIFACTS,
};

/// Verifies that every required artifact exists and parses, and compiles the
/// delivery manifest. `COMPLETED` only when nothing is missing and nothing is
/// corrupt.
pub async fn audit(store: &ArtifactStore, run_id: &str) -> DeliveryManifest {
    let mut artifacts = Vec::with_capacity(REQUIRED_ARTIFACTS.len());
    let mut missing_required = Vec::new();
    let mut corrupt = 0usize;

    for name in REQUIRED_ARTIFACTS {
        let state = match store.read(run_id, name).await {
            Ok(_) => ArtifactState::Ready,
            Err(StoreError::NotFound(_)) => {
                missing_required.push(name.to_string());
                ArtifactState::Missing
            }
            Err(err) => {
                warn!(run_id, artifact = name, error = %err, "artifact failed delivery audit");
                corrupt += 1;
                ArtifactState::Error
            }
        };
        artifacts.push(ArtifactCheck {
            name: name.to_string(),
            status: state,
        });
    }

    let ready = artifacts
        .iter()
        .filter(|check| check.status == ArtifactState::Ready)
        .count();
    let complete = missing_required.is_empty() && corrupt == 0;
    DeliveryManifest {
        status: if complete { "COMPLETED" } else { "INCOMPLETE" }.to_string(),
        message: if complete {
            format!("all {ready} required artifacts delivered")
        } else {
            format!(
                "{} missing, {} unreadable of {} required artifacts",
                missing_required.len(),
                corrupt,
                REQUIRED_ARTIFACTS.len()
            )
        },
        artifacts,
        missing_required,
        metadata: DeliveryMeta {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            total_artifacts: REQUIRED_ARTIFACTS.len(),
        },
    }
}
