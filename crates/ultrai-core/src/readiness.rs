use chrono::Utc;
use tracing::info;

use ultrai_gateway::Gateway;
use ultrai_types::ReadyArtifact;

use crate::error::EngineError;

/// Minimum upstream pluralism for a run to even start.
const MIN_READY_MODELS: usize = 2;

/// Probes the upstream model catalog and produces the `00_ready` artifact.
pub async fn probe_readiness(
    gateway: &dyn Gateway,
    run_id: &str,
) -> Result<ReadyArtifact, EngineError> {
    let ready_list = gateway
        .ready_models()
        .await
        .map_err(|err| EngineError::SystemReadiness(err.to_string()))?;

    if ready_list.len() < MIN_READY_MODELS {
        return Err(EngineError::SystemReadiness(format!(
            "upstream reports {} serviceable model(s); at least {MIN_READY_MODELS} required",
            ready_list.len()
        )));
    }

    info!(run_id, ready = ready_list.len(), "upstream readiness confirmed");
    Ok(ReadyArtifact {
        run_id: run_id.to_string(),
        timestamp: Utc::now(),
        ready_list,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGateway;

    #[tokio::test]
    async fn emits_ready_artifact_when_catalog_is_plural() {
        let gateway = ScriptedGateway::new(&["a", "b", "c"]);
        let artifact = probe_readiness(&gateway, "r1").await.expect("ready");
        assert_eq!(artifact.run_id, "r1");
        assert_eq!(artifact.ready_list, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn fails_when_fewer_than_two_models() {
        let gateway = ScriptedGateway::new(&["solo"]);
        let err = probe_readiness(&gateway, "r1").await.unwrap_err();
        assert!(matches!(err, EngineError::SystemReadiness(_)));
    }

    #[tokio::test]
    async fn maps_gateway_failure_to_readiness_error() {
        let gateway = ScriptedGateway::unreachable();
        let err = probe_readiness(&gateway, "r1").await.unwrap_err();
        assert!(matches!(err, EngineError::SystemReadiness(_)));
    }
}
