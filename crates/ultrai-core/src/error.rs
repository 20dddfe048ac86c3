use thiserror::Error;
use ultrai_store::StoreError;

/// Engine failure taxonomy. Per-slot failures inside a round never surface
/// here; they become error records. Everything below is terminal for the
/// run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("system readiness check failed: {0}")]
    SystemReadiness(String),

    #[error("invalid user input: {0}")]
    UserInput(String),

    #[error("activation failed: {0}")]
    ActiveLlm(String),

    #[error("INITIAL round failed: {0}")]
    InitialRound(String),

    #[error("META round failed: {0}")]
    MetaRound(String),

    #[error("ULTRAI synthesis failed: {0}")]
    UltraiSynthesis(String),

    #[error("artifact store: {0}")]
    Artifact(#[source] StoreError),

    #[error("bad run id: {0:?}")]
    BadRunId(String),

    #[error("run cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable error name recorded in `status.json`.
    pub fn name(&self) -> &'static str {
        match self {
            EngineError::SystemReadiness(_) => "SystemReadinessError",
            EngineError::UserInput(_) => "UserInputError",
            EngineError::ActiveLlm(_) => "ActiveLLMError",
            EngineError::InitialRound(_) => "InitialRoundError",
            EngineError::MetaRound(_) => "MetaRoundError",
            EngineError::UltraiSynthesis(_) => "UltrAISynthesisError",
            EngineError::Artifact(_) => "ArtifactError",
            EngineError::BadRunId(_) => "BadRunID",
            EngineError::Cancelled => "Cancelled",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BadRunId(id) => EngineError::BadRunId(id),
            other => EngineError::Artifact(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_run_id_keeps_its_identity_through_conversion() {
        let err: EngineError = StoreError::BadRunId("../etc".to_string()).into();
        assert!(matches!(err, EngineError::BadRunId(_)));
        assert_eq!(err.name(), "BadRunID");
    }

    #[test]
    fn error_names_are_stable() {
        assert_eq!(
            EngineError::ActiveLlm(String::new()).name(),
            "ActiveLLMError"
        );
        assert_eq!(
            EngineError::UltraiSynthesis(String::new()).name(),
            "UltrAISynthesisError"
        );
        assert_eq!(EngineError::Cancelled.name(), "Cancelled");
    }
}
