mod artifacts;
mod progress;
mod run;

pub use artifacts::{
    ActivationPlan, ActivationSlot, ArtifactCheck, ArtifactMeta, ArtifactState, DeliveryManifest,
    DeliveryMeta, ReadyArtifact, RoundDetails, RoundStats, RoundStatus, RoundStatusKind,
    RunInputs, SlotReason, StatsArtifact, SynthesisDetails, SynthesisStatus, TimingBudgets,
    UltraRecord, UltraRoundStats, UltraStats, ARTIFACT_ACTIVATE, ARTIFACT_DELIVERY,
    ARTIFACT_INITIAL, ARTIFACT_INITIAL_STATUS, ARTIFACT_INPUTS, ARTIFACT_META,
    ARTIFACT_META_STATUS, ARTIFACT_READY, ARTIFACT_STATS, ARTIFACT_STATUS, ARTIFACT_ULTRAI,
    ARTIFACT_ULTRAI_STATUS, KNOWN_ARTIFACTS, REQUIRED_ARTIFACTS,
};
pub use progress::{ProgressStep, RunPhase, StatusFile, StepStatus};
pub use run::{is_valid_run_id, ModelResponse, Round, RunId};
