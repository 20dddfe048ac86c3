use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::Round;

pub const ARTIFACT_READY: &str = "00_ready.json";
pub const ARTIFACT_INPUTS: &str = "01_inputs.json";
pub const ARTIFACT_ACTIVATE: &str = "02_activate.json";
pub const ARTIFACT_INITIAL: &str = "03_initial.json";
pub const ARTIFACT_INITIAL_STATUS: &str = "03_initial_status.json";
pub const ARTIFACT_META: &str = "04_meta.json";
pub const ARTIFACT_META_STATUS: &str = "04_meta_status.json";
pub const ARTIFACT_ULTRAI: &str = "05_ultrai.json";
pub const ARTIFACT_ULTRAI_STATUS: &str = "05_ultrai_status.json";
pub const ARTIFACT_STATS: &str = "stats.json";
pub const ARTIFACT_DELIVERY: &str = "delivery.json";
pub const ARTIFACT_STATUS: &str = "status.json";

/// Artifacts the delivery auditor requires before declaring a run complete.
pub const REQUIRED_ARTIFACTS: &[&str] = &[
    ARTIFACT_READY,
    ARTIFACT_INPUTS,
    ARTIFACT_ACTIVATE,
    ARTIFACT_INITIAL,
    ARTIFACT_INITIAL_STATUS,
    ARTIFACT_META,
    ARTIFACT_META_STATUS,
    ARTIFACT_ULTRAI,
    ARTIFACT_ULTRAI_STATUS,
    ARTIFACT_STATS,
];

/// Every filename a run directory may legitimately contain.
pub const KNOWN_ARTIFACTS: &[&str] = &[
    ARTIFACT_READY,
    ARTIFACT_INPUTS,
    ARTIFACT_ACTIVATE,
    ARTIFACT_INITIAL,
    ARTIFACT_INITIAL_STATUS,
    ARTIFACT_META,
    ARTIFACT_META_STATUS,
    ARTIFACT_ULTRAI,
    ARTIFACT_ULTRAI_STATUS,
    ARTIFACT_STATS,
    ARTIFACT_DELIVERY,
    ARTIFACT_STATUS,
];

/// `00_ready.json` — the model IDs upstream reported serviceable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyArtifact {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "readyList")]
    pub ready_list: Vec<String>,
}

/// `01_inputs.json` — normalized user inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInputs {
    #[serde(rename = "QUERY")]
    pub query: String,
    #[serde(rename = "ANALYSIS")]
    pub analysis: String,
    #[serde(rename = "COCKTAIL")]
    pub cocktail: String,
    #[serde(rename = "ADDONS")]
    pub addons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotReason {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "FALLBACK_ONLY")]
    FallbackOnly,
    #[serde(rename = "NOT_READY")]
    NotReady,
}

/// One executable position in a round: a primary model and its sole backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationSlot {
    pub primary: String,
    pub fallback: String,
    pub reason: SlotReason,
}

/// `02_activate.json` — the executable plan derived from READY ∩ cocktail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationPlan {
    #[serde(rename = "activeList")]
    pub active_list: Vec<String>,
    #[serde(rename = "backupList")]
    pub backup_list: Vec<String>,
    pub quorum: usize,
    pub reasons: BTreeMap<String, SlotReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundStatusKind {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "DEGRADED")]
    Degraded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimingBudgets {
    pub primary_timeout_s: u64,
    pub primary_attempts: u32,
    pub fallback_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundDetails {
    pub count: usize,
    pub concurrency: usize,
    pub timing_budgets: TimingBudgets,
    pub failed_models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMeta {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: String,
}

/// `03_initial_status.json` / `04_meta_status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundStatus {
    pub status: RoundStatusKind,
    pub round: Round,
    pub details: RoundDetails,
    pub metadata: ArtifactMeta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UltraStats {
    pub active_count: usize,
    pub meta_count: usize,
}

/// `05_ultrai.json` — the single R3 synthesis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltraRecord {
    pub round: Round,
    pub model: String,
    #[serde(rename = "neutralChosen")]
    pub neutral_chosen: String,
    pub text: String,
    pub ms: u64,
    pub stats: UltraStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisDetails {
    pub timeout_s: u64,
    pub max_chars_per_draft: usize,
    pub peer_context_chars: usize,
    pub draft_count: usize,
}

/// `05_ultrai_status.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisStatus {
    pub status: RoundStatusKind,
    pub round: Round,
    pub details: SynthesisDetails,
    pub metadata: ArtifactMeta,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RoundStats {
    pub count: usize,
    pub avg_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UltraRoundStats {
    pub count: usize,
    pub ms: u64,
}

/// `stats.json` — per-round counts and latencies over non-error records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsArtifact {
    #[serde(rename = "INITIAL")]
    pub initial: RoundStats,
    #[serde(rename = "META")]
    pub meta: RoundStats,
    #[serde(rename = "ULTRAI")]
    pub ultrai: UltraRoundStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactState {
    Ready,
    Missing,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactCheck {
    pub name: String,
    pub status: ArtifactState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMeta {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub total_artifacts: usize,
}

/// `delivery.json` — the final audit over required artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryManifest {
    pub status: String,
    pub message: String,
    pub artifacts: Vec<ArtifactCheck>,
    pub missing_required: Vec<String>,
    pub metadata: DeliveryMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_prefixes_are_strictly_ascending() {
        let numbered: Vec<&str> = REQUIRED_ARTIFACTS
            .iter()
            .copied()
            .filter(|name| name.as_bytes()[0].is_ascii_digit())
            .collect();
        let mut sorted = numbered.clone();
        sorted.sort();
        assert_eq!(numbered, sorted);
    }

    #[test]
    fn required_artifacts_are_known() {
        for name in REQUIRED_ARTIFACTS {
            assert!(KNOWN_ARTIFACTS.contains(name));
        }
        assert!(KNOWN_ARTIFACTS.contains(&ARTIFACT_DELIVERY));
        assert!(KNOWN_ARTIFACTS.contains(&ARTIFACT_STATUS));
    }

    #[test]
    fn inputs_serialize_with_uppercase_keys() {
        let inputs = RunInputs {
            query: "q".to_string(),
            analysis: "Synthesis".to_string(),
            cocktail: "SPEEDY".to_string(),
            addons: vec![],
        };
        let value = serde_json::to_value(&inputs).unwrap();
        assert!(value.get("QUERY").is_some());
        assert!(value.get("ADDONS").is_some());
        assert_eq!(value["ANALYSIS"], "Synthesis");
    }

    #[test]
    fn ultra_record_uses_neutral_chosen_key() {
        let record = UltraRecord {
            round: Round::Ultrai,
            model: "gpt-4o".to_string(),
            neutral_chosen: "gpt-4o".to_string(),
            text: "synthesis".to_string(),
            ms: 10,
            stats: UltraStats {
                active_count: 3,
                meta_count: 3,
            },
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["neutralChosen"], "gpt-4o");
        assert_eq!(value["round"], "ULTRAI");
    }
}
