use serde::{Deserialize, Serialize};

/// Step lifecycle. Transitions are one-way: PENDING → IN_PROGRESS →
/// COMPLETED | FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::InProgress => 1,
            StepStatus::Completed | StepStatus::Failed => 2,
        }
    }

    /// Status updates to a step are monotonic; a terminal status never
    /// reverts.
    pub fn can_advance_to(self, next: Self) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub text: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl ProgressStep {
    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: StepStatus::Pending,
            time: None,
            progress: None,
        }
    }
}

/// The run state machine. Transitions are one-way and strictly sequential;
/// any stage error exits to a terminal FAILED(<stage>) recorded in
/// `status.json` rather than as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "READY_OK")]
    ReadyOk,
    #[serde(rename = "INPUTS_OK")]
    InputsOk,
    #[serde(rename = "ACTIVATED")]
    Activated,
    #[serde(rename = "R1_DONE")]
    R1Done,
    #[serde(rename = "R2_DONE")]
    R2Done,
    #[serde(rename = "R3_DONE")]
    R3Done,
    #[serde(rename = "STATS_DONE")]
    StatsDone,
    #[serde(rename = "DELIVERED")]
    Delivered,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Created => "CREATED",
            RunPhase::ReadyOk => "READY_OK",
            RunPhase::InputsOk => "INPUTS_OK",
            RunPhase::Activated => "ACTIVATED",
            RunPhase::R1Done => "R1_DONE",
            RunPhase::R2Done => "R2_DONE",
            RunPhase::R3Done => "R3_DONE",
            RunPhase::StatsDone => "STATS_DONE",
            RunPhase::Delivered => "DELIVERED",
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            RunPhase::Created => Some(RunPhase::ReadyOk),
            RunPhase::ReadyOk => Some(RunPhase::InputsOk),
            RunPhase::InputsOk => Some(RunPhase::Activated),
            RunPhase::Activated => Some(RunPhase::R1Done),
            RunPhase::R1Done => Some(RunPhase::R2Done),
            RunPhase::R2Done => Some(RunPhase::R3Done),
            RunPhase::R3Done => Some(RunPhase::StatsDone),
            RunPhase::StatsDone => Some(RunPhase::Delivered),
            RunPhase::Delivered => None,
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.next() == Some(next)
    }

    pub fn is_terminal(self) -> bool {
        self == RunPhase::Delivered
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `status.json` — the only mutable artifact; whole-file last-writer-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFile {
    pub run_id: String,
    pub current_phase: String,
    pub completed: bool,
    pub progress: u8,
    pub steps: Vec<ProgressStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
