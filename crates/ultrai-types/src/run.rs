use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The three rounds of a synthesis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Round {
    #[serde(rename = "INITIAL")]
    Initial,
    #[serde(rename = "META")]
    Meta,
    #[serde(rename = "ULTRAI")]
    Ultrai,
}

impl Round {
    pub fn as_str(self) -> &'static str {
        match self {
            Round::Initial => "INITIAL",
            Round::Meta => "META",
            Round::Ultrai => "ULTRAI",
        }
    }
}

impl std::fmt::Display for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One model's contribution to an INITIAL or META round.
///
/// `ms` is the wall clock of the successful attempt only; failed attempts of
/// the same slot do not count. `failed_models` lists the model IDs that were
/// tried and failed before this record was produced (the primary, when a
/// fallback answered).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub round: Round,
    pub model: String,
    pub text: String,
    pub ms: u64,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_models: Option<Vec<String>>,
}

impl ModelResponse {
    pub fn ok(round: Round, model: impl Into<String>, text: impl Into<String>, ms: u64) -> Self {
        Self {
            round,
            model: model.into(),
            text: text.into(),
            ms,
            error: false,
            failed_models: None,
        }
    }

    pub fn failed(round: Round, model: impl Into<String>) -> Self {
        Self {
            round,
            model: model.into(),
            text: String::new(),
            ms: 0,
            error: true,
            failed_models: None,
        }
    }

    pub fn with_failed_models(mut self, failed: Vec<String>) -> Self {
        if !failed.is_empty() {
            self.failed_models = Some(failed);
        }
        self
    }
}

/// Run IDs are URL-safe and double as directory names under the runs root.
pub fn is_valid_run_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validated run identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn parse(candidate: &str) -> Option<Self> {
        is_valid_run_id(candidate).then(|| Self(candidate.to_string()))
    }

    /// Timestamp policy for CLI-started runs.
    pub fn cli_now() -> Self {
        Self(Utc::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Prefix policy for API-started runs.
    pub fn api_now(cocktail: &str) -> Self {
        let tag: String = cocktail
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let tag = if tag.is_empty() {
            "unknown".to_string()
        } else {
            tag
        };
        Self(format!(
            "api_{}_{}",
            tag,
            Utc::now().format("%Y%m%d_%H%M%S")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
