use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ultrai_gateway::Gateway;
use ultrai_types::{
    ArtifactMeta, ModelResponse, Round, RoundStatusKind, SynthesisDetails, SynthesisStatus,
    UltraRecord, UltraStats,
};

use crate::error::EngineError;
use crate::policy::{max_chars_per_draft, synthesis_timeout};
use crate::prompts::ultra_messages;

/// Neutral-model preference order for R3. Matching is on the model ID or its
/// provider-stripped tail, so `openai/gpt-4o` satisfies `gpt-4o`.
pub const NEUTRAL_PREFERENCE: [&str; 4] = [
    "claude-3.7-sonnet",
    "gpt-4o",
    "gemini-2.0-flash-thinking",
    "llama-3.3-70b",
];

fn matches_preference(preference: &str, model_id: &str) -> bool {
    model_id == preference || model_id.rsplit('/').next() == Some(preference)
}

/// First preferred model that produced a META draft; if none of the
/// preference list did, the first draft-producing model. Never an error —
/// missing preferences degrade, they do not fail.
pub fn choose_neutral(meta_models: &[String]) -> Option<String> {
    for preference in NEUTRAL_PREFERENCE {
        if let Some(found) = meta_models
            .iter()
            .find(|model| matches_preference(preference, model))
        {
            return Some(found.clone());
        }
    }
    meta_models.first().cloned()
}

#[derive(Debug)]
pub struct SynthesisOutcome {
    pub record: UltraRecord,
    pub status: SynthesisStatus,
}

/// Single R3 call: picks the neutral model, sizes the timeout and per-draft
/// truncation from the META context, and merges the drafts. Any upstream
/// failure here is terminal for the run.
pub async fn synthesize(
    gateway: &dyn Gateway,
    run_id: &str,
    query: &str,
    meta_records: &[ModelResponse],
    active_count: usize,
    cancel: &CancellationToken,
) -> Result<SynthesisOutcome, EngineError> {
    let drafts: Vec<&ModelResponse> = meta_records.iter().filter(|r| !r.error).collect();
    if drafts.is_empty() {
        return Err(EngineError::UltraiSynthesis(
            "no META drafts to synthesize".to_string(),
        ));
    }

    let peer_context_chars: usize = drafts.iter().map(|r| r.text.chars().count()).sum();
    let timeout_s = synthesis_timeout(peer_context_chars, drafts.len());
    let max_chars = max_chars_per_draft(timeout_s);

    let meta_models: Vec<String> = drafts.iter().map(|r| r.model.clone()).collect();
    let neutral = choose_neutral(&meta_models)
        .ok_or_else(|| EngineError::UltraiSynthesis("no META drafts to synthesize".to_string()))?;
    if !NEUTRAL_PREFERENCE
        .iter()
        .any(|preference| matches_preference(preference, &neutral))
    {
        warn!(run_id, model = %neutral, "no preferred neutral available; degrading to first META model");
    }

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let messages = ultra_messages(query, meta_records, max_chars);
    info!(run_id, model = %neutral, timeout_s, drafts = drafts.len(), "starting ULTRA synthesis");
    let completion = gateway
        .call(&neutral, &messages, Duration::from_secs(timeout_s))
        .await
        .map_err(|err| EngineError::UltraiSynthesis(err.to_string()))?;

    let record = UltraRecord {
        round: Round::Ultrai,
        model: neutral.clone(),
        neutral_chosen: neutral,
        text: completion.text,
        ms: completion.ms,
        stats: UltraStats {
            active_count,
            meta_count: drafts.len(),
        },
    };
    let status = SynthesisStatus {
        status: RoundStatusKind::Completed,
        round: Round::Ultrai,
        details: SynthesisDetails {
            timeout_s,
            max_chars_per_draft: max_chars,
            peer_context_chars,
            draft_count: drafts.len(),
        },
        metadata: ArtifactMeta {
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            phase: Round::Ultrai.as_str().to_string(),
        },
    };
    Ok(SynthesisOutcome { record, status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedGateway, ScriptedReply};

    fn models(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn draft(model: &str, text: &str) -> ModelResponse {
        ModelResponse::ok(Round::Meta, model, text, 11)
    }

    #[test]
    fn preference_order_decides_the_neutral() {
        let meta = models(&["meta-llama/llama-3.3-70b", "openai/gpt-4o"]);
        assert_eq!(choose_neutral(&meta).as_deref(), Some("openai/gpt-4o"));

        let meta = models(&["openai/gpt-4o", "anthropic/claude-3.7-sonnet"]);
        assert_eq!(
            choose_neutral(&meta).as_deref(),
            Some("anthropic/claude-3.7-sonnet")
        );
    }

    #[test]
    fn unpreferred_pool_degrades_to_first_meta_model() {
        let meta = models(&["mistralai/mistral-small", "openai/gpt-3.5-turbo"]);
        assert_eq!(
            choose_neutral(&meta).as_deref(),
            Some("mistralai/mistral-small")
        );
        assert_eq!(choose_neutral(&[]), None);
    }

    #[test]
    fn preference_does_not_prefix_match_different_models() {
        // gpt-4o-mini is not gpt-4o
        let meta = models(&["openai/gpt-4o-mini", "meta-llama/llama-3.3-70b"]);
        assert_eq!(
            choose_neutral(&meta).as_deref(),
            Some("meta-llama/llama-3.3-70b")
        );
    }

    #[tokio::test]
    async fn synthesis_record_is_consistent_with_its_status() {
        let gateway = ScriptedGateway::new(&[]);
        let records = vec![draft("openai/gpt-4o", "alpha"), draft("x/y", "beta")];
        let outcome = synthesize(
            &gateway,
            "r1",
            "the query",
            &records,
            3,
            &CancellationToken::new(),
        )
        .await
        .expect("synthesis");
        assert_eq!(outcome.record.model, outcome.record.neutral_chosen);
        assert_eq!(outcome.record.model, "openai/gpt-4o");
        assert_eq!(outcome.record.stats.meta_count, 2);
        assert_eq!(outcome.record.stats.active_count, 3);
        assert_eq!(outcome.status.details.draft_count, 2);
        assert_eq!(outcome.status.details.timeout_s, 60);
        assert_eq!(outcome.status.details.max_chars_per_draft, 500);
    }

    #[tokio::test]
    async fn large_peer_context_with_four_drafts_stretches_the_budget() {
        let gateway = ScriptedGateway::new(&[]);
        let chunk = "x".repeat(1_600);
        let records = vec![
            draft("a/one", &chunk),
            draft("b/two", &chunk),
            draft("c/three", &chunk),
            draft("d/four", &chunk),
        ];
        let outcome = synthesize(
            &gateway,
            "r1",
            "q",
            &records,
            4,
            &CancellationToken::new(),
        )
        .await
        .expect("synthesis");
        // 180 × 1.2 over the >5000-char band
        assert_eq!(outcome.status.details.timeout_s, 216);
        assert_eq!(outcome.status.details.max_chars_per_draft, 2_000);
    }

    #[tokio::test]
    async fn error_drafts_are_not_counted() {
        let gateway = ScriptedGateway::new(&[]);
        let records = vec![
            draft("a/one", "fine"),
            ModelResponse::failed(Round::Meta, "b/two"),
        ];
        let outcome = synthesize(
            &gateway,
            "r1",
            "q",
            &records,
            2,
            &CancellationToken::new(),
        )
        .await
        .expect("synthesis");
        assert_eq!(outcome.record.stats.meta_count, 1);
        assert_eq!(outcome.record.neutral_chosen, "a/one");
    }

    #[tokio::test]
    async fn upstream_failure_is_terminal() {
        let gateway = ScriptedGateway::new(&[]);
        gateway.script("a/one", ScriptedReply::MidStream);
        let records = vec![draft("a/one", "fine"), draft("b/two", "also fine")];
        let err = synthesize(
            &gateway,
            "r1",
            "q",
            &records,
            2,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::UltraiSynthesis(_)));
    }

    #[tokio::test]
    async fn empty_meta_set_is_rejected() {
        let gateway = ScriptedGateway::new(&[]);
        let err = synthesize(&gateway, "r1", "q", &[], 0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UltraiSynthesis(_)));
    }
}
