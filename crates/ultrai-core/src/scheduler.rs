use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ultrai_gateway::{ChatMessage, Gateway};
use ultrai_types::{
    ActivationSlot, ArtifactMeta, ModelResponse, Round, RoundDetails, RoundStatus,
    RoundStatusKind, TimingBudgets,
};

use crate::activation::QUORUM;
use crate::error::EngineError;

pub const PRIMARY_ATTEMPTS: u32 = 2;
pub const PRIMARY_TIMEOUT: Duration = Duration::from_secs(15);
pub const FALLBACK_ATTEMPTS: u32 = 1;

const SLOT_BACKOFF_BASE_MS: u64 = 500;
const SLOT_BACKOFF_CAP_MS: u64 = 4_000;

/// Builds the messages for one slot. Injected so the scheduler stays
/// round-agnostic.
pub type PromptBuilder = Arc<dyn Fn(&ActivationSlot) -> Vec<ChatMessage> + Send + Sync>;

/// Invoked once per slot with its final record; wired to the progress board.
pub type SlotObserver = Arc<dyn Fn(&ActivationSlot, &ModelResponse) + Send + Sync>;

#[derive(Debug)]
pub struct RoundOutput {
    /// One record per slot, in slot order regardless of completion order.
    pub records: Vec<ModelResponse>,
    pub status: RoundStatus,
    /// Models whose final attempt failed this round.
    pub failed_models: Vec<String>,
}

pub struct RoundScheduler {
    gateway: Arc<dyn Gateway>,
}

impl RoundScheduler {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Fans the slots out under a counting semaphore and gathers records
    /// keyed by slot index. Per-slot failures become error records; the
    /// round as a whole fails only when the non-error count drops below
    /// quorum.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_round(
        &self,
        run_id: &str,
        round: Round,
        slots: &[ActivationSlot],
        prompt_builder: PromptBuilder,
        concurrency: usize,
        per_call_budget: Duration,
        cancel: CancellationToken,
        observer: Option<SlotObserver>,
    ) -> Result<RoundOutput, EngineError> {
        if slots.is_empty() {
            return Err(round_error(round, "no executable slots".to_string()));
        }

        let effective = concurrency.clamp(1, 50).min(slots.len());
        let semaphore = Arc::new(Semaphore::new(effective));
        debug!(run_id, round = %round, slots = slots.len(), concurrency = effective, "round fan-out");

        let mut handles = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().cloned().enumerate() {
            let gateway = self.gateway.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let prompt_builder = prompt_builder.clone();
            let observer = observer.clone();
            handles.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, (ModelResponse::failed(round, &slot.primary), Vec::new()));
                };
                let messages = prompt_builder(&slot);
                let outcome =
                    run_slot(gateway.as_ref(), round, &slot, &messages, per_call_budget, &cancel)
                        .await;
                if let Some(observer) = &observer {
                    observer(&slot, &outcome.0);
                }
                (index, outcome)
            }));
        }

        let mut records: Vec<Option<ModelResponse>> = vec![None; slots.len()];
        let mut failed_models: Vec<String> = Vec::new();
        for handle in handles {
            let (index, (record, slot_failed)) = handle
                .await
                .map_err(|err| round_error(round, format!("slot task panicked: {err}")))?;
            for model in slot_failed {
                if !failed_models.contains(&model) {
                    failed_models.push(model);
                }
            }
            records[index] = Some(record);
        }

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let records: Vec<ModelResponse> = records.into_iter().flatten().collect();
        let non_error = records.iter().filter(|r| !r.error).count();
        if non_error < QUORUM {
            return Err(round_error(
                round,
                format!("only {non_error} non-error record(s); quorum is {QUORUM}"),
            ));
        }

        let kind = if records.iter().any(|r| r.error) {
            RoundStatusKind::Degraded
        } else {
            RoundStatusKind::Completed
        };
        let status = RoundStatus {
            status: kind,
            round,
            details: RoundDetails {
                count: records.len(),
                concurrency: effective,
                timing_budgets: TimingBudgets {
                    primary_timeout_s: per_call_budget.as_secs(),
                    primary_attempts: PRIMARY_ATTEMPTS,
                    fallback_attempts: FALLBACK_ATTEMPTS,
                },
                failed_models: failed_models.clone(),
            },
            metadata: ArtifactMeta {
                run_id: run_id.to_string(),
                timestamp: Utc::now(),
                phase: round.as_str().to_string(),
            },
        };

        Ok(RoundOutput {
            records,
            status,
            failed_models,
        })
    }
}

/// Primary-then-fallback chain for one slot. Returns the slot's record plus
/// the models that failed their final attempt along the way.
async fn run_slot(
    gateway: &dyn Gateway,
    round: Round,
    slot: &ActivationSlot,
    messages: &[ChatMessage],
    budget: Duration,
    cancel: &CancellationToken,
) -> (ModelResponse, Vec<String>) {
    let mut failed: Vec<String> = Vec::new();

    if cancel.is_cancelled() {
        return (ModelResponse::failed(round, &slot.primary), failed);
    }

    let mut attempt = 0;
    while attempt < PRIMARY_ATTEMPTS {
        attempt += 1;
        match gateway.call(&slot.primary, messages, budget).await {
            Ok(completion) => {
                return (
                    ModelResponse::ok(round, &slot.primary, completion.text, completion.ms),
                    failed,
                );
            }
            Err(err) => {
                warn!(model = %slot.primary, attempt, error = %err, "primary attempt failed");
                // Rate limits skip the remaining primary budget and go
                // straight to the fallback.
                if err.is_rate_limit() || cancel.is_cancelled() {
                    break;
                }
                if attempt < PRIMARY_ATTEMPTS {
                    tokio::time::sleep(slot_backoff(attempt)).await;
                }
            }
        }
    }

    // A FALLBACK_ONLY slot carries the same model in both positions; extra
    // attempts of it are not a distinct model failure.
    if slot.primary != slot.fallback {
        failed.push(slot.primary.clone());
    }

    if !cancel.is_cancelled() {
        match gateway.call(&slot.fallback, messages, budget).await {
            Ok(completion) => {
                let record =
                    ModelResponse::ok(round, &slot.fallback, completion.text, completion.ms)
                        .with_failed_models(failed.clone());
                return (record, failed);
            }
            Err(err) => {
                warn!(model = %slot.fallback, error = %err, "fallback attempt failed");
            }
        }
    }

    if !failed.contains(&slot.fallback) {
        failed.push(slot.fallback.clone());
    }
    let record = ModelResponse::failed(round, &slot.primary).with_failed_models(failed.clone());
    (record, failed)
}

fn slot_backoff(attempt: u32) -> Duration {
    let exp = SLOT_BACKOFF_BASE_MS.saturating_mul(1 << attempt.saturating_sub(1));
    Duration::from_millis(exp.min(SLOT_BACKOFF_CAP_MS))
}

fn round_error(round: Round, message: String) -> EngineError {
    match round {
        Round::Initial => EngineError::InitialRound(message),
        Round::Meta => EngineError::MetaRound(message),
        Round::Ultrai => EngineError::UltraiSynthesis(message),
    }
}
