use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use ultrai_gateway::Gateway;
use ultrai_observability::{emit_event, redact_text, ProcessKind, RunEvent};
use ultrai_store::ArtifactStore;
use ultrai_types::{
    ActivationSlot, Round, RoundStatusKind, RunId, RunPhase, SlotReason, StatusFile,
    ARTIFACT_ACTIVATE, ARTIFACT_DELIVERY, ARTIFACT_INITIAL, ARTIFACT_INITIAL_STATUS,
    ARTIFACT_INPUTS, ARTIFACT_META, ARTIFACT_META_STATUS, ARTIFACT_READY, ARTIFACT_STATS,
    ARTIFACT_STATUS, ARTIFACT_ULTRAI, ARTIFACT_ULTRAI_STATUS,
};

use crate::activation::plan_activation;
use crate::cocktails::cocktail;
use crate::error::EngineError;
use crate::inputs::{validate_inputs, ANALYSIS_SYNTHESIS};
use crate::policy::concurrency_limit;
use crate::progress::ProgressBoard;
use crate::prompts::{initial_messages, meta_messages, peers_block};
use crate::readiness::probe_readiness;
use crate::scheduler::{PromptBuilder, RoundScheduler, SlotObserver, PRIMARY_TIMEOUT};
use crate::stats::aggregate;
use crate::synthesizer::synthesize;

pub const STEP_INIT: &str = "System initialization";
pub const STEP_READY: &str = "System readiness check";
pub const STEP_INPUTS: &str = "Input validation";
pub const STEP_ACTIVATE: &str = "Model activation";
pub const STEP_ULTRA: &str = "ULTRA synthesis (R3)";
pub const STEP_STATS: &str = "Statistics";
pub const STEP_DELIVERY: &str = "Delivery audit";

fn r1_step(model: &str) -> String {
    format!("R1 ← {model}")
}

fn r2_step(model: &str) -> String {
    format!("R2 ← {model}")
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub query: String,
    pub cocktail: String,
}

/// Live handle to a run: its cancellation token, progress board, and the
/// lock serializing `status.json` writers.
#[derive(Clone)]
pub struct RunHandle {
    pub run_id: RunId,
    pub cancel: CancellationToken,
    pub board: Arc<ProgressBoard>,
    status_lock: Arc<Mutex<()>>,
}

struct StageFailure {
    stage: &'static str,
    error: EngineError,
}

fn fail(stage: &'static str) -> impl FnOnce(EngineError) -> StageFailure {
    move |error| StageFailure { stage, error }
}

/// Owns the run state machine: creates the run directory, sequences the
/// stages in fixed order, commits each stage's artifacts before the next
/// begins, and converts stage errors into a terminal FAILED status.
pub struct Coordinator {
    store: ArtifactStore,
    gateway: Arc<dyn Gateway>,
}

impl Coordinator {
    pub fn new(store: ArtifactStore, gateway: Arc<dyn Gateway>) -> Self {
        Self { store, gateway }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Creates the run directory and the initial `status.json`. The status
    /// endpoint serves a well-formed record from this moment on, before any
    /// stage has started.
    pub async fn prepare_run(&self, request: &RunRequest) -> Result<RunHandle, EngineError> {
        self.store.create_run_dir(request.run_id.as_str()).await?;
        let board = Arc::new(ProgressBoard::new(&[
            STEP_INIT,
            STEP_READY,
            STEP_INPUTS,
            STEP_ACTIVATE,
            STEP_ULTRA,
            STEP_STATS,
            STEP_DELIVERY,
        ]));
        board.complete(STEP_INIT, None);
        let handle = RunHandle {
            run_id: request.run_id.clone(),
            cancel: CancellationToken::new(),
            board,
            status_lock: Arc::new(Mutex::new(())),
        };
        self.write_status(&handle, RunPhase::Created.as_str(), false, None)
            .await?;
        info!(
            run_id = %request.run_id,
            cocktail = %request.cocktail,
            query = %redact_text(&request.query),
            "run created"
        );
        Ok(handle)
    }

    /// Drives the run to a terminal state. The terminal `status.json` is
    /// always written, for DELIVERED and FAILED alike.
    pub async fn execute(
        &self,
        request: &RunRequest,
        handle: &RunHandle,
    ) -> Result<(), EngineError> {
        match self.run_stages(request, handle).await {
            Ok(()) => {
                emit_event(
                    Level::INFO,
                    ProcessKind::Engine,
                    RunEvent {
                        event: "run_delivered",
                        component: "coordinator",
                        run_id: Some(handle.run_id.as_str()),
                        phase: Some(RunPhase::Delivered.as_str()),
                        round: None,
                        model: None,
                        status: Some("COMPLETED"),
                        error_code: None,
                        detail: None,
                    },
                );
                Ok(())
            }
            Err(failure) => {
                handle.board.fail_in_progress();
                let stage = if matches!(failure.error, EngineError::Cancelled) {
                    "cancelled"
                } else {
                    failure.stage
                };
                let phase_label = format!("FAILED({stage})");
                let message = format!("{}: {}", failure.error.name(), failure.error);
                emit_event(
                    Level::ERROR,
                    ProcessKind::Engine,
                    RunEvent {
                        event: "run_failed",
                        component: "coordinator",
                        run_id: Some(handle.run_id.as_str()),
                        phase: Some(phase_label.as_str()),
                        round: None,
                        model: None,
                        status: Some("FAILED"),
                        error_code: Some(failure.error.name()),
                        detail: Some(message.as_str()),
                    },
                );
                if let Err(status_err) = self
                    .write_status(handle, &phase_label, true, Some(message))
                    .await
                {
                    warn!(run_id = %handle.run_id, error = %status_err, "failed to record terminal status");
                }
                Err(failure.error)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        handle: &RunHandle,
    ) -> Result<(), StageFailure> {
        let run_id = handle.run_id.as_str();
        let board = &handle.board;
        let cancel = &handle.cancel;
        let mut phase = RunPhase::Created;

        // Readiness probe.
        self.ensure_live(cancel, "readiness")?;
        board.start(STEP_READY);
        let ready = probe_readiness(self.gateway.as_ref(), run_id)
            .await
            .map_err(fail("readiness"))?;
        self.store
            .write(run_id, ARTIFACT_READY, &ready)
            .await
            .map_err(EngineError::from)
            .map_err(fail("readiness"))?;
        board.complete(STEP_READY, None);
        phase = self.advance(handle, phase, RunPhase::ReadyOk).await?;

        // Input validation.
        board.start(STEP_INPUTS);
        let inputs = validate_inputs(&request.query, &request.cocktail, ANALYSIS_SYNTHESIS, &[])
            .map_err(fail("inputs"))?;
        self.store
            .write(run_id, ARTIFACT_INPUTS, &inputs)
            .await
            .map_err(EngineError::from)
            .map_err(fail("inputs"))?;
        board.complete(STEP_INPUTS, None);
        phase = self.advance(handle, phase, RunPhase::InputsOk).await?;

        // Activation planning.
        board.start(STEP_ACTIVATE);
        let spec = cocktail(&inputs.cocktail)
            .ok_or_else(|| EngineError::UserInput(format!("unknown cocktail {}", inputs.cocktail)))
            .map_err(fail("activation"))?;
        let activation = plan_activation(&ready.ready_list, &spec).map_err(fail("activation"))?;
        self.store
            .write(run_id, ARTIFACT_ACTIVATE, &activation.plan)
            .await
            .map_err(EngineError::from)
            .map_err(fail("activation"))?;
        let r1_labels: Vec<String> = activation.slots.iter().map(|s| r1_step(&s.primary)).collect();
        board.insert_before(STEP_ULTRA, &r1_labels);
        board.complete(STEP_ACTIVATE, None);
        phase = self.advance(handle, phase, RunPhase::Activated).await?;

        // R1 — independent drafts.
        self.ensure_live(cancel, "initial")?;
        let scheduler = RoundScheduler::new(self.gateway.clone());
        let r1_query = inputs.query.clone();
        let r1_builder: PromptBuilder = Arc::new(move |_slot| initial_messages(&r1_query));
        let r1_concurrency = concurrency_limit(inputs.query.chars().count(), 0);
        let r1 = scheduler
            .run_round(
                run_id,
                Round::Initial,
                &activation.slots,
                r1_builder,
                r1_concurrency,
                PRIMARY_TIMEOUT,
                cancel.clone(),
                Some(slot_observer(board.clone(), Round::Initial)),
            )
            .await
            .map_err(fail("initial"))?;
        self.store
            .write(run_id, ARTIFACT_INITIAL, &r1.records)
            .await
            .map_err(EngineError::from)
            .map_err(fail("initial"))?;
        self.store
            .write(run_id, ARTIFACT_INITIAL_STATUS, &r1.status)
            .await
            .map_err(EngineError::from)
            .map_err(fail("initial"))?;
        phase = self.advance(handle, phase, RunPhase::R1Done).await?;

        // R2 — revision conditioned on peers. Models that failed R1 are
        // permanently excluded, both as participants and as quoted peers.
        self.ensure_live(cancel, "meta")?;
        let meta_slots: Vec<ActivationSlot> = r1
            .records
            .iter()
            .filter(|r| !r.error)
            .map(|r| ActivationSlot {
                primary: r.model.clone(),
                fallback: r.model.clone(),
                reason: SlotReason::Active,
            })
            .collect();
        let r2_labels: Vec<String> = meta_slots.iter().map(|s| r2_step(&s.primary)).collect();
        board.insert_before(STEP_ULTRA, &r2_labels);
        let r2_concurrency = concurrency_limit(peers_block(&r1.records).chars().count(), 0);
        let r2_query = inputs.query.clone();
        let r1_records = r1.records.clone();
        let r2_builder: PromptBuilder =
            Arc::new(move |_slot| meta_messages(&r2_query, &r1_records));
        let mut r2 = scheduler
            .run_round(
                run_id,
                Round::Meta,
                &meta_slots,
                r2_builder,
                r2_concurrency,
                PRIMARY_TIMEOUT,
                cancel.clone(),
                Some(slot_observer(board.clone(), Round::Meta)),
            )
            .await
            .map_err(fail("meta"))?;
        let lost_in_r1: Vec<String> = r1
            .records
            .iter()
            .filter(|r| r.error)
            .map(|r| r.model.clone())
            .collect();
        if !lost_in_r1.is_empty() {
            // A peer lost in R1 leaves R2 running below strength.
            r2.status.status = RoundStatusKind::Degraded;
            for model in lost_in_r1 {
                if !r2.status.details.failed_models.contains(&model) {
                    r2.status.details.failed_models.push(model);
                }
            }
        }
        self.store
            .write(run_id, ARTIFACT_META, &r2.records)
            .await
            .map_err(EngineError::from)
            .map_err(fail("meta"))?;
        self.store
            .write(run_id, ARTIFACT_META_STATUS, &r2.status)
            .await
            .map_err(EngineError::from)
            .map_err(fail("meta"))?;
        phase = self.advance(handle, phase, RunPhase::R2Done).await?;

        // R3 — neutral synthesis.
        self.ensure_live(cancel, "ultrai")?;
        board.start(STEP_ULTRA);
        let outcome = synthesize(
            self.gateway.as_ref(),
            run_id,
            &inputs.query,
            &r2.records,
            activation.plan.active_list.len(),
            cancel,
        )
        .await
        .map_err(fail("ultrai"))?;
        self.store
            .write(run_id, ARTIFACT_ULTRAI, &outcome.record)
            .await
            .map_err(EngineError::from)
            .map_err(fail("ultrai"))?;
        self.store
            .write(run_id, ARTIFACT_ULTRAI_STATUS, &outcome.status)
            .await
            .map_err(EngineError::from)
            .map_err(fail("ultrai"))?;
        board.complete(STEP_ULTRA, Some(outcome.record.ms));
        phase = self.advance(handle, phase, RunPhase::R3Done).await?;

        // Statistics.
        board.start(STEP_STATS);
        let stats = aggregate(&self.store, run_id).await;
        self.store
            .write(run_id, ARTIFACT_STATS, &stats)
            .await
            .map_err(EngineError::from)
            .map_err(fail("stats"))?;
        board.complete(STEP_STATS, None);
        phase = self.advance(handle, phase, RunPhase::StatsDone).await?;

        // Delivery audit.
        board.start(STEP_DELIVERY);
        let manifest = crate::delivery::audit(&self.store, run_id).await;
        self.store
            .write(run_id, ARTIFACT_DELIVERY, &manifest)
            .await
            .map_err(EngineError::from)
            .map_err(fail("delivery"))?;
        board.complete(STEP_DELIVERY, None);
        self.advance(handle, phase, RunPhase::Delivered).await?;
        Ok(())
    }

    fn ensure_live(
        &self,
        cancel: &CancellationToken,
        stage: &'static str,
    ) -> Result<(), StageFailure> {
        if cancel.is_cancelled() {
            Err(StageFailure {
                stage,
                error: EngineError::Cancelled,
            })
        } else {
            Ok(())
        }
    }

    async fn advance(
        &self,
        handle: &RunHandle,
        from: RunPhase,
        to: RunPhase,
    ) -> Result<RunPhase, StageFailure> {
        debug_assert!(from.can_transition_to(to), "{from} -> {to}");
        self.write_status(handle, to.as_str(), to.is_terminal(), None)
            .await
            .map_err(fail("status"))?;
        info!(run_id = %handle.run_id, phase = %to, "run phase advanced");
        Ok(to)
    }

    /// All `status.json` writers serialize on the per-run lock; the store's
    /// atomic rename makes each write whole-file last-writer-wins.
    async fn write_status(
        &self,
        handle: &RunHandle,
        phase_label: &str,
        completed: bool,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let _guard = handle.status_lock.lock().await;
        let (steps, progress) = handle.board.snapshot();
        let status = StatusFile {
            run_id: handle.run_id.to_string(),
            current_phase: phase_label.to_string(),
            completed,
            progress,
            steps,
            error,
        };
        self.store
            .write(handle.run_id.as_str(), ARTIFACT_STATUS, &status)
            .await?;
        Ok(())
    }
}

fn slot_observer(board: Arc<ProgressBoard>, round: Round) -> SlotObserver {
    Arc::new(move |slot, record| {
        let label = match round {
            Round::Initial => r1_step(&slot.primary),
            Round::Meta => r2_step(&slot.primary),
            Round::Ultrai => STEP_ULTRA.to_string(),
        };
        if record.error {
            board.fail(&label, Some(record.ms));
        } else {
            board.complete(&label, Some(record.ms));
        }
    })
}
