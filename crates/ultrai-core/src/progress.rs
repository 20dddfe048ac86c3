use std::sync::Mutex;

use ultrai_types::{ProgressStep, StepStatus};

/// In-memory ordered step table for one run. Step order is fixed once
/// inserted; status updates are monotonic (a terminal step never changes).
/// Shared between the coordinator, the scheduler's slot observer, and the
/// polling surface.
#[derive(Debug)]
pub struct ProgressBoard {
    steps: Mutex<Vec<ProgressStep>>,
}

impl ProgressBoard {
    pub fn new(labels: &[&str]) -> Self {
        Self {
            steps: Mutex::new(labels.iter().map(|label| ProgressStep::pending(*label)).collect()),
        }
    }

    /// Inserts steps immediately before `anchor`, preserving their given
    /// order. Used once the activation plan makes the per-slot steps known.
    pub fn insert_before(&self, anchor: &str, labels: &[String]) {
        let mut steps = self.steps.lock().expect("progress lock");
        let at = steps
            .iter()
            .position(|s| s.text == anchor)
            .unwrap_or(steps.len());
        for (offset, label) in labels.iter().enumerate() {
            steps.insert(at + offset, ProgressStep::pending(label.clone()));
        }
    }

    pub fn start(&self, label: &str) {
        self.advance(label, StepStatus::InProgress, None);
    }

    pub fn complete(&self, label: &str, ms: Option<u64>) {
        self.advance(label, StepStatus::Completed, ms);
    }

    pub fn fail(&self, label: &str, ms: Option<u64>) {
        self.advance(label, StepStatus::Failed, ms);
    }

    /// Marks every non-terminal in-progress step failed. Called when a run
    /// exits through an error path.
    pub fn fail_in_progress(&self) {
        let mut steps = self.steps.lock().expect("progress lock");
        for step in steps.iter_mut() {
            if step.status == StepStatus::InProgress {
                step.status = StepStatus::Failed;
            }
        }
    }

    fn advance(&self, label: &str, next: StepStatus, ms: Option<u64>) {
        let mut steps = self.steps.lock().expect("progress lock");
        let Some(step) = steps.iter_mut().find(|s| s.text == label) else {
            return;
        };
        if !step.status.can_advance_to(next) {
            return;
        }
        step.status = next;
        if let Some(ms) = ms {
            step.time = Some(format_duration(ms));
        }
        if next == StepStatus::Completed {
            step.progress = Some(100);
        }
    }

    /// Current steps plus the overall percentage. Failed steps count toward
    /// completion so a degraded run still converges to 100.
    pub fn snapshot(&self) -> (Vec<ProgressStep>, u8) {
        let steps = self.steps.lock().expect("progress lock").clone();
        let total = steps.len();
        let done = steps.iter().filter(|s| s.status.is_terminal()).count();
        let pct = if total == 0 {
            0
        } else {
            ((done * 100) / total) as u8
        };
        (steps, pct)
    }
}

fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_keep_insertion_order() {
        let board = ProgressBoard::new(&["init", "synthesis", "delivery"]);
        board.insert_before(
            "synthesis",
            &["R1 ← a".to_string(), "R1 ← b".to_string()],
        );
        let (steps, _) = board.snapshot();
        let labels: Vec<&str> = steps.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(labels, vec!["init", "R1 ← a", "R1 ← b", "synthesis", "delivery"]);
    }

    #[test]
    fn status_updates_are_monotonic() {
        let board = ProgressBoard::new(&["step"]);
        board.complete("step", Some(1_500));
        board.start("step");
        board.fail("step", None);
        let (steps, _) = board.snapshot();
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[0].time.as_deref(), Some("1.5s"));
        assert_eq!(steps[0].progress, Some(100));
    }

    #[test]
    fn unknown_labels_are_ignored() {
        let board = ProgressBoard::new(&["a"]);
        board.complete("missing", None);
        let (steps, pct) = board.snapshot();
        assert_eq!(steps.len(), 1);
        assert_eq!(pct, 0);
    }

    #[test]
    fn failed_steps_count_toward_progress() {
        let board = ProgressBoard::new(&["a", "b", "c", "d"]);
        board.complete("a", None);
        board.fail("b", None);
        let (_, pct) = board.snapshot();
        assert_eq!(pct, 50);
    }

    #[test]
    fn fail_in_progress_leaves_terminal_steps_alone() {
        let board = ProgressBoard::new(&["a", "b", "c"]);
        board.complete("a", None);
        board.start("b");
        board.fail_in_progress();
        let (steps, _) = board.snapshot();
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].status, StepStatus::Failed);
        assert_eq!(steps[2].status, StepStatus::Pending);
    }

    #[test]
    fn sub_second_durations_render_in_millis() {
        let board = ProgressBoard::new(&["a"]);
        board.complete("a", Some(340));
        let (steps, _) = board.snapshot();
        assert_eq!(steps[0].time.as_deref(), Some("340ms"));
    }
}
