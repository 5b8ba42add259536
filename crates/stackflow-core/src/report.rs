//! Outcome reporter

use crate::executor::Transition;
use crate::graph::{InstanceKey, InstanceState, ResourceGraph, SkipReason};
use crate::plan::{Direction, OperationPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackflow_cloud::ErrorKind;

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    AllSucceeded,
    Partial,
    Failed,
}

impl RunStatus {
    /// `Failed` if anything failed, `Partial` if anything was skipped for a
    /// reason other than already being in the goal state, else `AllSucceeded`
    pub fn from_states(states: impl IntoIterator<Item = InstanceState>) -> Self {
        let mut status = RunStatus::AllSucceeded;
        for state in states {
            match state {
                InstanceState::Failed => return RunStatus::Failed,
                InstanceState::Skipped(reason) if reason.is_degrading() => {
                    status = RunStatus::Partial;
                }
                s if !s.is_terminal() => status = RunStatus::Partial,
                _ => {}
            }
        }
        status
    }

    /// Process exit code for the CLI
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::AllSucceeded => 0,
            RunStatus::Partial => 1,
            RunStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::AllSucceeded => write!(f, "all-succeeded"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal outcome of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub resource_type: String,
    pub key: InstanceKey,
    /// Provider id, or the logical name when the provider never assigned one
    pub id: String,
    pub state: InstanceState,
    pub reason: String,
    pub retries: u32,
    pub error_kind: Option<ErrorKind>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self.state,
            InstanceState::Ready | InstanceState::Absent | InstanceState::Detached
        )
    }

    /// Reason with the retry count appended when there were retries
    pub fn detail(&self) -> String {
        if self.retries > 0 {
            format!("{} (retries={})", self.reason, self.retries)
        } else {
            self.reason.clone()
        }
    }
}

/// Final accounting of a run. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// UTC timestamp of the start of the run
    pub run_id: String,
    pub deployment: String,
    pub direction: Direction,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub cancelled: bool,
    /// Validation error that stopped the run
    pub aborted: Option<String>,
    /// One entry per plan step, in plan order
    pub outcomes: Vec<Outcome>,
    pub transitions: Vec<Transition>,
}

impl RunReport {
    /// Build the report from the final state of the graph
    pub fn summarize(
        graph: &ResourceGraph,
        plan: &OperationPlan,
        transitions: Vec<Transition>,
        started_at: DateTime<Utc>,
        dry_run: bool,
        cancelled: bool,
        aborted: Option<String>,
    ) -> Self {
        let outcomes: Vec<Outcome> = plan
            .steps
            .iter()
            .filter_map(|step| graph.get(&step.key))
            .map(|instance| Outcome {
                resource_type: instance.resource_type.clone(),
                key: instance.key.clone(),
                id: instance.display_id().to_string(),
                state: instance.state,
                reason: reason(instance.state, instance.note.as_deref()),
                retries: instance.retries,
                error_kind: instance.last_error,
            })
            .collect();

        let mut status = RunStatus::from_states(outcomes.iter().map(|o| o.state));
        if cancelled && status == RunStatus::AllSucceeded {
            status = RunStatus::Partial;
        }

        Self {
            run_id: run_id(started_at),
            deployment: plan.deployment.clone(),
            direction: plan.direction,
            dry_run,
            started_at,
            finished_at: Utc::now(),
            status,
            cancelled,
            aborted,
            outcomes,
            transitions,
        }
    }

    pub fn outcome(&self, key: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.key.as_str() == key)
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == InstanceState::Failed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.state, InstanceState::Skipped(_)))
            .count()
    }

    /// Exit code for the CLI: a run stopped by a validation error counts as
    /// a configuration error
    pub fn exit_code(&self) -> i32 {
        if self.aborted.is_some() {
            3
        } else {
            self.status.exit_code()
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Run ids sort chronologically and are safe as file names
pub fn run_id(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.3fZ").to_string()
}

fn reason(state: InstanceState, note: Option<&str>) -> String {
    match (state, note) {
        (InstanceState::Skipped(SkipReason::DryRun), Some(note)) => format!("dry-run: {note}"),
        (InstanceState::Skipped(reason), _) => reason.to_string(),
        (_, Some(note)) => note.to_string(),
        (state, None) => state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceInstance;
    use crate::plan::{Action, PlanStep};
    use chrono::TimeZone;

    fn graph_with(states: &[(&str, InstanceState, Option<&str>)]) -> (ResourceGraph, OperationPlan) {
        let mut graph = ResourceGraph::new("web");
        let mut steps = Vec::new();
        for (name, state, note) in states {
            let key = InstanceKey::new("network", name);
            let mut instance = ResourceInstance::new(key.clone(), "network");
            instance.state = *state;
            instance.note = note.map(str::to_string);
            graph.insert(instance);
            steps.push(PlanStep {
                key,
                resource_type: "network".to_string(),
                action: Action::Delete,
                after: Vec::new(),
            });
        }
        let plan = OperationPlan {
            deployment: "web".to_string(),
            direction: Direction::Delete,
            steps,
        };
        (graph, plan)
    }

    fn summarize(states: &[(&str, InstanceState, Option<&str>)]) -> RunReport {
        let (graph, plan) = graph_with(states);
        RunReport::summarize(&graph, &plan, Vec::new(), Utc::now(), false, false, None)
    }

    #[test]
    fn test_all_succeeded() {
        let report = summarize(&[
            ("a", InstanceState::Absent, Some("deleted")),
            ("b", InstanceState::Absent, Some("already-absent")),
            (
                "c",
                InstanceState::Skipped(SkipReason::AlreadyInGoalState),
                None,
            ),
        ]);
        assert_eq!(report.status, RunStatus::AllSucceeded);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.outcome("network/b").unwrap().reason, "already-absent");
    }

    #[test]
    fn test_protected_is_partial() {
        let report = summarize(&[
            ("a", InstanceState::Absent, Some("deleted")),
            ("b", InstanceState::Skipped(SkipReason::Protected), Some("protected")),
        ]);
        assert_eq!(report.status, RunStatus::Partial);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.outcome("network/b").unwrap().reason, "protected");
    }

    #[test]
    fn test_failure_wins() {
        let report = summarize(&[
            ("a", InstanceState::Failed, Some("conflict: in use")),
            (
                "b",
                InstanceState::Skipped(SkipReason::BlockedByDependencyFailure),
                Some("blocked by network/a"),
            ),
        ]);
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code(), 2);
        assert_eq!(
            report.outcome("network/b").unwrap().reason,
            "blocked-by-dependency-failure"
        );
    }

    #[test]
    fn test_cancelled_is_never_all_succeeded() {
        let (graph, plan) = graph_with(&[("a", InstanceState::Absent, Some("deleted"))]);
        let report = RunReport::summarize(&graph, &plan, Vec::new(), Utc::now(), false, true, None);
        assert_eq!(report.status, RunStatus::Partial);
    }

    #[test]
    fn test_dry_run_reason() {
        let report = summarize(&[(
            "a",
            InstanceState::Skipped(SkipReason::DryRun),
            Some("would delete"),
        )]);
        assert_eq!(report.status, RunStatus::AllSucceeded);
        assert_eq!(report.outcomes[0].reason, "dry-run: would delete");
    }

    #[test]
    fn test_detail_includes_retries() {
        let outcome = Outcome {
            resource_type: "security-group".to_string(),
            key: InstanceKey::new("security-group", "app"),
            id: "sg-1".to_string(),
            state: InstanceState::Absent,
            reason: "deleted".to_string(),
            retries: 3,
            error_kind: None,
        };
        assert_eq!(outcome.detail(), "deleted (retries=3)");
    }

    #[test]
    fn test_run_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(run_id(at), "20240501T123000.000Z");
    }
}
