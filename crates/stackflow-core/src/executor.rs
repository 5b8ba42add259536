//! Lifecycle executor
//!
//! Walks an [`OperationPlan`] against a gateway. A single scheduling loop
//! owns the [`ResourceGraph`]: it starts every step whose predecessors are
//! terminal, up to `workers` at a time, and applies the phase changes and
//! outcomes the steps send back. Steps never touch the graph themselves.
//!
//! Per step:
//! 1. Delete of a holder: detach every live attachment of a `blocked-by`
//!    type (`not-found` counts as success).
//! 2. The primary call (create, delete, or detach for attachments), retried
//!    with backoff while the error is transient.
//! 3. Classification: `protected` skips, `not-found` on delete is `Absent`,
//!    a validation error fails the step and aborts the run.

use crate::graph::{InstanceKey, InstanceState, ResourceGraph, SkipReason};
use crate::plan::{Action, Direction, OperationPlan};
use crate::report::RunReport;
use crate::retry::{timed, with_retry};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use stackflow_cloud::{
    CloudGateway, ErrorKind, Filter, GatewayError, ResourceSpec, RetryConfig,
};
use stackflow_registry::Registry;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Maximum number of steps in flight
    pub workers: usize,

    pub retry: RetryConfig,

    /// Limit for each individual gateway call
    pub call_timeout: Option<Duration>,

    /// Walk the plan without calling the gateway
    pub dry_run: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryConfig::default(),
            call_timeout: Some(Duration::from_secs(60)),
            dry_run: false,
        }
    }
}

/// A recorded state change of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub at: DateTime<Utc>,
    pub key: InstanceKey,
    pub resource_type: String,
    pub from: InstanceState,
    pub to: InstanceState,
    pub note: Option<String>,
}

/// Receives every transition as it happens
pub trait RunObserver: Send {
    fn on_transition(&mut self, _transition: &Transition) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Everything a step needs, copied out of the graph when it starts
#[derive(Debug, Clone)]
struct StepInput {
    index: usize,
    key: InstanceKey,
    resource_type: String,
    action: Action,
    id: Option<String>,
    spec: ResourceSpec,
    parent_ids: BTreeMap<String, String>,
    protected: bool,
    terminated: bool,
    attachment: bool,
    /// `blocked-by` types of the instance
    blockers: Vec<String>,
    /// Provider ids of in-scope holders, for attachments
    holder_ids: Vec<String>,
}

/// Terminal result of one step
#[derive(Debug, Clone)]
struct StepOutcome {
    state: InstanceState,
    id: Option<String>,
    note: String,
    retries: u32,
    error: Option<ErrorKind>,
    /// Stops the whole run
    fatal: bool,
}

impl StepOutcome {
    fn done(state: InstanceState, note: impl Into<String>, retries: u32) -> Self {
        Self {
            state,
            id: None,
            note: note.into(),
            retries,
            error: None,
            fatal: false,
        }
    }

    fn with_id(mut self, id: String) -> Self {
        self.id = Some(id);
        self
    }

    fn skipped(reason: SkipReason, note: impl Into<String>, retries: u32) -> Self {
        Self::done(InstanceState::Skipped(reason), note, retries)
    }

    /// Classify an error that ended a step
    fn from_error(err: GatewayError, retries: u32) -> Self {
        let state = match err.kind {
            ErrorKind::Protected => InstanceState::Skipped(SkipReason::Protected),
            _ => InstanceState::Failed,
        };
        Self {
            state,
            id: None,
            note: err.to_string(),
            retries,
            error: Some(err.kind),
            fatal: err.kind == ErrorKind::Validation,
        }
    }
}

enum Guard {
    Wait,
    Ready,
    Blocked(InstanceKey),
}

/// Executes operation plans against one gateway
pub struct Executor {
    gateway: Arc<dyn CloudGateway>,
    options: ExecuteOptions,
}

impl Executor {
    pub fn new(gateway: Arc<dyn CloudGateway>, options: ExecuteOptions) -> Self {
        Self { gateway, options }
    }

    pub fn options(&self) -> &ExecuteOptions {
        &self.options
    }

    /// Run `plan` to completion (or cancellation) and report the outcome
    pub async fn run(
        &self,
        registry: &Registry,
        graph: &mut ResourceGraph,
        plan: &OperationPlan,
        cancel: &CancellationToken,
        observer: &mut dyn RunObserver,
    ) -> RunReport {
        let started_at = Utc::now();
        let workers = self.options.workers.max(1);
        let mut journal = Journal {
            transitions: Vec::new(),
            observer,
        };

        let (phase_tx, mut phase_rx) = mpsc::unbounded_channel::<(usize, InstanceState)>();
        let mut tasks: JoinSet<(usize, StepOutcome)> = JoinSet::new();
        let mut started = vec![false; plan.len()];
        let mut cancelled = false;
        let mut aborted: Option<String> = None;

        info!(
            deployment = %plan.deployment,
            direction = %plan.direction,
            steps = plan.len(),
            workers,
            dry_run = self.options.dry_run,
            "Starting run"
        );

        loop {
            if !cancelled && cancel.is_cancelled() {
                cancelled = true;
                warn!("Cancellation requested, no new steps will start");
            }

            if cancelled || aborted.is_some() {
                let reason = if aborted.is_some() {
                    SkipReason::Aborted
                } else {
                    SkipReason::Cancelled
                };
                for index in 0..plan.len() {
                    if !started[index] {
                        started[index] = true;
                        journal.record(graph, &plan.steps[index].key, InstanceState::Skipped(reason), None);
                    }
                }
            } else {
                self.schedule(
                    registry,
                    graph,
                    plan,
                    &mut started,
                    &mut tasks,
                    workers,
                    &phase_tx,
                    &mut journal,
                );
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                Some((index, state)) = phase_rx.recv() => {
                    journal.record(graph, &plan.steps[index].key, state, None);
                }
                _ = cancel.cancelled(), if !cancelled => {}
                Some(joined) = tasks.join_next() => match joined {
                    Ok((index, outcome)) => {
                        let key = &plan.steps[index].key;
                        if outcome.fatal && aborted.is_none() {
                            error!(key = %key, note = %outcome.note, "Validation error, aborting run");
                            aborted = Some(format!("{key}: {}", outcome.note));
                        }
                        journal.finish(graph, key, outcome);
                    }
                    Err(err) => error!(error = %err, "Worker task ended abnormally"),
                },
                else => break,
            }
        }

        // only reachable with a step whose worker was lost
        for (index, step) in plan.steps.iter().enumerate() {
            let terminal = graph.get(&step.key).is_none_or(|i| i.state.is_terminal());
            if !terminal {
                warn!(key = %step.key, started = started[index], "Step never completed");
                journal.record(graph, &step.key, InstanceState::Failed, Some("step never completed".to_string()));
            }
        }

        let report = RunReport::summarize(
            graph,
            plan,
            journal.transitions,
            started_at,
            self.options.dry_run,
            cancelled,
            aborted,
        );
        info!(
            deployment = %report.deployment,
            status = %report.status,
            outcomes = report.outcomes.len(),
            "Run finished"
        );
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn schedule(
        &self,
        registry: &Registry,
        graph: &mut ResourceGraph,
        plan: &OperationPlan,
        started: &mut [bool],
        tasks: &mut JoinSet<(usize, StepOutcome)>,
        workers: usize,
        phase_tx: &mpsc::UnboundedSender<(usize, InstanceState)>,
        journal: &mut Journal<'_>,
    ) {
        // skips and dry-run steps unblock later steps within the same pass
        let mut progressed = true;
        while progressed {
            progressed = false;
            for index in 0..plan.len() {
                if started[index] {
                    continue;
                }
                let step = &plan.steps[index];
                match guard(graph, plan, index) {
                    Guard::Wait => {}
                    Guard::Blocked(failed) => {
                        started[index] = true;
                        progressed = true;
                        journal.record(
                            graph,
                            &step.key,
                            InstanceState::Skipped(SkipReason::BlockedByDependencyFailure),
                            Some(format!("blocked by {failed}")),
                        );
                    }
                    Guard::Ready if self.options.dry_run => {
                        started[index] = true;
                        progressed = true;
                        let note = graph
                            .get(&step.key)
                            .map(|i| dry_run_note(step.action, i.exists()))
                            .unwrap_or_default();
                        journal.record(
                            graph,
                            &step.key,
                            InstanceState::Skipped(SkipReason::DryRun),
                            Some(note),
                        );
                    }
                    Guard::Ready if tasks.len() < workers => {
                        let Some(input) = step_input(registry, graph, plan, index) else {
                            continue;
                        };
                        started[index] = true;
                        debug!(key = %step.key, action = %step.action, "Starting step");

                        let gateway = Arc::clone(&self.gateway);
                        let options = self.options.clone();
                        let phase_tx = phase_tx.clone();
                        tasks.spawn(async move {
                            let index = input.index;
                            let outcome = AssertUnwindSafe(run_step(
                                gateway.as_ref(),
                                &options,
                                &input,
                                &phase_tx,
                            ))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                StepOutcome::from_error(
                                    GatewayError::new(ErrorKind::Unknown, "step panicked"),
                                    0,
                                )
                            });
                            (index, outcome)
                        });
                    }
                    Guard::Ready => {}
                }
            }
        }
    }
}

/// Records transitions into the graph, the log, the observer and the report
struct Journal<'a> {
    transitions: Vec<Transition>,
    observer: &'a mut dyn RunObserver,
}

impl Journal<'_> {
    fn record(
        &mut self,
        graph: &mut ResourceGraph,
        key: &InstanceKey,
        to: InstanceState,
        note: Option<String>,
    ) {
        let Some(instance) = graph.get_mut(key) else {
            return;
        };
        let from = instance.state;
        instance.state = to;
        if note.is_some() {
            instance.note = note.clone();
        }

        if to.is_terminal() {
            info!(key = %key, from = %from, to = %to, note = note.as_deref().unwrap_or(""), "Transition");
        } else {
            debug!(key = %key, from = %from, to = %to, "Transition");
        }

        let transition = Transition {
            at: Utc::now(),
            key: key.clone(),
            resource_type: instance.resource_type.clone(),
            from,
            to,
            note,
        };
        self.observer.on_transition(&transition);
        self.transitions.push(transition);
    }

    fn finish(&mut self, graph: &mut ResourceGraph, key: &InstanceKey, outcome: StepOutcome) {
        if let Some(instance) = graph.get_mut(key) {
            if let Some(id) = outcome.id.clone() {
                instance.id = Some(id);
            }
            instance.retries = outcome.retries;
            instance.last_error = outcome.error;
        }
        self.record(graph, key, outcome.state, Some(outcome.note));
    }
}

/// Whether a terminal predecessor state lets dependents proceed
fn satisfies(direction: Direction, state: InstanceState) -> bool {
    match (direction, state) {
        (_, InstanceState::Skipped(SkipReason::AlreadyInGoalState | SkipReason::DryRun)) => true,
        (Direction::Create, InstanceState::Ready) => true,
        (
            Direction::Delete,
            InstanceState::Absent
            | InstanceState::Detached
            | InstanceState::Skipped(SkipReason::Protected),
        ) => true,
        _ => false,
    }
}

fn guard(graph: &ResourceGraph, plan: &OperationPlan, index: usize) -> Guard {
    let mut waiting = false;
    for &pred in &plan.steps[index].after {
        let key = &plan.steps[pred].key;
        let state = graph
            .get(key)
            .map(|i| i.state)
            .unwrap_or(InstanceState::Failed);
        if !state.is_terminal() {
            waiting = true;
        } else if !satisfies(plan.direction, state) {
            return Guard::Blocked(key.clone());
        }
    }
    if waiting { Guard::Wait } else { Guard::Ready }
}

fn dry_run_note(action: Action, exists: bool) -> String {
    match (action, exists) {
        (Action::Create, true) => "exists".to_string(),
        (Action::Create, false) => "would create".to_string(),
        (Action::Delete, true) => "would delete".to_string(),
        (Action::Delete, false) => "already absent".to_string(),
        (Action::Detach, _) => "would detach".to_string(),
    }
}

fn step_input(
    registry: &Registry,
    graph: &ResourceGraph,
    plan: &OperationPlan,
    index: usize,
) -> Option<StepInput> {
    let step = &plan.steps[index];
    let instance = graph.get(&step.key)?;
    let descriptor = registry.get(&instance.resource_type);

    let mut parent_ids = instance.parent_ids.clone();
    for (parent_type, parent_key) in &instance.parents {
        if let Some(parent_id) = graph.get(parent_key).and_then(|p| p.id.clone()) {
            parent_ids.insert(parent_type.clone(), parent_id);
        }
    }

    let holder_ids = graph
        .holders(&instance.key)
        .iter()
        .filter_map(|k| graph.get(k))
        .filter(|h| {
            registry
                .get(&h.resource_type)
                .is_some_and(|t| t.blocked_by.contains(&instance.resource_type))
        })
        .filter_map(|h| h.id.clone())
        .collect();

    Some(StepInput {
        index,
        key: instance.key.clone(),
        resource_type: instance.resource_type.clone(),
        action: step.action,
        id: instance.id.clone(),
        spec: instance.spec(graph.deployment()),
        parent_ids,
        protected: instance.protected,
        terminated: instance.id.is_some() && !instance.exists(),
        attachment: descriptor.is_some_and(|t| t.attachment),
        blockers: descriptor.map(|t| t.blocked_by.clone()).unwrap_or_default(),
        holder_ids,
    })
}

fn enter(tx: &mpsc::UnboundedSender<(usize, InstanceState)>, index: usize, state: InstanceState) {
    // the receiver outlives every step
    let _ = tx.send((index, state));
}

async fn run_step(
    gateway: &dyn CloudGateway,
    options: &ExecuteOptions,
    input: &StepInput,
    tx: &mpsc::UnboundedSender<(usize, InstanceState)>,
) -> StepOutcome {
    match input.action {
        Action::Create => create_step(gateway, options, input, tx).await,
        Action::Delete => delete_step(gateway, options, input, tx).await,
        Action::Detach => detach_step(gateway, options, input, tx).await,
    }
}

async fn create_step(
    gateway: &dyn CloudGateway,
    options: &ExecuteOptions,
    input: &StepInput,
    tx: &mpsc::UnboundedSender<(usize, InstanceState)>,
) -> StepOutcome {
    if input.attachment {
        return match &input.id {
            Some(_) if !input.terminated => {
                StepOutcome::skipped(SkipReason::AlreadyInGoalState, "attachment exists", 0)
            }
            _ => StepOutcome::from_error(
                GatewayError::new(
                    ErrorKind::Unknown,
                    format!("{} instances are discovered, not created", input.resource_type),
                ),
                0,
            ),
        };
    }

    enter(tx, input.index, InstanceState::Creating);

    let filter = Filter::deployment(input.spec.deployment.clone()).with_name(input.spec.name.clone());
    let max_attempts = options.retry.max_attempts.max(1);
    let mut retries = 0;
    let mut create_attempted = false;

    loop {
        // existence check first, so that a create which timed out but went
        // through is not repeated
        let lookup = match timed(options.call_timeout, gateway.describe(&input.resource_type, &filter)).await {
            Ok(found) => Ok(found.into_iter().find(|r| !r.is_terminated())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        };

        // a parent that is not yet visible to the provider answers create
        // with not-found; that is retried like any transient error
        let (err, retryable) = match lookup {
            Ok(Some(existing)) => {
                let note = if create_attempted { "created" } else { "already-exists" };
                return StepOutcome::done(InstanceState::Ready, note, retries).with_id(existing.id);
            }
            Ok(None) => {
                create_attempted = true;
                match timed(
                    options.call_timeout,
                    gateway.create(&input.resource_type, &input.spec, &input.parent_ids),
                )
                .await
                {
                    Ok(id) => {
                        return StepOutcome::done(InstanceState::Ready, "created", retries).with_id(id);
                    }
                    Err(err) => {
                        let retryable = err.is_transient() || err.is_not_found();
                        (err, retryable)
                    }
                }
            }
            Err(err) => {
                let retryable = err.is_transient();
                (err, retryable)
            }
        };

        if !retryable || retries + 1 >= max_attempts {
            return StepOutcome::from_error(err, retries);
        }

        let delay = options.retry.delay_for_attempt(retries);
        debug!(key = %input.key, attempt = retries + 1, kind = %err.kind, "Create failed, retrying");
        retries += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

async fn delete_step(
    gateway: &dyn CloudGateway,
    options: &ExecuteOptions,
    input: &StepInput,
    tx: &mpsc::UnboundedSender<(usize, InstanceState)>,
) -> StepOutcome {
    let Some(id) = input.id.as_deref() else {
        return StepOutcome::done(InstanceState::Absent, "already-absent", 0);
    };
    if input.terminated {
        return StepOutcome::skipped(SkipReason::AlreadyInGoalState, "already terminated", 0);
    }
    if input.protected {
        return StepOutcome::skipped(SkipReason::Protected, "protected", 0);
    }

    let mut retries = 0;

    if !input.blockers.is_empty() {
        enter(tx, input.index, InstanceState::Detaching);
        for blocker in &input.blockers {
            let filter = Filter::attached_to(id);
            let attempted = with_retry(&options.retry, options.call_timeout, "describe", || {
                gateway.describe(blocker, &filter)
            })
            .await;
            retries += attempted.retries;

            let attached = match attempted.result {
                Ok(found) => found,
                Err(err) if err.is_not_found() => Vec::new(),
                Err(err) => return StepOutcome::from_error(err, retries),
            };

            for attachment in attached.iter().filter(|a| !a.is_terminated()) {
                let attempted = with_retry(&options.retry, options.call_timeout, "detach", || {
                    gateway.detach(blocker, &attachment.id, id)
                })
                .await;
                retries += attempted.retries;
                match attempted.result {
                    Ok(()) => debug!(holder = id, attachment = %attachment.id, "Detached"),
                    Err(err) if err.is_not_found() => {}
                    Err(err) => return StepOutcome::from_error(err, retries),
                }
            }
        }
    }

    enter(tx, input.index, InstanceState::Deleting);
    let attempted = with_retry(&options.retry, options.call_timeout, "delete", || {
        gateway.delete(&input.resource_type, id)
    })
    .await;
    retries += attempted.retries;

    match attempted.result {
        Ok(()) => StepOutcome::done(InstanceState::Absent, "deleted", retries),
        Err(err) if err.is_not_found() => {
            StepOutcome::done(InstanceState::Absent, "already-absent", retries)
        }
        Err(err) => StepOutcome::from_error(err, retries),
    }
}

async fn detach_step(
    gateway: &dyn CloudGateway,
    options: &ExecuteOptions,
    input: &StepInput,
    tx: &mpsc::UnboundedSender<(usize, InstanceState)>,
) -> StepOutcome {
    let Some(id) = input.id.as_deref() else {
        return StepOutcome::done(InstanceState::Absent, "already-absent", 0);
    };
    if input.terminated {
        return StepOutcome::skipped(SkipReason::AlreadyInGoalState, "already terminated", 0);
    }
    if input.protected {
        return StepOutcome::skipped(SkipReason::Protected, "protected", 0);
    }

    enter(tx, input.index, InstanceState::Detaching);
    let mut retries = 0;
    for holder_id in &input.holder_ids {
        let attempted = with_retry(&options.retry, options.call_timeout, "detach", || {
            gateway.detach(&input.resource_type, id, holder_id)
        })
        .await;
        retries += attempted.retries;
        match attempted.result {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return StepOutcome::from_error(err, retries),
        }
    }

    let note = match input.holder_ids.as_slice() {
        [] => "not attached".to_string(),
        [holder] => format!("detached from {holder}"),
        holders => format!("detached from {} holders", holders.len()),
    };
    StepOutcome::done(InstanceState::Detached, note, retries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies() {
        assert!(satisfies(Direction::Create, InstanceState::Ready));
        assert!(!satisfies(Direction::Create, InstanceState::Absent));
        assert!(satisfies(Direction::Delete, InstanceState::Absent));
        assert!(satisfies(Direction::Delete, InstanceState::Detached));
        assert!(satisfies(
            Direction::Delete,
            InstanceState::Skipped(SkipReason::Protected)
        ));
        assert!(!satisfies(Direction::Delete, InstanceState::Failed));
        assert!(!satisfies(
            Direction::Delete,
            InstanceState::Skipped(SkipReason::BlockedByDependencyFailure)
        ));
        assert!(satisfies(
            Direction::Create,
            InstanceState::Skipped(SkipReason::DryRun)
        ));
    }

    #[test]
    fn test_error_classification() {
        let protected = StepOutcome::from_error(GatewayError::protected("termination protection"), 0);
        assert_eq!(protected.state, InstanceState::Skipped(SkipReason::Protected));
        assert!(!protected.fatal);

        let invalid = StepOutcome::from_error(GatewayError::validation("bad cidr"), 0);
        assert_eq!(invalid.state, InstanceState::Failed);
        assert!(invalid.fatal);

        let exhausted = StepOutcome::from_error(GatewayError::conflict("in use"), 4);
        assert_eq!(exhausted.state, InstanceState::Failed);
        assert_eq!(exhausted.retries, 4);
        assert!(!exhausted.fatal);
    }
}
