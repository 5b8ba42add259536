//! StackFlow lifecycle engine
//!
//! Turns a deployment into a graph of resource instances, orders the graph
//! for creation or destruction, walks the order against a
//! [`CloudGateway`](stackflow_cloud::CloudGateway) and accounts for every
//! instance in a [`RunReport`].
//!
//! ```text
//! Registry + Gateway ──discover──▶ ResourceGraph
//!                                       │ resolve
//!                                       ▼
//!                                 OperationPlan
//!                                       │ Executor::run
//!                                       ▼
//!                        ResourceGraph (terminal states)
//!                                       │ summarize
//!                                       ▼
//!                                   RunReport
//! ```

pub mod archive;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod graph;
pub mod plan;
pub mod report;
pub mod resolver;
pub mod retry;

pub use archive::{ReportArchive, RunLock};
pub use discovery::discover;
pub use error::{CoreError, Result};
pub use executor::{ExecuteOptions, Executor, NoopObserver, RunObserver, Transition};
pub use graph::{InstanceKey, InstanceState, ResourceGraph, ResourceInstance, SkipReason};
pub use plan::{Action, Direction, OperationPlan, PlanStep, PlanSummary};
pub use report::{Outcome, RunReport, RunStatus};
pub use resolver::resolve;
pub use tokio_util::sync::CancellationToken;
