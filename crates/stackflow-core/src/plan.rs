//! Operation plan types

use crate::graph::InstanceKey;
use serde::{Deserialize, Serialize};

/// The goal applied uniformly to every instance of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Create,
    Delete,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Create => write!(f, "create"),
            Direction::Delete => write!(f, "delete"),
        }
    }
}

/// What a plan step does to its instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Delete,
    /// Release an attachment from the resources holding it
    Detach,
}

impl Action {
    /// Marker used when rendering plans
    pub fn symbol(self) -> char {
        match self {
            Action::Create => '+',
            Action::Delete => '-',
            Action::Detach => '~',
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Delete => write!(f, "delete"),
            Action::Detach => write!(f, "detach"),
        }
    }
}

/// One (instance, action) pair of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub key: InstanceKey,
    pub resource_type: String,
    pub action: Action,

    /// Indices of the steps that must reach a terminal state first
    pub after: Vec<usize>,
}

/// Ordered steps for one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPlan {
    pub deployment: String,
    pub direction: Direction,
    pub steps: Vec<PlanStep>,
}

impl OperationPlan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &InstanceKey> {
        self.steps.iter().map(|s| &s.key)
    }

    pub fn position(&self, key: &InstanceKey) -> Option<usize> {
        self.steps.iter().position(|s| &s.key == key)
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for step in &self.steps {
            match step.action {
                Action::Create => summary.to_create += 1,
                Action::Delete => summary.to_delete += 1,
                Action::Detach => summary.to_detach += 1,
            }
        }
        summary
    }
}

/// Step counts by action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub to_create: usize,
    pub to_delete: usize,
    pub to_detach: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to delete, {} to detach",
            self.to_create, self.to_delete, self.to_detach
        )
    }
}
