//! Execution planning: mode derivation and dependency-level partitioning.

use crate::errors::PlanValidationError;
use crate::workflow::WorkflowStep;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// How a workflow's steps are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One step at a time, in declared order.
    Sequential,
    /// Dependency levels run concurrently with a barrier between levels.
    Parallel,
    /// Reserved for load-aware scheduling; currently behaves as Sequential.
    Adaptive,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel => write!(f, "parallel"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

/// A validated schedule for one workflow's steps.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// The scheduling mode, derived or explicitly requested.
    pub mode: ExecutionMode,
    /// Step names in declared order.
    pub order: Vec<String>,
    /// Dependency names per step.
    pub dependencies: HashMap<String, HashSet<String>>,
    /// Dependency levels, populated only for Parallel plans. Steps in level
    /// `k` depend only on steps in levels `< k`.
    pub levels: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Builds a plan from the step graph.
    ///
    /// Without an explicit mode, the plan is Parallel when no step declares
    /// dependencies and Sequential otherwise. Parallel plans are partitioned
    /// into dependency levels up front; a cycle or a reference to an
    /// undeclared step fails here, before any step body runs. Sequential
    /// plans keep declared order and leave dependency checks to execution
    /// time, where an unmet dependency fails just that step.
    pub fn new(
        steps: &[WorkflowStep],
        mode: Option<ExecutionMode>,
    ) -> Result<Self, PlanValidationError> {
        let order: Vec<String> = steps.iter().map(|s| s.step_name.clone()).collect();
        let dependencies: HashMap<String, HashSet<String>> = steps
            .iter()
            .map(|s| (s.step_name.clone(), s.dependencies.clone()))
            .collect();

        let derived = if steps.iter().all(|s| s.dependencies.is_empty()) {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        let mode = mode.unwrap_or(derived);

        let levels = if mode == ExecutionMode::Parallel {
            Self::partition_levels(&order, &dependencies)?
        } else {
            Vec::new()
        };

        Ok(Self {
            mode,
            order,
            dependencies,
            levels,
        })
    }

    fn partition_levels(
        order: &[String],
        dependencies: &HashMap<String, HashSet<String>>,
    ) -> Result<Vec<Vec<String>>, PlanValidationError> {
        let mut levels = Vec::new();
        let mut scheduled: HashSet<String> = HashSet::new();
        let mut remaining: Vec<String> = order.to_vec();

        while !remaining.is_empty() {
            let (ready, rest): (Vec<String>, Vec<String>) = remaining.into_iter().partition(|s| {
                dependencies
                    .get(s)
                    .map_or(true, |deps| deps.iter().all(|d| scheduled.contains(d)))
            });

            if ready.is_empty() {
                return Err(PlanValidationError::circular_or_missing(rest));
            }

            scheduled.extend(ready.iter().cloned());
            levels.push(ready);
            remaining = rest;
        }

        Ok(levels)
    }

    /// Returns the level index of a step, for Parallel plans.
    #[must_use]
    pub fn level_of(&self, step_name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|s| s == step_name))
    }
}
