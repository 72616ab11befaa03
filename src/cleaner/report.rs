use serde::Serialize;

/// What happened to a single delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeletionStatus {
    /// The engine accepted the delete.
    Deleted,
    /// The engine rejected the delete; the batch carried on.
    Failed { error: String },
    /// Dry run: the delete was not sent.
    DryRun,
}

/// Outcome of one delete attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    pub instance_id: String,
    #[serde(flatten)]
    pub status: DeletionStatus,
}

impl DeletionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, DeletionStatus::Failed { .. })
    }
}

/// Results from a bulk cleanup call.
///
/// Outcomes are listed in the order the deletes were attempted. The same
/// instance may appear more than once when several of its tasks qualified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// One entry per delete attempt.
    pub outcomes: Vec<DeletionOutcome>,
    /// Tasks inspected by an age-based cleanup.
    pub tasks_examined: usize,
    /// Tasks that passed the age filter.
    pub tasks_selected: usize,
    /// Selected tasks whose execution no longer led to a process instance.
    pub unresolved_tasks: usize,
}

impl CleanupReport {
    pub fn record(&mut self, outcome: DeletionOutcome) {
        self.outcomes.push(outcome);
    }

    /// Number of deletes the engine accepted.
    pub fn deleted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeletionStatus::Deleted)
            .count()
    }

    /// Failed delete attempts.
    pub fn failed(&self) -> impl Iterator<Item = &DeletionOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    pub fn total_attempts(&self) -> usize {
        self.outcomes.len()
    }

    /// Fold another report into this one, keeping attempt order.
    pub fn merge(&mut self, other: CleanupReport) {
        self.outcomes.extend(other.outcomes);
        self.tasks_examined += other.tasks_examined;
        self.tasks_selected += other.tasks_selected;
        self.unresolved_tasks += other.unresolved_tasks;
    }
}
