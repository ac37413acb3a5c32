//! Execution result types.

use std::fmt;

use super::runner::RunStatus;
use crate::transaction::{Action, Op, Step};

/// One process that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// Full argument vector, binary first.
    pub argv: Vec<String>,
    /// How the process failed.
    pub status: RunStatus,
}

/// Result of one builder call, which may launch more than one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    failures: Vec<CommandFailure>,
}

impl CommandOutcome {
    /// Record a failed process.
    pub fn push(&mut self, failure: CommandFailure) {
        self.failures.push(failure);
    }

    /// Check if every launched process succeeded.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Processes that failed.
    pub fn failures(&self) -> &[CommandFailure] {
        &self.failures
    }

    /// Bitwise OR of the individual result codes.
    pub fn code(&self) -> i32 {
        self.failures.iter().fold(0, |acc, f| acc | f.status.code())
    }
}

/// Outcome of one rule step within a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub op: Op,
    pub outcome: CommandOutcome,
}

/// Aggregate outcome of a transaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Action that produced this outcome.
    pub action: Action,
    /// Reports in execution order.
    pub reports: Vec<StepReport>,
}

impl TransactionOutcome {
    /// Create an empty outcome for `action`.
    pub fn new(action: Action) -> Self {
        Self {
            action,
            reports: Vec::new(),
        }
    }

    /// Append a step report.
    pub fn record(&mut self, step: Step, op: Op, outcome: CommandOutcome) {
        self.reports.push(StepReport { step, op, outcome });
    }

    /// Append all reports of `other`, keeping this outcome's action.
    pub fn merge(mut self, other: TransactionOutcome) -> Self {
        self.reports.extend(other.reports);
        self
    }

    /// Check if every step succeeded.
    pub fn is_success(&self) -> bool {
        self.reports.iter().all(|r| r.outcome.is_success())
    }

    /// Bitwise OR of every result code; zero on success.
    pub fn code(&self) -> i32 {
        self.reports.iter().fold(0, |acc, r| acc | r.outcome.code())
    }

    /// Steps with at least one failed process.
    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.reports.iter().filter(|r| !r.outcome.is_success())
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_success() {
            return write!(f, "{} succeeded ({} steps)", self.action, self.reports.len());
        }
        write!(f, "{} failed:", self.action)?;
        for report in self.failed_steps() {
            write!(f, " {}/{}", report.op, report.step)?;
            for failure in report.outcome.failures() {
                write!(f, " [{}]", failure.status)?;
            }
        }
        Ok(())
    }
}
