//! Background task state machine.

/// Lifecycle state of a scheduled transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Transaction has been handed over but not yet launched.
    #[default]
    Created,
    /// Rule sequence is executing on the background thread.
    Running,
    /// Rule sequence has finished; the outcome has been logged.
    Done,
}

impl TaskState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Running
    /// - Running -> Done
    pub fn can_transition_to(&self, target: TaskState) -> bool {
        use TaskState::*;
        matches!((*self, target), (Created, Running) | (Running, Done))
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: TaskState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::RuleError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done)
    }
}
