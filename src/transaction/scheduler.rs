//! Background execution of rule transactions.
//!
//! Each started transaction runs on its own detached thread. The caller gets
//! a [`TransactionHandle`] back immediately; it may await the outcome, poll
//! the task state, or simply drop the handle.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::oneshot;
use tracing::debug;

use super::id::TransactionId;
use super::rules::RuleTransaction;
use super::state::TaskState;
use crate::error::RuleError;
use crate::execution::TransactionOutcome;
use crate::Result;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a transaction running in the background.
#[derive(Debug)]
pub struct TransactionHandle {
    id: TransactionId,
    state: Arc<Mutex<TaskState>>,
    receiver: oneshot::Receiver<TransactionOutcome>,
}

impl TransactionHandle {
    /// ID of the running transaction.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Current task state.
    pub fn state(&self) -> Result<TaskState> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|_| RuleError::LockPoisoned)
    }

    /// Check if the background run has finished.
    pub fn is_done(&self) -> Result<bool> {
        self.state().map(|state| state.is_terminal())
    }

    /// Block until the outcome is available.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context; use
    /// [`outcome`](Self::outcome) there.
    pub fn wait(self) -> Result<TransactionOutcome> {
        self.receiver
            .blocking_recv()
            .map_err(|_| RuleError::ChannelClosed)
    }

    /// Wait asynchronously for the outcome.
    pub async fn outcome(self) -> Result<TransactionOutcome> {
        self.receiver.await.map_err(|_| RuleError::ChannelClosed)
    }
}

impl RuleTransaction {
    /// Run this transaction on a detached background thread.
    ///
    /// Returns as soon as the thread exists. If it cannot be created the
    /// transaction is dropped without running and
    /// [`RuleError::ThreadLaunch`] is returned.
    pub fn start(self) -> Result<TransactionHandle> {
        self.start_with(|name, task| {
            thread::Builder::new()
                .name(name)
                .spawn(task)
                .map(drop)
        })
    }

    pub(crate) fn start_with<S>(self, spawn: S) -> Result<TransactionHandle>
    where
        S: FnOnce(String, Task) -> io::Result<()>,
    {
        let id = self.id();
        let state = Arc::new(Mutex::new(TaskState::Created));
        let (sender, receiver) = oneshot::channel();

        transition(&state, TaskState::Running)?;

        let task_state = Arc::clone(&state);
        let task: Task = Box::new(move || {
            debug!(txn = %id, action = %self.action(), "transaction started");
            let outcome = self.run();
            drop(self);
            if let Err(e) = transition(&task_state, TaskState::Done) {
                debug!(txn = %id, "{}", e);
            }
            // Receiver may already be gone; the outcome has been logged.
            let _ = sender.send(outcome);
        });

        spawn(format!("rules-{}", id), task).map_err(RuleError::ThreadLaunch)?;

        Ok(TransactionHandle {
            id,
            state,
            receiver,
        })
    }
}

fn transition(state: &Mutex<TaskState>, target: TaskState) -> Result<()> {
    let mut guard = state.lock().map_err(|_| RuleError::LockPoisoned)?;
    guard.transition_to(target)
}
