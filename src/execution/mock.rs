//! Mock command runner for testing.
//!
//! [`RecordingRunner`] never launches a process. It records every argument
//! vector it is asked to run and answers with a scripted [`RunStatus`], so
//! rule sequences can be checked without privileged tools.
//!
//! # Example
//!
//! ```
//! use tunnel_rules::execution::mock::RecordingRunner;
//! use tunnel_rules::execution::{CommandRunner, RunStatus};
//!
//! let runner = RecordingRunner::failing_when(|argv| argv.iter().any(|a| a == "del"));
//! let argv = vec!["ip".to_string(), "-4".to_string(), "route".to_string(), "del".to_string()];
//! assert_eq!(runner.run(&argv, true), RunStatus::NonZeroExit(1));
//! assert_eq!(runner.calls().len(), 1);
//! ```

use std::sync::Mutex;

use super::runner::{CommandRunner, RunStatus};

/// A recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub argv: Vec<String>,
    pub silent: bool,
}

type Responder = Box<dyn Fn(&[String]) -> RunStatus + Send + Sync>;

/// [`CommandRunner`] that records calls instead of executing them.
pub struct RecordingRunner {
    calls: Mutex<Vec<RecordedCall>>,
    responder: Responder,
}

impl RecordingRunner {
    /// Runner where every command succeeds.
    pub fn new() -> Self {
        Self::with_status(|_| RunStatus::Success)
    }

    /// Runner answering each call with `responder(argv)`.
    pub fn with_status<F>(responder: F) -> Self
    where
        F: Fn(&[String]) -> RunStatus + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Runner where calls matching `predicate` exit with status 1.
    pub fn failing_when<F>(predicate: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        Self::with_status(move |argv| {
            if predicate(argv) {
                RunStatus::NonZeroExit(1)
            } else {
                RunStatus::Success
            }
        })
    }

    /// Snapshot of the calls made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Recorded argument vectors, in call order.
    pub fn argvs(&self) -> Vec<Vec<String>> {
        self.calls().into_iter().map(|c| c.argv).collect()
    }
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, argv: &[String], silent: bool) -> RunStatus {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                argv: argv.to_vec(),
                silent,
            });
        }
        (self.responder)(argv)
    }
}
