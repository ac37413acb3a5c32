//! External command execution.
//!
//! This module provides the plumbing between rule definitions and the
//! privileged network tools:
//! - [`CommandRunner`]: run one argument vector, report a [`RunStatus`]
//! - [`CommandDispatcher`]: fan a [`RuleCommand`] out to the right binaries
//! - [`TransactionOutcome`]: typed aggregate of every step's result
//!
//! # Example
//!
//! ```no_run
//! use tunnel_rules::config::Binaries;
//! use tunnel_rules::execution::{CommandDispatcher, IptablesTarget, ProcessRunner};
//!
//! let runner = ProcessRunner::new();
//! let binaries = Binaries::default();
//! let dispatcher = CommandDispatcher::new(&runner, &binaries);
//!
//! let outcome = dispatcher.fw(IptablesTarget::V4V6, &["-t", "filter", "-L", "fw_INPUT"]);
//! println!("result code: {}", outcome.code());
//! ```

mod command;
pub mod mock;
mod result;
mod runner;

pub use command::{AddressFamily, CommandDispatcher, IptablesTarget, RuleCommand, IPTABLES_WAIT_FLAG};
pub use result::{CommandFailure, CommandOutcome, StepReport, TransactionOutcome};
pub use runner::{
    CommandRunner, ProcessExit, ProcessLauncher, ProcessRunner, RunStatus, SystemLauncher,
    ABNORMAL_EXIT_CODE,
};
