//! # tunnel-rules
//!
//! Policy routing and firewall exception rules for IMS/ePDG tunnel handoff.
//!
//! This crate installs and removes the coordinated set of `ip rule`,
//! `ip route`, `ndc ipfwd` and `iptables`/`ip6tables` rules that steer a
//! tunnel interface's traffic through a dedicated routing table, while
//! exempting the tunnel from power-save and data-saver firewall chains.
//!
//! ## Features
//!
//! - **Symmetric rule sets**: every rule is defined once and issued as an add
//!   on apply and as a delete on revert
//! - **Best-effort execution**: all steps are attempted; failures are
//!   collected into a typed [`TransactionOutcome`]
//! - **Background execution**: transactions run on a detached thread and
//!   report through a [`TransactionHandle`]
//! - **Testable**: the process launcher sits behind [`CommandRunner`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tunnel_rules::{Action, ProcessRunner, RuleTransaction, TunnelConfig};
//!
//! fn main() -> tunnel_rules::Result<()> {
//!     tunnel_rules::logging::try_init().ok();
//!
//!     let tunnel = TunnelConfig {
//!         in_iface: "rmnet_ipa0".into(),
//!         out_iface: "wlan0".into(),
//!         next_hop: "10.0.0.1".into(),
//!         table_id: "61".into(),
//!         local_addr: "10.0.0.2".into(),
//!         remote_addr: "2001:db8::1".into(),
//!         ..TunnelConfig::default()
//!     };
//!
//!     let txn = RuleTransaction::new(tunnel, Action::Apply, Arc::new(ProcessRunner::new()));
//!     let outcome = txn.start()?.wait()?;
//!     println!("{}", outcome);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod transaction;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, RuleError};
pub use execution::{
    AddressFamily, CommandRunner, IptablesTarget, ProcessRunner, RunStatus, TransactionOutcome,
};
pub use transaction::{
    Action, RuleTransaction, Step, TaskState, TransactionHandle, TransactionId, TunnelConfig,
};
