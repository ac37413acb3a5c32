//! Rule transactions.
//!
//! A [`RuleTransaction`] owns one tunnel's routing and firewall parameters
//! and knows how to install ([`Action::Apply`]), remove ([`Action::Revert`])
//! or reinstall ([`Action::Reset`]) the full rule set. [`RuleTransaction::start`]
//! runs it on a background thread.

mod id;
mod rules;
mod scheduler;
mod state;
mod tunnel;

pub use id::TransactionId;
pub use rules::{RuleTransaction, FORWARD_MARK, POLICY_FWMARK, POLICY_RULE_PRIORITY};
pub use scheduler::TransactionHandle;
pub use state::TaskState;
pub use tunnel::{Action, Op, Step, TunnelConfig};
