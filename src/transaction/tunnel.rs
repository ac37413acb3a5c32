//! Tunnel description and rule vocabulary.

use std::fmt;
use std::str::FromStr;

use crate::execution::AddressFamily;

/// Addresses and routing parameters of one tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Tunnel-facing interface.
    pub in_iface: String,
    /// Upstream-facing interface.
    pub out_iface: String,
    /// Gateway installed in the dedicated table.
    pub next_hop: String,
    /// Routing table holding tunnel routes.
    pub table_id: String,
    /// Local tunnel-endpoint address.
    pub local_addr: String,
    /// Remote tunnel-peer address.
    pub remote_addr: String,
    /// Family used for `ip rule` and `ip route`.
    pub family: AddressFamily,
    /// Other consumers of the shared route. Non-zero keeps it on revert.
    pub ref_count: u32,
}

/// What a transaction does when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Install all rules.
    Apply,
    /// Remove all rules.
    Revert,
    /// Remove, then install again.
    Reset,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Apply => write!(f, "apply"),
            Action::Revert => write!(f, "revert"),
            Action::Reset => write!(f, "reset"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apply" | "enable" | "on" => Ok(Action::Apply),
            "revert" | "disable" | "off" => Ok(Action::Revert),
            "reset" => Ok(Action::Reset),
            _ => Err(format!("unknown action: {}", s)),
        }
    }
}

/// Direction of a rule step: install or remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Delete,
}

impl Op {
    /// iptables chain operation.
    pub fn iptables_flag(self) -> &'static str {
        match self {
            Op::Add => "-I",
            Op::Delete => "-D",
        }
    }

    /// `ip rule` / `ip route` verb.
    pub fn ip_verb(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Delete => "del",
        }
    }

    /// `ndc ipfwd` verb.
    pub fn forwarding_verb(self) -> &'static str {
        match self {
            Op::Add => "enable",
            Op::Delete => "disable",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Add => write!(f, "add"),
            Op::Delete => write!(f, "delete"),
        }
    }
}

/// The rules a transaction manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    /// IP forwarding on the tunnel interface.
    Forwarding,
    /// Policy rule sending marked tunnel traffic to the tunnel table.
    PolicyRule,
    /// Next-hop route in the tunnel table. Shared between tunnels.
    NextHopRoute,
    /// Mark on packets entering from the tunnel.
    ForwardMark,
    /// Forward accept between the two interfaces.
    ForwardAccept,
    /// Power-save/dozable exemption for traffic to the peer.
    PowerSaveOutput,
    /// Data-saver exemption, outbound, matched on the local address.
    DataSaverOutputSource,
    /// Data-saver exemption, outbound, matched on the peer address.
    DataSaverOutputDestination,
    /// Power-save/dozable exemption for inbound upstream traffic.
    PowerSaveInput,
    /// Data-saver exemption, inbound, matched on the local address.
    DataSaverInputDestination,
    /// Data-saver exemption, inbound, matched on the peer address.
    DataSaverInputSource,
}

const APPLY_SEQUENCE: [Step; 11] = [
    Step::Forwarding,
    Step::PolicyRule,
    Step::NextHopRoute,
    Step::ForwardMark,
    Step::ForwardAccept,
    Step::PowerSaveOutput,
    Step::DataSaverOutputSource,
    Step::DataSaverOutputDestination,
    Step::PowerSaveInput,
    Step::DataSaverInputDestination,
    Step::DataSaverInputSource,
];

// Firewall steps in apply order, routing removed last.
const REVERT_SEQUENCE: [Step; 11] = [
    Step::Forwarding,
    Step::ForwardMark,
    Step::ForwardAccept,
    Step::PowerSaveOutput,
    Step::DataSaverOutputSource,
    Step::DataSaverOutputDestination,
    Step::PowerSaveInput,
    Step::DataSaverInputDestination,
    Step::DataSaverInputSource,
    Step::PolicyRule,
    Step::NextHopRoute,
];

impl Step {
    /// Steps in execution order for `op`.
    pub fn sequence(op: Op) -> &'static [Step] {
        match op {
            Op::Add => &APPLY_SEQUENCE,
            Op::Delete => &REVERT_SEQUENCE,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Forwarding => "forwarding",
            Step::PolicyRule => "policy-rule",
            Step::NextHopRoute => "next-hop-route",
            Step::ForwardMark => "forward-mark",
            Step::ForwardAccept => "forward-accept",
            Step::PowerSaveOutput => "power-save-output",
            Step::DataSaverOutputSource => "data-saver-output-source",
            Step::DataSaverOutputDestination => "data-saver-output-destination",
            Step::PowerSaveInput => "power-save-input",
            Step::DataSaverInputDestination => "data-saver-input-destination",
            Step::DataSaverInputSource => "data-saver-input-source",
        };
        f.write_str(name)
    }
}
