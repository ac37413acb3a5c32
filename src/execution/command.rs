//! Command building and dispatch for the external rule tools.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use super::result::{CommandFailure, CommandOutcome};
use super::runner::CommandRunner;
use crate::config::Binaries;

/// Flag making iptables wait for the xtables lock instead of failing.
pub const IPTABLES_WAIT_FLAG: &str = "-w";

/// Which iptables binaries a firewall command is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IptablesTarget {
    V4,
    V6,
    V4V6,
}

impl IptablesTarget {
    /// Target for a rule matching a single address literal.
    ///
    /// Anything containing a colon is treated as IPv6; everything else,
    /// including the empty string, as IPv4.
    pub fn for_address(addr: &str) -> Self {
        if addr.contains(':') {
            IptablesTarget::V6
        } else {
            IptablesTarget::V4
        }
    }

    /// Whether the IPv4 binary is invoked.
    pub fn includes_v4(self) -> bool {
        matches!(self, IptablesTarget::V4 | IptablesTarget::V4V6)
    }

    /// Whether the IPv6 binary is invoked.
    pub fn includes_v6(self) -> bool {
        matches!(self, IptablesTarget::V6 | IptablesTarget::V4V6)
    }
}

/// Address family of the tunnel, selecting the `ip` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    #[default]
    Inet,
    Inet6,
}

impl AddressFamily {
    /// Selector passed as the first argument to `ip`.
    pub fn selector(self) -> &'static str {
        match self {
            AddressFamily::Inet => "-4",
            AddressFamily::Inet6 => "-6",
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Inet => write!(f, "inet"),
            AddressFamily::Inet6 => write!(f, "inet6"),
        }
    }
}

impl FromStr for AddressFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "4" | "inet" | "ipv4" | "v4" => Ok(AddressFamily::Inet),
            "6" | "inet6" | "ipv6" | "v6" => Ok(AddressFamily::Inet6),
            _ => Err(format!("unknown address family: {}", s)),
        }
    }
}

/// One builder invocation, described as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCommand {
    /// `iptables`/`ip6tables -w <args>`.
    Firewall {
        target: IptablesTarget,
        args: Vec<String>,
        silent: bool,
    },
    /// `ip -4|-6 <args>`.
    Ip {
        family: AddressFamily,
        args: Vec<String>,
        silent: bool,
    },
    /// `ndc <subcommand> <args>`.
    Ndc {
        subcommand: String,
        args: Vec<String>,
        silent: bool,
    },
}

impl RuleCommand {
    /// Firewall command sent to the binaries selected by `target`.
    pub fn firewall<I, S>(target: IptablesTarget, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleCommand::Firewall {
            target,
            args: collect(args),
            silent: false,
        }
    }

    /// Routing command for one address family.
    pub fn ip<I, S>(family: AddressFamily, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleCommand::Ip {
            family,
            args: collect(args),
            silent: false,
        }
    }

    /// Forwarding-control command.
    pub fn ndc<I, S>(subcommand: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RuleCommand::Ndc {
            subcommand: subcommand.into(),
            args: collect(args),
            silent: false,
        }
    }

    /// Set whether failures are logged.
    pub fn silent(mut self, value: bool) -> Self {
        match &mut self {
            RuleCommand::Firewall { silent, .. }
            | RuleCommand::Ip { silent, .. }
            | RuleCommand::Ndc { silent, .. } => *silent = value,
        }
        self
    }

    /// Whether failures are logged.
    pub fn is_silent(&self) -> bool {
        match self {
            RuleCommand::Firewall { silent, .. }
            | RuleCommand::Ip { silent, .. }
            | RuleCommand::Ndc { silent, .. } => *silent,
        }
    }

    /// Arguments as logged: without the binary and without any synthesized
    /// lock flag or family selector.
    pub fn display_args(&self) -> String {
        match self {
            RuleCommand::Firewall { args, .. } | RuleCommand::Ip { args, .. } => args.join(" "),
            RuleCommand::Ndc {
                subcommand, args, ..
            } => std::iter::once(subcommand.as_str())
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Concrete argument vectors, one per process this command launches.
    pub fn argv_list(&self, binaries: &Binaries) -> Vec<Vec<String>> {
        match self {
            RuleCommand::Firewall { target, args, .. } => {
                let mut out = Vec::with_capacity(2);
                if target.includes_v4() {
                    out.push(firewall_argv(&binaries.iptables, args));
                }
                if target.includes_v6() {
                    out.push(firewall_argv(&binaries.ip6tables, args));
                }
                out
            }
            RuleCommand::Ip { family, args, .. } => {
                let mut argv = Vec::with_capacity(args.len() + 2);
                argv.push(binaries.ip.clone());
                argv.push(family.selector().to_string());
                argv.extend(args.iter().cloned());
                vec![argv]
            }
            RuleCommand::Ndc {
                subcommand, args, ..
            } => {
                let mut argv = Vec::with_capacity(args.len() + 2);
                argv.push(binaries.ndc.clone());
                argv.push(subcommand.clone());
                argv.extend(args.iter().cloned());
                vec![argv]
            }
        }
    }

    fn tool(&self) -> &'static str {
        match self {
            RuleCommand::Firewall { .. } => "iptables",
            RuleCommand::Ip { .. } => "ip",
            RuleCommand::Ndc { .. } => "ndc",
        }
    }
}

fn collect<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter().map(Into::into).collect()
}

fn firewall_argv(binary: &str, args: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    argv.push(binary.to_string());
    argv.push(IPTABLES_WAIT_FLAG.to_string());
    argv.extend(args.iter().cloned());
    argv
}

/// Executes [`RuleCommand`]s through a [`CommandRunner`].
///
/// Every process a command launches is attempted; failures are collected
/// rather than short-circuiting.
pub struct CommandDispatcher<'a> {
    runner: &'a dyn CommandRunner,
    binaries: &'a Binaries,
}

impl<'a> CommandDispatcher<'a> {
    /// Create a dispatcher over the given runner and tool paths.
    pub fn new(runner: &'a dyn CommandRunner, binaries: &'a Binaries) -> Self {
        Self { runner, binaries }
    }

    /// Run a firewall command against the selected iptables binaries.
    pub fn fw(&self, target: IptablesTarget, args: &[&str]) -> CommandOutcome {
        self.dispatch(&RuleCommand::firewall(target, args.iter().copied()))
    }

    /// Like [`fw`](Self::fw) but without failure diagnostics.
    pub fn fw_silently(&self, target: IptablesTarget, args: &[&str]) -> CommandOutcome {
        self.dispatch(&RuleCommand::firewall(target, args.iter().copied()).silent(true))
    }

    /// Run a routing command for one address family.
    pub fn ip(&self, family: AddressFamily, args: &[&str]) -> CommandOutcome {
        self.dispatch(&RuleCommand::ip(family, args.iter().copied()))
    }

    /// Run a forwarding-control subcommand.
    pub fn ndc(&self, subcommand: &str, args: &[&str]) -> CommandOutcome {
        self.dispatch(&RuleCommand::ndc(subcommand, args.iter().copied()))
    }

    /// Run a prepared command.
    pub fn dispatch(&self, command: &RuleCommand) -> CommandOutcome {
        info!("{} {}", command.tool(), command.display_args());

        let silent = command.is_silent();
        let mut outcome = CommandOutcome::default();
        for argv in command.argv_list(self.binaries) {
            let status = self.runner.run(&argv, silent);
            if !status.is_success() {
                outcome.push(CommandFailure { argv, status });
            }
        }
        outcome
    }
}
