//! Rule transaction: the apply and revert sequences.

use std::sync::Arc;

use tracing::{error, info};

use super::id::TransactionId;
use super::tunnel::{Action, Op, Step, TunnelConfig};
use crate::config::{Binaries, Chains, Config};
use crate::execution::{
    CommandDispatcher, CommandRunner, IptablesTarget, RuleCommand, TransactionOutcome,
};

/// Mark set on packets entering from the tunnel interface.
pub const FORWARD_MARK: &str = "0x10000";

/// fwmark match of the policy rule.
pub const POLICY_FWMARK: &str = "0x0/0xffff";

/// Priority of the policy rule.
pub const POLICY_RULE_PRIORITY: &str = "25000";

/// The coordinated rule set of one tunnel, and the action to take on it.
///
/// Every rule is described once, parameterized by [`Op`], so each add in
/// [`apply`](Self::apply) has a delete in [`revert`](Self::revert) with the
/// same match criteria. Steps never stop early: a failed step is recorded
/// and the next one is attempted.
pub struct RuleTransaction {
    id: TransactionId,
    tunnel: TunnelConfig,
    action: Action,
    binaries: Binaries,
    chains: Chains,
    silent_revert: bool,
    runner: Arc<dyn CommandRunner>,
}

impl RuleTransaction {
    /// Create a transaction using default tool paths and chain names.
    pub fn new(tunnel: TunnelConfig, action: Action, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            id: TransactionId::new(),
            tunnel,
            action,
            binaries: Binaries::default(),
            chains: Chains::default(),
            silent_revert: false,
            runner,
        }
    }

    /// Take tool paths, chain names and revert behavior from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.binaries = config.binaries.clone();
        self.chains = config.chains.clone();
        self.silent_revert = config.rules.silent_revert;
        self
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn tunnel(&self) -> &TunnelConfig {
        &self.tunnel
    }

    pub fn binaries(&self) -> &Binaries {
        &self.binaries
    }

    /// Ordered commands issued for `op`.
    ///
    /// Deleting the next-hop route is left out while other consumers still
    /// hold a reference to it.
    pub fn plan(&self, op: Op) -> Vec<(Step, RuleCommand)> {
        let silent = op == Op::Delete && self.silent_revert;
        Step::sequence(op)
            .iter()
            .copied()
            .filter(|step| {
                !(op == Op::Delete && *step == Step::NextHopRoute && self.tunnel.ref_count != 0)
            })
            .map(|step| (step, self.command(step, op).silent(silent)))
            .collect()
    }

    fn command(&self, step: Step, op: Op) -> RuleCommand {
        let t = &self.tunnel;
        let c = &self.chains;
        let flag = op.iptables_flag();
        let local = IptablesTarget::for_address(t.local_addr.as_str());
        let remote = IptablesTarget::for_address(t.remote_addr.as_str());

        match step {
            Step::Forwarding => {
                RuleCommand::ndc("ipfwd", [op.forwarding_verb(), t.in_iface.as_str()])
            }
            Step::PolicyRule => RuleCommand::ip(
                t.family,
                [
                    "rule",
                    op.ip_verb(),
                    "from",
                    "all",
                    "iif",
                    t.in_iface.as_str(),
                    "fwmark",
                    POLICY_FWMARK,
                    "lookup",
                    t.table_id.as_str(),
                    "prio",
                    POLICY_RULE_PRIORITY,
                ],
            ),
            Step::NextHopRoute => RuleCommand::ip(
                t.family,
                [
                    "route",
                    op.ip_verb(),
                    t.next_hop.as_str(),
                    "dev",
                    t.out_iface.as_str(),
                    "table",
                    t.table_id.as_str(),
                ],
            ),
            Step::ForwardMark => RuleCommand::firewall(
                IptablesTarget::V4V6,
                [
                    "-t",
                    "mangle",
                    flag,
                    c.mangle_prerouting.as_str(),
                    "-i",
                    t.in_iface.as_str(),
                    "-j",
                    "MARK",
                    "--set-mark",
                    FORWARD_MARK,
                ],
            ),
            Step::ForwardAccept => filter_rule(
                IptablesTarget::V4V6,
                flag,
                &c.forward,
                &["-i", &t.in_iface, "-o", &t.out_iface],
                "ACCEPT",
            ),
            Step::PowerSaveOutput => filter_rule(
                IptablesTarget::V4V6,
                flag,
                &c.output,
                &["-o", &t.out_iface, "-d", &t.remote_addr],
                "RETURN",
            ),
            Step::DataSaverOutputSource => filter_rule(
                local,
                flag,
                &c.happy_box,
                &["-o", &t.out_iface, "-s", &t.local_addr],
                "RETURN",
            ),
            Step::DataSaverOutputDestination => filter_rule(
                remote,
                flag,
                &c.happy_box,
                &["-o", &t.out_iface, "-d", &t.remote_addr],
                "RETURN",
            ),
            Step::PowerSaveInput => filter_rule(
                IptablesTarget::V4V6,
                flag,
                &c.input,
                &["-i", &t.out_iface],
                "RETURN",
            ),
            Step::DataSaverInputDestination => filter_rule(
                local,
                flag,
                &c.happy_box,
                &["-i", &t.out_iface, "-d", &t.local_addr],
                "RETURN",
            ),
            Step::DataSaverInputSource => filter_rule(
                remote,
                flag,
                &c.happy_box,
                &["-i", &t.out_iface, "-s", &t.remote_addr],
                "RETURN",
            ),
        }
    }

    fn execute(&self, op: Op, action: Action) -> TransactionOutcome {
        let dispatcher = CommandDispatcher::new(self.runner.as_ref(), &self.binaries);
        let mut outcome = TransactionOutcome::new(action);
        for (step, command) in self.plan(op) {
            outcome.record(step, op, dispatcher.dispatch(&command));
        }
        outcome
    }

    /// Install every rule.
    pub fn apply(&self) -> TransactionOutcome {
        self.execute(Op::Add, Action::Apply)
    }

    /// Remove every rule.
    pub fn revert(&self) -> TransactionOutcome {
        self.execute(Op::Delete, Action::Revert)
    }

    /// Revert, then apply regardless of how the revert went.
    pub fn reset(&self) -> TransactionOutcome {
        let reverted = self.revert();
        let applied = self.apply();
        TransactionOutcome::new(Action::Reset)
            .merge(reverted)
            .merge(applied)
    }

    /// Run the configured action and log its outcome.
    pub fn run(&self) -> TransactionOutcome {
        let outcome = match self.action {
            Action::Apply => self.apply(),
            Action::Revert => self.revert(),
            Action::Reset => self.reset(),
        };

        if outcome.is_success() {
            info!(
                txn = %self.id,
                "{} rules successfully from {} to {}",
                self.action,
                self.tunnel.in_iface,
                self.tunnel.out_iface
            );
        } else {
            error!(
                txn = %self.id,
                code = outcome.code(),
                "{} rules failed from {} to {}: {}",
                self.action,
                self.tunnel.in_iface,
                self.tunnel.out_iface,
                outcome
            );
        }

        outcome
    }
}

fn filter_rule(
    target: IptablesTarget,
    flag: &str,
    chain: &str,
    matches: &[&str],
    verdict: &str,
) -> RuleCommand {
    let head = ["-t", "filter", flag, chain];
    let tail = ["-j", verdict];
    RuleCommand::firewall(
        target,
        head.iter().chain(matches).chain(tail.iter()).copied(),
    )
}

impl std::fmt::Debug for RuleTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleTransaction")
            .field("id", &self.id)
            .field("tunnel", &self.tunnel)
            .field("action", &self.action)
            .field("silent_revert", &self.silent_revert)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::mock::capture::LogCapture;
    use crate::execution::mock::RecordingRunner;
    use crate::execution::AddressFamily;
    use tracing::Level;

    fn tunnel() -> TunnelConfig {
        TunnelConfig {
            in_iface: "rmnet_ipa0".into(),
            out_iface: "wlan0".into(),
            next_hop: "10.0.0.1".into(),
            table_id: "61".into(),
            local_addr: "10.0.0.2".into(),
            remote_addr: "2001:db8::1".into(),
            family: AddressFamily::Inet,
            ref_count: 0,
        }
    }

    fn transaction(tunnel: TunnelConfig, runner: Arc<RecordingRunner>) -> RuleTransaction {
        RuleTransaction::new(tunnel, Action::Apply, runner)
    }

    fn normalized(args: &[String]) -> Vec<String> {
        args.iter()
            .map(|a| match a.as_str() {
                "-D" => "-I".to_string(),
                "del" => "add".to_string(),
                "disable" => "enable".to_string(),
                other => other.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_apply_plan_order() {
        let txn = transaction(tunnel(), Arc::new(RecordingRunner::new()));
        let steps: Vec<_> = txn.plan(Op::Add).into_iter().map(|(s, _)| s).collect();
        assert_eq!(steps, Step::sequence(Op::Add));
    }

    #[test]
    fn test_revert_mirrors_apply() {
        let txn = transaction(tunnel(), Arc::new(RecordingRunner::new()));
        let bins = Binaries::default();

        let mut added: Vec<_> = txn
            .plan(Op::Add)
            .into_iter()
            .map(|(s, c)| (s, c.argv_list(&bins)))
            .collect();
        let mut deleted: Vec<_> = txn
            .plan(Op::Delete)
            .into_iter()
            .map(|(s, c)| {
                let argvs: Vec<Vec<String>> =
                    c.argv_list(&bins).iter().map(|a| normalized(a)).collect();
                (s, argvs)
            })
            .collect();
        added.sort();
        deleted.sort();

        assert_eq!(added, deleted);
    }

    #[test]
    fn test_delete_uses_delete_flags() {
        let txn = transaction(tunnel(), Arc::new(RecordingRunner::new()));
        for (_, command) in txn.plan(Op::Delete) {
            let args = match command {
                RuleCommand::Firewall { args, .. } => args,
                RuleCommand::Ip { args, .. } => args,
                RuleCommand::Ndc { args, .. } => args,
            };
            assert!(!args.iter().any(|a| a == "-I" || a == "add" || a == "enable"));
        }
    }

    #[test]
    fn test_data_saver_family_per_address() {
        let txn = transaction(tunnel(), Arc::new(RecordingRunner::new()));
        let plan = txn.plan(Op::Add);
        let target = |step: Step| {
            plan.iter()
                .find_map(|(s, c)| match c {
                    RuleCommand::Firewall { target, .. } if *s == step => Some(*target),
                    _ => None,
                })
                .unwrap()
        };

        assert_eq!(target(Step::DataSaverOutputSource), IptablesTarget::V4);
        assert_eq!(target(Step::DataSaverOutputDestination), IptablesTarget::V6);
        assert_eq!(target(Step::DataSaverInputDestination), IptablesTarget::V4);
        assert_eq!(target(Step::DataSaverInputSource), IptablesTarget::V6);
        assert_eq!(target(Step::PowerSaveOutput), IptablesTarget::V4V6);
    }

    #[test]
    fn test_apply_success() {
        let runner = Arc::new(RecordingRunner::new());
        let txn = transaction(tunnel(), runner.clone());

        let outcome = txn.apply();
        assert!(outcome.is_success());
        assert_eq!(outcome.code(), 0);
        assert_eq!(outcome.reports.len(), 11);
        assert_eq!(runner.calls().len(), 15);

        let argvs = runner.argvs();
        assert_eq!(
            argvs[0],
            vec!["/system/bin/ndc-wrapper-1.0", "ipfwd", "enable", "rmnet_ipa0"]
        );
        assert_eq!(
            argvs[1],
            vec![
                "/system/bin/ip-wrapper-1.0", "-4", "rule", "add", "from", "all", "iif",
                "rmnet_ipa0", "fwmark", "0x0/0xffff", "lookup", "61", "prio", "25000",
            ]
        );
        assert_eq!(
            argvs[2],
            vec![
                "/system/bin/ip-wrapper-1.0", "-4", "route", "add", "10.0.0.1", "dev", "wlan0",
                "table", "61",
            ]
        );
    }

    #[test]
    fn test_apply_no_early_exit() {
        let runner = Arc::new(RecordingRunner::failing_when(|argv| {
            argv.iter().any(|a| a == "route")
        }));
        let txn = transaction(tunnel(), runner.clone());

        let outcome = txn.apply();
        assert!(!outcome.is_success());
        assert_ne!(outcome.code(), 0);
        assert_eq!(outcome.reports.len(), 11);
        assert_eq!(runner.calls().len(), 15);
        let failed: Vec<_> = outcome.failed_steps().map(|r| r.step).collect();
        assert_eq!(failed, vec![Step::NextHopRoute]);
    }

    #[test]
    fn test_revert_keeps_shared_route() {
        let runner = Arc::new(RecordingRunner::failing_when(|argv| {
            argv.iter().any(|a| a == "route")
        }));
        let txn = transaction(
            TunnelConfig {
                ref_count: 2,
                ..tunnel()
            },
            runner.clone(),
        );

        let outcome = txn.revert();
        assert!(outcome.is_success());
        assert_eq!(outcome.reports.len(), 10);
        assert!(!runner
            .argvs()
            .iter()
            .any(|argv| argv.iter().any(|a| a == "route")));
    }

    #[test]
    fn test_revert_deletes_route_last() {
        let runner = Arc::new(RecordingRunner::new());
        let txn = transaction(tunnel(), runner.clone());

        let outcome = txn.revert();
        assert!(outcome.is_success());
        assert_eq!(outcome.reports.len(), 11);
        let argvs = runner.argvs();
        assert_eq!(argvs.len(), 15);
        assert_eq!(&argvs[0][1..], &["ipfwd", "disable", "rmnet_ipa0"]);
        assert_eq!(&argvs[14][1..4], &["-4", "route", "del"]);
    }

    #[test]
    fn test_reset_applies_after_failed_revert() {
        let runner = Arc::new(RecordingRunner::failing_when(|argv| {
            argv.iter().any(|a| a == "-D")
        }));
        let txn = transaction(tunnel(), runner.clone());

        let outcome = txn.reset();
        assert_eq!(outcome.action, Action::Reset);
        assert!(!outcome.is_success());
        assert_eq!(outcome.reports.len(), 22);
        assert_eq!(runner.calls().len(), 30);

        let ops: Vec<_> = outcome.reports.iter().map(|r| r.op).collect();
        assert!(ops[..11].iter().all(|op| *op == Op::Delete));
        assert!(ops[11..].iter().all(|op| *op == Op::Add));
        assert!(outcome.failed_steps().all(|r| r.op == Op::Delete));
    }

    #[test]
    fn test_silent_revert() {
        let runner = Arc::new(RecordingRunner::new());
        let mut config = Config::default();
        config.rules.silent_revert = true;
        let txn = transaction(tunnel(), runner.clone()).with_config(&config);

        txn.reset();
        let calls = runner.calls();
        assert!(calls[..15].iter().all(|c| c.silent));
        assert!(calls[15..].iter().all(|c| !c.silent));
    }

    #[test]
    fn test_custom_chains() {
        let runner = Arc::new(RecordingRunner::new());
        let mut config = Config::default();
        config.chains.happy_box = "oem_happy_box".into();
        config.binaries.iptables = "/sbin/iptables".into();
        let txn = transaction(tunnel(), runner.clone()).with_config(&config);

        txn.apply();
        let happy: Vec<_> = runner
            .argvs()
            .into_iter()
            .filter(|argv| argv.iter().any(|a| a == "oem_happy_box"))
            .collect();
        assert_eq!(happy.len(), 4);
        assert!(runner
            .argvs()
            .iter()
            .any(|argv| argv[0] == "/sbin/iptables"));
    }

    #[test]
    fn test_run_dispatches_action() {
        let runner = Arc::new(RecordingRunner::new());
        let txn = RuleTransaction::new(tunnel(), Action::Revert, runner.clone());

        let outcome = txn.run();
        assert_eq!(outcome.action, Action::Revert);
        assert!(outcome.reports.iter().all(|r| r.op == Op::Delete));
    }

    #[test]
    fn test_run_logs_each_builder_call() {
        let runner = Arc::new(RecordingRunner::failing_when(|argv| {
            argv.iter().any(|a| a == "route")
        }));
        let txn = RuleTransaction::new(tunnel(), Action::Apply, runner);
        let logs = LogCapture::default();

        logs.run(|| txn.run());

        let infos = logs.messages(Level::INFO);
        assert_eq!(infos.len(), 11);
        assert!(infos
            .iter()
            .all(|line| !line.split(' ').any(|t| matches!(t, "-w" | "-4" | "-6"))));
        assert_eq!(infos[0], "ndc ipfwd enable rmnet_ipa0");
        assert_eq!(infos[2], "ip route add 10.0.0.1 dev wlan0 table 61");
        assert_eq!(
            infos[3],
            "iptables -t mangle -I PREROUTING -i rmnet_ipa0 -j MARK --set-mark 0x10000"
        );

        let errors = logs.messages(Level::ERROR);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("apply rules failed from rmnet_ipa0 to wlan0"));
        assert!(errors[0].contains("next-hop-route"));
    }

    #[test]
    fn test_run_logs_success_line() {
        let runner = Arc::new(RecordingRunner::new());
        let txn = RuleTransaction::new(tunnel(), Action::Revert, runner);
        let logs = LogCapture::default();

        logs.run(|| txn.run());

        let infos = logs.messages(Level::INFO);
        assert_eq!(infos.len(), 12);
        assert_eq!(
            infos.last().map(String::as_str),
            Some("revert rules successfully from rmnet_ipa0 to wlan0")
        );
        assert!(logs.messages(Level::ERROR).is_empty());
    }
}
