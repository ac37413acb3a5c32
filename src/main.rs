//! tunnel-rules binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tunnel_rules::cli::{self, Args};
use tunnel_rules::transaction::Op;
use tunnel_rules::{logging, Action, Config, ProcessRunner, RuleTransaction};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'tunnel-rules --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> tunnel_rules::Result<bool> {
    let config = Config::load(&args)?;
    logging::try_init_with(config.log_filter()).ok();

    let action = args.action()?;
    let tunnel = args.tunnel()?;
    let txn = RuleTransaction::new(tunnel, action, Arc::new(ProcessRunner::new()))
        .with_config(&config);

    if args.dry_run {
        print_plan(&txn);
        return Ok(true);
    }

    info!("tunnel-rules v{}", env!("CARGO_PKG_VERSION"));
    let handle = txn.start()?;
    info!(txn = %handle.id(), "{} started", action);

    // The process must outlive the detached transaction thread.
    match handle.outcome().await {
        Ok(outcome) => Ok(outcome.is_success()),
        Err(e) => {
            error!("{}", e);
            Ok(false)
        }
    }
}

fn print_plan(txn: &RuleTransaction) {
    let ops: &[Op] = match txn.action() {
        Action::Apply => &[Op::Add],
        Action::Revert => &[Op::Delete],
        Action::Reset => &[Op::Delete, Op::Add],
    };

    for op in ops {
        for (step, command) in txn.plan(*op) {
            for argv in command.argv_list(txn.binaries()) {
                println!("# {} {}\n{}", op, step, argv.join(" "));
            }
        }
    }
}
