//! External process invocation.

use std::fmt;
use std::io;
use std::process::{Command, Stdio};

use tracing::error;

/// `ECHILD`, reported when a process did not terminate normally.
pub const ABNORMAL_EXIT_CODE: i32 = 10;

/// `EINVAL`, reported when asked to launch an empty argument vector.
const EMPTY_ARGV_CODE: i32 = 22;

/// How a launched process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Process exited normally with the given code.
    Code(i32),
    /// Process was terminated by a signal (or otherwise did not exit normally).
    Signaled,
}

/// Status of one external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Process exited with status zero.
    Success,
    /// Process could not be created.
    SpawnFailure { errno: Option<i32>, message: String },
    /// Process was killed by a signal.
    AbnormalExit,
    /// Process exited with a non-zero status.
    NonZeroExit(i32),
}

impl RunStatus {
    /// Numeric result: zero on success, non-zero otherwise.
    pub fn code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::SpawnFailure { errno, .. } => match errno {
                Some(e) if *e != 0 => *e,
                _ => 1,
            },
            RunStatus::AbnormalExit => ABNORMAL_EXIT_CODE,
            RunStatus::NonZeroExit(code) => *code,
        }
    }

    /// Check if the command succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }

    fn from_launch(result: io::Result<ProcessExit>) -> Self {
        match result {
            Ok(ProcessExit::Code(0)) => RunStatus::Success,
            Ok(ProcessExit::Code(code)) => RunStatus::NonZeroExit(code),
            Ok(ProcessExit::Signaled) => RunStatus::AbnormalExit,
            Err(e) => RunStatus::SpawnFailure {
                errno: e.raw_os_error(),
                message: e.to_string(),
            },
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::SpawnFailure { message, .. } => write!(f, "spawn failed: {}", message),
            RunStatus::AbnormalExit => write!(f, "terminated abnormally"),
            RunStatus::NonZeroExit(code) => write!(f, "exited with status {}", code),
        }
    }
}

/// Launches an external program and waits for it to exit.
///
/// `argv[0]` names the program; the rest are passed as its arguments.
pub trait ProcessLauncher: Send + Sync {
    fn execute(&self, argv: &[String]) -> io::Result<ProcessExit>;
}

/// [`ProcessLauncher`] backed by `std::process::Command`. No shell is involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn execute(&self, argv: &[String]) -> io::Result<ProcessExit> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            io::Error::from_raw_os_error(EMPTY_ARGV_CODE)
        })?;

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .status()?;

        Ok(match status.code() {
            Some(code) => ProcessExit::Code(code),
            None => ProcessExit::Signaled,
        })
    }
}

/// Runs one external command and reports its status.
///
/// Implementations block the calling thread until the process exits.
pub trait CommandRunner: Send + Sync {
    /// Run `argv`, emitting a diagnostic on failure unless `silent` is set.
    fn run(&self, argv: &[String], silent: bool) -> RunStatus;
}

/// Production [`CommandRunner`] that spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner<L = SystemLauncher> {
    launcher: L,
}

impl ProcessRunner<SystemLauncher> {
    /// Create a runner that launches processes directly.
    pub fn new() -> Self {
        Self {
            launcher: SystemLauncher,
        }
    }
}

impl<L: ProcessLauncher> ProcessRunner<L> {
    /// Create a runner over a custom launcher.
    pub fn with_launcher(launcher: L) -> Self {
        Self { launcher }
    }
}

impl<L: ProcessLauncher> CommandRunner for ProcessRunner<L> {
    fn run(&self, argv: &[String], silent: bool) -> RunStatus {
        let status = RunStatus::from_launch(self.launcher.execute(argv));
        if !status.is_success() && !silent {
            error!(
                code = status.code(),
                status = %status,
                "exec() failed for {}",
                argv.join(" ")
            );
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    struct FixedLauncher(fn() -> io::Result<ProcessExit>);

    impl ProcessLauncher for FixedLauncher {
        fn execute(&self, _argv: &[String]) -> io::Result<ProcessExit> {
            (self.0)()
        }
    }

    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for ErrorCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_errors(launcher: FixedLauncher, silent: bool) -> (RunStatus, usize) {
        let counter = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(counter.clone()));
        let runner = ProcessRunner::with_launcher(launcher);
        let argv = vec!["/system/bin/ip".to_string(), "-4".to_string()];
        let status = tracing::subscriber::with_default(subscriber, || runner.run(&argv, silent));
        (status, counter.load(Ordering::SeqCst))
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RunStatus::Success.code(), 0);
        assert_eq!(RunStatus::NonZeroExit(2).code(), 2);
        assert_eq!(RunStatus::AbnormalExit.code(), ABNORMAL_EXIT_CODE);
        let spawn = RunStatus::SpawnFailure {
            errno: Some(2),
            message: "No such file or directory".into(),
        };
        assert_eq!(spawn.code(), 2);
        let spawn = RunStatus::SpawnFailure {
            errno: None,
            message: "unknown".into(),
        };
        assert_eq!(spawn.code(), 1);
    }

    #[test]
    fn test_from_launch() {
        assert_eq!(
            RunStatus::from_launch(Ok(ProcessExit::Code(0))),
            RunStatus::Success
        );
        assert_eq!(
            RunStatus::from_launch(Ok(ProcessExit::Code(4))),
            RunStatus::NonZeroExit(4)
        );
        assert_eq!(
            RunStatus::from_launch(Ok(ProcessExit::Signaled)),
            RunStatus::AbnormalExit
        );
        let err = RunStatus::from_launch(Err(io::Error::from_raw_os_error(2)));
        assert!(matches!(err, RunStatus::SpawnFailure { errno: Some(2), .. }));
    }

    #[test]
    fn test_silent_suppresses_diagnostic() {
        let (status, errors) = count_errors(FixedLauncher(|| Ok(ProcessExit::Code(1))), true);
        assert_eq!(status, RunStatus::NonZeroExit(1));
        assert_eq!(errors, 0);

        let (_, errors) = count_errors(
            FixedLauncher(|| Err(io::Error::from_raw_os_error(2))),
            true,
        );
        assert_eq!(errors, 0);
    }

    #[test]
    fn test_failure_emits_diagnostic() {
        let (status, errors) = count_errors(FixedLauncher(|| Ok(ProcessExit::Signaled)), false);
        assert_eq!(status, RunStatus::AbnormalExit);
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_non_zero_exit_emits_diagnostic() {
        let (status, errors) = count_errors(FixedLauncher(|| Ok(ProcessExit::Code(3))), false);
        assert_eq!(status, RunStatus::NonZeroExit(3));
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_spawn_failure_emits_diagnostic() {
        let (status, errors) = count_errors(
            FixedLauncher(|| Err(io::Error::from_raw_os_error(2))),
            false,
        );
        assert!(matches!(status, RunStatus::SpawnFailure { errno: Some(2), .. }));
        assert_eq!(errors, 1);
    }

    #[test]
    fn test_success_is_quiet() {
        let (status, errors) = count_errors(FixedLauncher(|| Ok(ProcessExit::Code(0))), false);
        assert!(status.is_success());
        assert_eq!(errors, 0);
    }

    #[test]
    fn test_empty_argv_is_spawn_failure() {
        let status = ProcessRunner::new().run(&[], true);
        assert!(matches!(
            status,
            RunStatus::SpawnFailure {
                errno: Some(EMPTY_ARGV_CODE),
                ..
            }
        ));
    }

    #[test]
    fn test_missing_binary_is_spawn_failure() {
        let argv = vec!["/nonexistent/tunnel-rules-test-binary".to_string()];
        let status = ProcessRunner::new().run(&argv, true);
        assert!(matches!(status, RunStatus::SpawnFailure { .. }));
        assert_ne!(status.code(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_real_process_exit_codes() {
        let runner = ProcessRunner::new();
        assert!(runner.run(&["true".to_string()], true).is_success());
        assert_eq!(
            runner.run(&["false".to_string()], true),
            RunStatus::NonZeroExit(1)
        );
    }
}
