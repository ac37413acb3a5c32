//! Command-line interface for tunnel-rules.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

use crate::execution::AddressFamily;
use crate::transaction::{Action, TunnelConfig};

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Action to run (apply, revert, reset).
    pub action: Option<Action>,
    /// Tunnel-facing interface.
    pub in_iface: Option<String>,
    /// Upstream-facing interface.
    pub out_iface: Option<String>,
    /// Next-hop gateway.
    pub next_hop: Option<String>,
    /// Routing table id.
    pub table_id: Option<String>,
    /// Local tunnel-endpoint address.
    pub local_addr: Option<String>,
    /// Remote tunnel-peer address.
    pub remote_addr: Option<String>,
    /// Address family for routing commands.
    pub family: AddressFamily,
    /// Other consumers of the shared route.
    pub ref_count: u32,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Suppress diagnostics for revert commands.
    pub silent_revert: bool,
    /// Print the commands instead of running them.
    pub dry_run: bool,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

impl Args {
    /// Build the tunnel description, failing on the first missing option.
    pub fn tunnel(&self) -> Result<TunnelConfig, ArgsError> {
        fn required(value: &Option<String>, name: &'static str) -> Result<String, ArgsError> {
            value.clone().ok_or(ArgsError::Missing(name))
        }

        Ok(TunnelConfig {
            in_iface: required(&self.in_iface, "in")?,
            out_iface: required(&self.out_iface, "out")?,
            next_hop: required(&self.next_hop, "next-hop")?,
            table_id: required(&self.table_id, "table")?,
            local_addr: required(&self.local_addr, "local")?,
            remote_addr: required(&self.remote_addr, "remote")?,
            family: self.family,
            ref_count: self.ref_count,
        })
    }

    /// The requested action.
    pub fn action(&self) -> Result<Action, ArgsError> {
        self.action.ok_or(ArgsError::Missing("action"))
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('i') | Long("in") => {
                result.in_iface = Some(parser.value()?.parse()?);
            }
            Short('o') | Long("out") => {
                result.out_iface = Some(parser.value()?.parse()?);
            }
            Short('g') | Long("next-hop") => {
                result.next_hop = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("table") => {
                result.table_id = Some(parser.value()?.parse()?);
            }
            Short('s') | Long("local") => {
                result.local_addr = Some(parser.value()?.parse()?);
            }
            Short('d') | Long("remote") => {
                result.remote_addr = Some(parser.value()?.parse()?);
            }
            Short('f') | Long("family") => {
                let value: String = parser.value()?.parse()?;
                result.family = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("family", value))?;
            }
            Short('r') | Long("ref-count") => {
                let value: String = parser.value()?.parse()?;
                result.ref_count = value
                    .parse()
                    .map_err(|_| ArgsError::InvalidValue("ref-count", value))?;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("silent-revert") => {
                result.silent_revert = true;
            }
            Short('n') | Long("dry-run") => {
                result.dry_run = true;
            }
            Value(val) if result.action.is_none() => {
                let value = val.to_string_lossy().into_owned();
                result.action = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("action", value))?,
                );
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"tunnel-rules {version}
Policy routing and firewall exceptions for IMS/ePDG tunnel handoff

USAGE:
    tunnel-rules <apply|revert|reset> [OPTIONS]

TUNNEL:
    -i, --in <IFACE>         Tunnel-facing interface
    -o, --out <IFACE>        Upstream-facing interface
    -g, --next-hop <ADDR>    Next-hop gateway for the tunnel table
    -t, --table <ID>         Routing table id
    -s, --local <ADDR>       Local tunnel-endpoint address
    -d, --remote <ADDR>      Remote tunnel-peer address
    -f, --family <4|6>       Address family for ip rule/route [default: 4]
    -r, --ref-count <N>      Other users of the shared route [default: 0]

OPTIONS:
    -c, --config <FILE>      Path to configuration file (JSON)
    -l, --log-level <LVL>    Log level (error, warn, info, debug, trace)
        --silent-revert      Do not log failures of revert commands
    -n, --dry-run            Print the commands without running them
    -h, --help               Print help
    -V, --version            Print version

ENVIRONMENT VARIABLES:
    TUNNEL_RULES_IPTABLES    iptables binary (overrides config)
    TUNNEL_RULES_IP6TABLES   ip6tables binary (overrides config)
    TUNNEL_RULES_IP          ip binary (overrides config)
    TUNNEL_RULES_NDC         ndc binary (overrides config)
    TUNNEL_RULES_LOG_LEVEL   Log level (overrides config)
    RUST_LOG                 Alternative log level setting

EXAMPLES:
    # Route an IMS tunnel over Wi-Fi
    tunnel-rules apply -i rmnet_ipa0 -o wlan0 -g 10.0.0.1 -t 61 \
        -s 10.0.0.2 -d 2001:db8::1

    # Tear it down while another tunnel still uses the route
    tunnel-rules revert -i rmnet_ipa0 -o wlan0 -g 10.0.0.1 -t 61 \
        -s 10.0.0.2 -d 2001:db8::1 -r 1
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("tunnel-rules {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
    /// Required option not given.
    Missing(&'static str),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
            Self::Missing("action") => write!(f, "missing action (apply, revert or reset)"),
            Self::Missing(name) => write!(f, "missing required option --{}", name),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<ArgsError> for crate::RuleError {
    fn from(e: ArgsError) -> Self {
        crate::RuleError::Usage(e.to_string())
    }
}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
