//! CLI integration tests.
//!
//! These tests verify the CLI argument parsing and configuration loading.

use std::ffi::OsString;
use std::io::Write;
use tempfile::NamedTempFile;

use tunnel_rules::cli::{parse_args_from, Args};
use tunnel_rules::config::Config;
use tunnel_rules::{Action, AddressFamily};

fn args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("tunnel-rules")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

// ============================================================================
// CLI Argument Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let result = parse_args_from(args(&[])).unwrap();

    assert!(result.action.is_none());
    assert!(result.config.is_none());
    assert!(result.log_level.is_none());
    assert_eq!(result.family, AddressFamily::Inet);
    assert!(!result.silent_revert);
}

#[test]
fn test_cli_full_tunnel() {
    let result = parse_args_from(args(&[
        "reset",
        "--in",
        "rmnet_ipa0",
        "--out",
        "wlan0",
        "--next-hop",
        "10.0.0.1",
        "--table",
        "61",
        "--local",
        "10.0.0.2",
        "--remote",
        "2001:db8::1",
        "--family",
        "inet",
        "--ref-count",
        "1",
    ]))
    .unwrap();

    assert_eq!(result.action().unwrap(), Action::Reset);
    let tunnel = result.tunnel().unwrap();
    assert_eq!(tunnel.table_id, "61");
    assert_eq!(tunnel.ref_count, 1);
    assert_eq!(tunnel.family, AddressFamily::Inet);
}

#[test]
fn test_cli_invalid_family() {
    let result = parse_args_from(args(&["--family", "ipx"]));
    assert!(result.is_err());
}

#[test]
fn test_cli_unknown_option() {
    let result = parse_args_from(args(&["--bogus"]));
    assert!(result.is_err());
}

// ============================================================================
// Configuration Loading Tests
// ============================================================================

#[test]
fn test_config_load_defaults() {
    let config = Config::load(&Args::default()).unwrap();
    assert_eq!(config.chains.forward, "oem_fwd");
    assert_eq!(config.binaries.ip6tables, "/system/bin/ip6tables-wrapper-1.0");
}

#[test]
fn test_config_cli_overrides_file() {
    let json = r#"{
        "rules": { "silent_revert": false },
        "logging": { "level": "warn" }
    }"#;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let parsed = parse_args_from(args(&["-c", &path, "--silent-revert", "-l", "trace"])).unwrap();
    let config = Config::load(&parsed).unwrap();

    assert!(config.rules.silent_revert);
    assert_eq!(config.log_filter(), "trace");
}

#[test]
fn test_config_missing_file() {
    let parsed = parse_args_from(args(&["-c", "/nonexistent/tunnel-rules.json"])).unwrap();
    assert!(Config::load(&parsed).is_err());
}
