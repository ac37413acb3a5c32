//! Configuration management for tunnel-rules.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::Args;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Paths of the external network tools.
    pub binaries: Binaries,
    /// Chain names expected in the rule store.
    pub chains: Chains,
    /// Rule transaction behavior.
    pub rules: RulesSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Paths of the external network tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binaries {
    /// IPv4 filter-rule tool.
    pub iptables: String,
    /// IPv6 filter-rule tool.
    pub ip6tables: String,
    /// Unified IP/routing tool.
    pub ip: String,
    /// Forwarding-control tool.
    pub ndc: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            iptables: "/system/bin/iptables-wrapper-1.0".to_string(),
            ip6tables: "/system/bin/ip6tables-wrapper-1.0".to_string(),
            ip: "/system/bin/ip-wrapper-1.0".to_string(),
            ndc: "/system/bin/ndc-wrapper-1.0".to_string(),
        }
    }
}

/// Chain names. These must already exist in the rule store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chains {
    /// Power-save/dozable input filter chain.
    pub input: String,
    /// Power-save/dozable output filter chain.
    pub output: String,
    /// Mangle chain where forwarded packets are marked.
    pub mangle_prerouting: String,
    /// Forward filter chain.
    pub forward: String,
    /// Data-saver exemption chain.
    pub happy_box: String,
}

impl Default for Chains {
    fn default() -> Self {
        Self {
            input: "fw_INPUT".to_string(),
            output: "fw_OUTPUT".to_string(),
            mangle_prerouting: "PREROUTING".to_string(),
            forward: "oem_fwd".to_string(),
            happy_box: "bw_happy_box".to_string(),
        }
    }
}

/// Rule transaction behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesSection {
    /// Suppress failure diagnostics for revert commands.
    pub silent_revert: bool,
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(path) = non_empty("TUNNEL_RULES_IPTABLES") {
            self.binaries.iptables = path;
        }
        if let Some(path) = non_empty("TUNNEL_RULES_IP6TABLES") {
            self.binaries.ip6tables = path;
        }
        if let Some(path) = non_empty("TUNNEL_RULES_IP") {
            self.binaries.ip = path;
        }
        if let Some(path) = non_empty("TUNNEL_RULES_NDC") {
            self.binaries.ndc = path;
        }

        if let Some(level) = non_empty("TUNNEL_RULES_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = non_empty("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if args.silent_revert {
            self.rules.silent_revert = true;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::RuleError {
    fn from(e: ConfigError) -> Self {
        crate::RuleError::Config(e.to_string())
    }
}
