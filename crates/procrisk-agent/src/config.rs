//! Daemon configuration
//!
//! Values are layered: built-in defaults, then a TOML file, then
//! `PROCRISK_*` environment variables, then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::endpoint::PublisherKind;
use crate::monitor::EnumeratorKind;
use crate::scheduler::SchedulerConfig;

/// Name of the endpoint namespace directory
pub const ENDPOINT_NAMESPACE: &str = "process_risk";

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Seconds between cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Delay before the first cycle, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Root of the directory endpoint namespace
    #[serde(default)]
    pub endpoint_dir: Option<PathBuf>,

    #[serde(default)]
    pub publisher: PublisherKind,

    #[serde(default)]
    pub enumerator: EnumeratorKind,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            initial_delay_ms: default_initial_delay_ms(),
            endpoint_dir: None,
            publisher: PublisherKind::default(),
            enumerator: EnumeratorKind::default(),
            log_level: default_log_level(),
        }
    }
}

impl MonitorConfig {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Resolve the full configuration for a daemon invocation
    pub fn load(args: &CliArgs) -> Result<Self> {
        Self::load_with(args, |key| std::env::var(key).ok())
    }

    /// Layer file, `lookup` environment and CLI flags over the defaults
    pub fn load_with(args: &CliArgs, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_from(lookup)?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROCRISK_*` overrides read through `lookup`
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("PROCRISK_INTERVAL_SECS") {
            self.interval_secs = value
                .trim()
                .parse()
                .with_context(|| format!("PROCRISK_INTERVAL_SECS: invalid value '{}'", value))?;
        }

        if let Some(value) = lookup("PROCRISK_ENDPOINT_DIR") {
            self.endpoint_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup("PROCRISK_PUBLISHER") {
            self.publisher = value
                .parse()
                .map_err(anyhow::Error::msg)
                .context("PROCRISK_PUBLISHER")?;
        }

        if let Some(value) = lookup("PROCRISK_LOG_LEVEL") {
            self.log_level = value;
        }

        Ok(())
    }

    fn apply_args(&mut self, args: &CliArgs) {
        if let Some(secs) = args.interval_secs {
            self.interval_secs = secs;
        }
        if let Some(dir) = &args.endpoint_dir {
            self.endpoint_dir = Some(dir.clone());
        }
        if let Some(publisher) = args.publisher {
            self.publisher = publisher;
        }
        if let Some(enumerator) = args.enumerator {
            self.enumerator = enumerator;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            bail!("interval_secs must be at least 1");
        }
        if self.log_level.trim().is_empty() {
            bail!("log_level must not be empty");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval(),
            initial_delay: self.initial_delay(),
        }
    }

    /// Configured endpoint root, or the platform default
    pub fn endpoint_dir(&self) -> PathBuf {
        self.endpoint_dir.clone().unwrap_or_else(default_endpoint_dir)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "procrisk", "procrisk")
}

/// `config.toml` in the platform config directory
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Runtime directory when the platform has one, else local data directory
pub fn default_endpoint_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| {
            dirs.runtime_dir()
                .unwrap_or_else(|| dirs.data_local_dir())
                .join(ENDPOINT_NAMESPACE)
        })
        .unwrap_or_else(|| std::env::temp_dir().join("procrisk").join(ENDPOINT_NAMESPACE))
}

/// Parsed command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub endpoint_dir: Option<PathBuf>,
    pub publisher: Option<PublisherKind>,
    pub enumerator: Option<EnumeratorKind>,
    pub log_level: Option<String>,
    pub once: bool,
    pub json: bool,
    pub help: bool,
}

impl CliArgs {
    /// Parse arguments, not including the program name
    pub fn parse_from<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter().map(Into::<String>::into);

        while let Some(arg) = args.next() {
            let mut value = || {
                args.next()
                    .with_context(|| format!("{} requires a value", arg))
            };

            match arg.as_str() {
                "--config" | "-c" => parsed.config = Some(PathBuf::from(value()?)),
                "--interval" | "-i" => {
                    let raw = value()?;
                    parsed.interval_secs = Some(
                        raw.parse()
                            .with_context(|| format!("--interval: invalid value '{}'", raw))?,
                    );
                }
                "--endpoint-dir" | "-d" => {
                    parsed.endpoint_dir = Some(PathBuf::from(value()?))
                }
                "--publisher" => {
                    parsed.publisher = Some(value()?.parse().map_err(anyhow::Error::msg)?)
                }
                "--enumerator" => {
                    parsed.enumerator = Some(value()?.parse().map_err(anyhow::Error::msg)?)
                }
                "--log-level" => parsed.log_level = Some(value()?),
                "--once" => parsed.once = true,
                "--json" => parsed.json = true,
                "--help" | "-h" => parsed.help = true,
                other => bail!("unknown argument '{}', see --help", other),
            }
        }

        Ok(parsed)
    }

    pub fn from_env() -> Result<Self> {
        Self::parse_from(std::env::args().skip(1))
    }
}

pub fn print_help() {
    println!("procrisk-agent - per-process risk telemetry daemon");
    println!();
    println!("USAGE:");
    println!("    procrisk-agent [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <FILE>         TOML config file (default: platform config dir)");
    println!("    -i, --interval <SECS>       Seconds between sampling cycles (default: 5)");
    println!("    -d, --endpoint-dir <DIR>    Root directory for per-process report files");
    println!("        --publisher <KIND>      memory | directory (default: directory)");
    println!("        --enumerator <KIND>     auto | procfs | sysinfo (default: auto)");
    println!("        --log-level <LEVEL>     trace | debug | info | warn | error");
    println!("        --once                  Sample twice, print every report and exit");
    println!("        --json                  With --once, print reports as JSON");
    println!("    -h, --help                  Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    PROCRISK_INTERVAL_SECS, PROCRISK_ENDPOINT_DIR,");
    println!("    PROCRISK_PUBLISHER, PROCRISK_LOG_LEVEL, RUST_LOG");
}
