//! CLI configuration and argument parsing.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};
use serde::{Deserialize, Serialize};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

pub const DEFAULT_STATUS_FLAG_PATH: &str = "/var/lib/distup/status.json";
pub const DEFAULT_COMPLETION_FLAG_PATH: &str = "/var/lib/distup/completed.json";
pub const DEFAULT_BIN_PATH: &str = "/usr/local/bin/distup";

/// In-place distribution upgrader for Plesk servers.
///
/// The upgrade runs in three phases (prepare, convert, finish) separated by
/// reboots. The tool installs a systemd service that resumes it after each
/// reboot, so it only needs to be started once.
#[derive(Parser, Debug, Clone)]
#[command(name = "distup")]
#[command(about = "Resumable in-place distribution upgrader for Plesk servers")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
#[command(group(
    ArgGroup::new("mode")
        .args(["show_plan", "status", "resume", "revert"])
        .multiple(false)
))]
pub struct Args {
    /// Allow package downgrades during the dist-upgrade stage
    #[arg(long, default_value = "false")]
    pub allow_downgrade: bool,

    /// Path of the status file holding the current phase
    #[arg(long, env = "DISTUP_STATUS_FLAG_PATH", default_value = DEFAULT_STATUS_FLAG_PATH)]
    pub status_flag_path: PathBuf,

    /// Path of the file marking run completion
    #[arg(long, env = "DISTUP_COMPLETION_FLAG_PATH", default_value = DEFAULT_COMPLETION_FLAG_PATH)]
    pub completion_flag_path: PathBuf,

    /// Show the upgrade plan for the current phase without executing it
    #[arg(long, default_value = "false")]
    pub show_plan: bool,

    /// Show the persisted upgrade status
    #[arg(long, default_value = "false")]
    pub status: bool,

    /// Continue a run after reboot (used by the resume service)
    #[arg(long, default_value = "false")]
    pub resume: bool,

    /// Undo the preparation changes of a run that has not started converting
    #[arg(long, default_value = "false")]
    pub revert: bool,

    /// Skip confirmation prompts
    #[arg(short, long, default_value = "false")]
    pub yes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "DISTUP_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// What the invocation asked the tool to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Resume,
    ShowPlan,
    Status,
    Revert,
}

/// Options resolved from the invocation. Immutable once built and persisted
/// with the run state so that a resumed run sees the same values.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct UpgradeOptions {
    pub allow_downgrade: bool,
    pub status_flag_path: PathBuf,
    pub completion_flag_path: PathBuf,
    /// Absolute path of the binary the resume service must start.
    pub upgrader_bin_path: PathBuf,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            allow_downgrade: false,
            status_flag_path: PathBuf::from(DEFAULT_STATUS_FLAG_PATH),
            completion_flag_path: PathBuf::from(DEFAULT_COMPLETION_FLAG_PATH),
            upgrader_bin_path: PathBuf::from(DEFAULT_BIN_PATH),
        }
    }
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub options: UpgradeOptions,
    pub yes: bool,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Create config from CLI arguments. `bin_path` is the resolved location
    /// of the running executable.
    pub fn from_args(args: Args, bin_path: PathBuf) -> Self {
        let mode = if args.show_plan {
            Mode::ShowPlan
        } else if args.status {
            Mode::Status
        } else if args.resume {
            Mode::Resume
        } else if args.revert {
            Mode::Revert
        } else {
            Mode::Run
        };

        Self {
            mode,
            options: UpgradeOptions {
                allow_downgrade: args.allow_downgrade,
                status_flag_path: args.status_flag_path,
                completion_flag_path: args.completion_flag_path,
                upgrader_bin_path: bin_path,
            },
            yes: args.yes,
            log_level: args.log_level,
            log_format: args.log_format,
        }
    }

    /// Whether a confirmation prompt must be shown before mutating the host.
    pub fn needs_confirmation(&self) -> bool {
        matches!(self.mode, Mode::Run | Mode::Revert) && !self.yes
    }
}
