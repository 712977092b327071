use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROGRAM: &str = "python3";
pub const DEFAULT_SCRIPT: &str = "../run_ootd.py";
pub const DEFAULT_COLLABORATOR_OUTPUT_DIR: &str = "../images_output";
pub const DEFAULT_TIMEOUT_SECS: u64 = 900;
pub const DEFAULT_RETENTION_SECS: u64 = 86_400;
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 600;

/// Where the collaborator writes its `out_hd_<i>.png` files.
#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// One fixed directory for every run. Runs are serialized process-wide.
    #[default]
    Shared,
    /// A private `<output_dir>/<session-id>` directory handed to the
    /// collaborator with `--output_dir`. Runs may overlap.
    PerSession,
}

/// How the external synthesis program is started.
#[derive(Args, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Executable to spawn (an interpreter or the collaborator binary itself)
    #[arg(
        long = "collaborator-program",
        env = "TRYON_COLLABORATOR_PROGRAM",
        default_value = DEFAULT_PROGRAM
    )]
    pub program: String,

    /// Script passed as first argument to `program`. Empty means none
    #[arg(
        long = "collaborator-script",
        env = "TRYON_COLLABORATOR_SCRIPT",
        default_value = DEFAULT_SCRIPT
    )]
    pub script: String,

    /// Directory the collaborator writes its output images to
    #[arg(long = "collaborator-output-dir", default_value = DEFAULT_COLLABORATOR_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    #[arg(long = "collaborator-output-layout", value_enum, default_value_t = OutputLayout::Shared)]
    pub output_layout: OutputLayout,

    /// Upper bound for a single run in seconds. `0` disables the timeout
    #[arg(long = "collaborator-timeout-secs", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            script: DEFAULT_SCRIPT.to_string(),
            output_dir: PathBuf::from(DEFAULT_COLLABORATOR_OUTPUT_DIR),
            output_layout: OutputLayout::Shared,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn script(&self) -> Option<&str> {
        let script = self.script.trim();
        if script.is_empty() {
            None
        } else {
            Some(script)
        }
    }
}

/// Lifecycle of scratch inputs and published session directories.
#[derive(Args, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Age in seconds after which a session's public directory is removed.
    /// `0` keeps everything forever
    #[arg(long = "retention-secs", default_value_t = DEFAULT_RETENTION_SECS)]
    pub retention_secs: u64,

    /// How often the janitor scans for expired sessions
    #[arg(long = "cleanup-interval-secs", default_value_t = DEFAULT_CLEANUP_INTERVAL_SECS)]
    pub cleanup_interval_secs: u64,

    /// Keep uploaded inputs after the run instead of deleting them
    #[arg(long = "keep-inputs", action = clap::ArgAction::SetTrue)]
    pub keep_inputs: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            keep_inputs: false,
        }
    }
}

impl RetentionConfig {
    pub fn retention(&self) -> Option<chrono::Duration> {
        match self.retention_secs {
            0 => None,
            secs => Some(chrono::Duration::seconds(secs as i64)),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}
