//! CLI command implementations

pub mod check;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::Args;

use crate::config::{resolve_config_path, JobFile};
use crate::error::CliResult;

/// Job file selection shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to the job file (defaults to $DIRSYNC_CONFIG, then ./config/dirsync.yaml)
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    /// Resolve and load the job file.
    pub fn load(&self) -> CliResult<JobFile> {
        JobFile::load(&resolve_config_path(self.config.as_deref()))
    }
}
