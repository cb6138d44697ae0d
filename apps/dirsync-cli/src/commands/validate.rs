//! Validate command - check the job file and descriptors without connecting

use clap::Args;

use dirsync_engine::{FileDescriptorLoader, HousekeepingJob};

use super::ConfigArgs;
use crate::error::CliResult;

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Execute the validate command
pub async fn execute(args: ValidateArgs) -> CliResult<()> {
    let file = args.config.load()?;
    let config = file.sync_configuration()?;
    let job = HousekeepingJob::load(config, &file.job, &FileDescriptorLoader).await?;

    let config = job.config();
    println!("Job file is valid");
    println!(
        "  source:  {} ({})",
        file.job.source_resource,
        config.organizations().source
    );
    println!(
        "  target:  {} ({})",
        file.job.target_resource,
        config.organizations().target
    );
    println!("  batch:   {}", config.batch_size());
    Ok(())
}
