//! Run command - reconcile the target directory against the source

use clap::Args;
use tracing::info;

use dirsync_engine::{FileDescriptorLoader, HousekeepingJob, JobOptions, JobReport};

use super::ConfigArgs;
use crate::error::{CliError, CliResult};

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Run only this specialization (repeatable)
    #[arg(long, value_name = "NAME")]
    pub only: Vec<String>,

    /// Compare without writing to the target
    #[arg(long)]
    pub dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn options(&self) -> JobOptions {
        JobOptions {
            dry_run: self.dry_run,
            only: self.only.clone(),
        }
    }
}

/// Execute the run command
pub async fn execute(args: RunArgs) -> CliResult<()> {
    let file = args.config.load()?;
    let config = file.sync_configuration()?;
    let job = HousekeepingJob::load(config, &file.job, &FileDescriptorLoader).await?;

    let report = job.run(&args.options()).await?;
    print_report(&report, args.json)?;

    outcome(&report)
}

fn print_report(report: &JobReport, json: bool) -> CliResult<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn outcome(report: &JobReport) -> CliResult<()> {
    let total = report.specializations.len();
    let failed = report
        .specializations
        .iter()
        .filter(|s| !s.is_success())
        .count();
    info!(total, failed, "Job finished");

    if failed > 0 {
        return Err(CliError::SpecializationsFailed { failed, total });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dirsync_engine::{RunStatistics, SpecializationReport};

    fn report(errors: &[Option<&str>]) -> JobReport {
        JobReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            specializations: errors
                .iter()
                .enumerate()
                .map(|(i, error)| SpecializationReport {
                    name: format!("group{i}"),
                    outcome: None,
                    error: error.map(str::to_string),
                })
                .collect(),
            totals: RunStatistics::new(),
        }
    }

    #[test]
    fn test_outcome_success() {
        assert!(outcome(&report(&[None, None])).is_ok());
    }

    #[test]
    fn test_outcome_counts_failures() {
        let err = outcome(&report(&[None, Some("refused"), Some("boom")])).unwrap_err();
        assert_eq!(err.exit_code(), 6);
        assert_eq!(err.to_string(), "2 of 3 specializations failed");
    }

    #[test]
    fn test_options_from_args() {
        let args = RunArgs {
            config: ConfigArgs::default(),
            only: vec!["group".to_string()],
            dry_run: true,
            json: false,
        };
        let options = args.options();
        assert!(options.dry_run);
        assert_eq!(options.only, vec!["group".to_string()]);
    }
}
