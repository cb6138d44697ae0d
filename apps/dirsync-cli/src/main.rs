//! dirsync - reconcile a target LDAP directory against a source directory

use clap::{Parser, Subcommand};

use dirsync_cli::commands;
use dirsync_cli::error::CliResult;
use dirsync_cli::logging;

/// dirsync - LDAP directory housekeeping
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Emit logs as JSON on stderr
    #[arg(long, global = true, env = "DIRSYNC_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the target directory against the source
    Run(commands::run::RunArgs),

    /// Check the job file and descriptors without connecting
    Validate(commands::validate::ValidateArgs),

    /// Test connectivity to the source and target directories
    Check(commands::check::CheckArgs),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
    }
}
