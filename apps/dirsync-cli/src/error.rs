//! CLI error types and exit codes

use thiserror::Error;

use dirsync_connector::error::StoreError;
use dirsync_engine::SyncError;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Connection failure
/// - 4: Configuration error
/// - 6: One or more specializations failed
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {message}\n\nTroubleshooting:\n  - Check the host and port of the resource\n  - Verify the bind DN and password\n  - Run 'dirsync check' to test both directories")]
    ConnectionFailed { message: String, transient: bool },

    #[error("{failed} of {total} specializations failed")]
    SpecializationsFailed { failed: usize, total: usize },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("{0}")]
    General(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ConnectionFailed { .. } => 3,
            CliError::Config(_) => 4,
            CliError::SpecializationsFailed { .. } => 6,
            CliError::Io(_) | CliError::General(_) => 1,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Run 'dirsync validate' to check the job file."),
            CliError::ConnectionFailed {
                transient: true, ..
            } => Some("The directory did not answer in time; rerun once it is reachable."),
            CliError::SpecializationsFailed { .. } => {
                Some("See the run report above; failed sections start with 'Failed:'.")
            }
            _ => None,
        }
    }
}

impl From<SyncError> for CliError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Configuration { .. }
            | SyncError::Descriptor { .. }
            | SyncError::NamingSyntax { .. } => CliError::Config(e.to_string()),
            SyncError::Store(store) => store.into(),
            other => CliError::General(other.to_string()),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        let message = format!("[{}] {}", e.error_code(), e);
        match e {
            StoreError::ConnectionFailed { .. }
            | StoreError::AuthenticationFailed
            | StoreError::Timeout { .. } => CliError::ConnectionFailed {
                message,
                transient: e.is_transient(),
            },
            StoreError::InvalidConfiguration { .. } | StoreError::InvalidName { .. } => {
                CliError::Config(message)
            }
            _ => CliError::General(message),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        CliError::Config(format!("YAML error: {}", e))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::General(format!("JSON error: {}", e))
    }
}
