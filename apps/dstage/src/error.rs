//! CLI error handling

use std::fmt;

use dstage_errors::UserFacingError;

/// Exit status when a requested stage did not succeed
pub const EXIT_STAGE_FAILED: i32 = 1;
/// Exit status for configuration-time errors
pub const EXIT_CONFIGURATION: i32 = 2;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Configuration or pipeline error raised before anything ran
    Setup(dstage_errors::Error),
    /// Error raised while the run was executing
    Run(dstage_errors::Error),
    /// I/O error while rendering output
    Io(std::io::Error),
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Setup(_) => EXIT_CONFIGURATION,
            CliError::Run(_) | CliError::Io(_) => EXIT_STAGE_FAILED,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Setup(e) | CliError::Run(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Setup(e) | CliError::Run(e) => Some(e),
            CliError::Io(e) => Some(e),
        }
    }
}

impl From<dstage_errors::Error> for CliError {
    fn from(e: dstage_errors::Error) -> Self {
        if e.is_configuration_error() {
            CliError::Setup(e)
        } else {
            CliError::Run(e)
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}
