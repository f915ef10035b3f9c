//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use vectorsource::executor::{ConfigError, DispatchError};

/// CLI-specific errors.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file or value problem
    Config(ConfigError),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// The dispatcher refused to start or accept work
    Dispatch(DispatchError),
    /// Invalid command-line argument combination
    InvalidArgument(String),
}

impl CliError {
    /// Exit the process with an error message and code 1.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigError::InvalidValue { .. }) = self {
            eprintln!();
            eprintln!("Run `vectorsource init-config <path>` to write a file with defaults.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Dispatch(e) => write!(f, "Dispatcher error: {}", e),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Dispatch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<DispatchError> for CliError {
    fn from(e: DispatchError) -> Self {
        CliError::Dispatch(e)
    }
}
