//! Error types for the application.

use thiserror::Error;

/// Process exit code for a clean shutdown.
pub const EXIT_CLEAN: u8 = 0;
/// Process exit code for unexpected runtime failures.
pub const EXIT_RUNTIME: u8 = 1;
/// Process exit code for fatal configuration errors.
pub const EXIT_CONFIG: u8 = 2;
/// Process exit code for authentication / connection failures at start-up.
pub const EXIT_AUTH: u8 = 3;

/// Errors related to configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("{var} must be a valid integer, got {value:?}")]
    InvalidInteger { var: &'static str, value: String },

    #[error("Failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// Errors raised while running the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Telegram error: {0}")]
    Telegram(#[from] grammers_mtsender::InvocationError),

    #[error("Chat {0} is not among the account's dialogs")]
    UnknownChat(i64),

    #[error("Handler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Exit code the process should terminate with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            RelayError::Config(_) => EXIT_CONFIG,
            RelayError::Auth(_) => EXIT_AUTH,
            _ => EXIT_RUNTIME,
        }
    }
}
