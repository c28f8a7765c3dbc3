//! Telegram group relay library.
//!
//! Watches one Telegram group through a user-account session and forwards
//! messages from allow-listed members to a single destination chat.

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod messenger;
pub mod relay;

// Re-export commonly used types
pub use config::{AllowList, Config, Credentials};
pub use error::{ConfigError, RelayError};
pub use messenger::{Connector, InboundMessage, Messenger, Session};
pub use relay::{handle_message, Outcome};
