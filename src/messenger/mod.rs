//! Messaging backend abstraction.
//!
//! The relay only needs a handful of primitives from the backend: read new
//! messages, resolve who sent them, and send a markdown message to a chat.
//! Keeping them behind traits lets the filter pipeline and the run loop be
//! tested against in-memory stubs.

mod types;

pub mod telegram;

pub use types::{Identity, InboundMessage, Sender};

use crate::config::Credentials;
use crate::error::RelayError;
use async_trait::async_trait;
use std::path::Path;

/// Send side of a backend session.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a markdown-formatted message to a chat.
    async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<(), RelayError>;

    /// Resolve the author of a message.
    ///
    /// `Ok(None)` means the backend could not tell who sent it (anonymous
    /// admins, channel posts).
    async fn resolve_sender(&self, message: &InboundMessage) -> Result<Option<Sender>, RelayError>;

    /// Get the platform name for logging purposes.
    fn platform_name(&self) -> &'static str;
}

/// An authenticated, long-lived backend session.
#[async_trait]
pub trait Session: Messenger {
    /// The account this session is logged in as.
    async fn identity(&self) -> Result<Identity, RelayError>;

    /// Wait for the next new-message notification.
    ///
    /// Returns `Ok(None)` once the backend has closed the update stream.
    async fn next_message(&self) -> Result<Option<InboundMessage>, RelayError>;

    /// Persist session state and release the connection.
    async fn close(&self) -> Result<(), RelayError>;
}

/// Establishes authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session + 'static;

    /// Connect and authenticate, reusing the session stored at `session_path`.
    async fn connect(
        &self,
        credentials: &Credentials,
        session_path: &Path,
    ) -> Result<Self::Session, RelayError>;
}
