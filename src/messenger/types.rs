//! Shared types for messenger implementations.

/// Author of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    /// Public handle without the leading `@`
    pub username: Option<String>,
}

impl Sender {
    pub fn new(id: i64, username: Option<String>) -> Self {
        Self { id, username }
    }
}

/// A new-message notification from the backend.
///
/// Only lives for the duration of one handler invocation.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    /// Marked chat id (negative for groups and channels)
    pub chat_id: Option<i64>,
    pub text: Option<String>,
    /// Sender as delivered with the update, if the backend included one.
    /// Use [`super::Messenger::resolve_sender`] rather than reading this directly.
    pub sender: Option<Sender>,
}

impl InboundMessage {
    pub fn new(chat_id: i64, text: impl Into<String>, sender: Option<Sender>) -> Self {
        Self {
            chat_id: Some(chat_id),
            text: Some(text.into()),
            sender,
        }
    }
}

/// The authenticated account, logged once after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub username: Option<String>,
}
