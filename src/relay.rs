//! Filter-and-forward pipeline for inbound messages.
//!
//! Each message passes two independent filters: it must come from the target
//! group, and its sender's handle must be on the allow-list. Matching messages
//! are sent on to the destination chat with an attribution line.

use crate::config::Config;
use crate::error::RelayError;
use crate::messenger::{InboundMessage, Messenger, Sender};
use tracing::{debug, info, warn};

/// Why a message was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No text or no chat id
    Incomplete,
    /// Posted outside the target group
    OtherChat,
    /// Sender lookup failed or returned nothing
    UnknownSender,
    /// Sender has no handle or it is not allow-listed
    NotAllowed,
}

/// Result of handling one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(SkipReason),
    /// Matched and sent to the destination
    Forwarded { handle: String, destination: i64 },
    /// Matched, but no destination is configured
    Undeliverable { handle: String },
}

/// Check whether a message was posted in the monitored group.
pub fn in_target_group(config: &Config, chat_id: i64) -> bool {
    chat_id == config.target_group_id
}

/// Return the sender's handle if it is on the allow-list.
pub fn allowed_handle<'a>(config: &Config, sender: &'a Sender) -> Option<&'a str> {
    sender
        .username
        .as_deref()
        .filter(|handle| config.target_user_handles.contains(handle))
}

/// Compose the forwarded message body.
///
/// The original text is kept verbatim, including any markup it contains.
pub fn format_forward(handle: &str, text: &str) -> String {
    format!("**New message from @{} in group:**\n{}", handle, text)
}

/// Run one inbound message through the filters and forward it on a match.
///
/// Non-matching messages are dropped without logging. Send failures are
/// returned to the caller unchanged; nothing is retried.
pub async fn handle_message<M>(
    config: &Config,
    messenger: &M,
    message: &InboundMessage,
) -> Result<Outcome, RelayError>
where
    M: Messenger + ?Sized,
{
    let (Some(chat_id), Some(text)) = (message.chat_id, message.text.as_deref()) else {
        return Ok(Outcome::Ignored(SkipReason::Incomplete));
    };

    if !in_target_group(config, chat_id) {
        return Ok(Outcome::Ignored(SkipReason::OtherChat));
    }
    debug!(chat_id, "Message matched target group");

    let sender = match messenger.resolve_sender(message).await {
        Ok(Some(sender)) => sender,
        Ok(None) | Err(_) => return Ok(Outcome::Ignored(SkipReason::UnknownSender)),
    };

    let Some(handle) = allowed_handle(config, &sender) else {
        return Ok(Outcome::Ignored(SkipReason::NotAllowed));
    };
    debug!(handle, "Sender is allow-listed");

    if config.destination_chat_id == 0 {
        warn!(handle, "DESTINATION_CHAT_ID is not set. Message not forwarded.");
        return Ok(Outcome::Undeliverable {
            handle: handle.to_string(),
        });
    }

    let body = format_forward(handle, text);
    messenger
        .send_markdown(config.destination_chat_id, &body)
        .await?;
    info!(
        handle,
        destination = config.destination_chat_id,
        "Forwarded message from @{} to {}",
        handle,
        config.destination_chat_id
    );

    Ok(Outcome::Forwarded {
        handle: handle.to_string(),
        destination: config.destination_chat_id,
    })
}
