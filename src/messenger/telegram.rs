//! Telegram messenger implementation.
//!
//! Logs in as a regular user account over MTProto (grammers), so the relay
//! sees every chat the account is a member of. The session is stored on disk
//! and reused on later runs; only the first login is interactive.

use super::{Connector, Identity, InboundMessage, Messenger, Sender, Session};
use crate::config::Credentials;
use crate::error::RelayError;
use async_trait::async_trait;
use grammers_client::types::Message;
use grammers_client::{Client, Config, InitParams, InputMessage, SignInError, Update};
use grammers_session::{PackedChat, PackedType, Session as StoredSession};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Offset Telegram applies to channel and supergroup ids in marked form.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Connects Telegram user-account sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelegramConnector;

#[async_trait]
impl Connector for TelegramConnector {
    type Session = TelegramSession;

    async fn connect(
        &self,
        credentials: &Credentials,
        session_path: &Path,
    ) -> Result<TelegramSession, RelayError> {
        TelegramSession::connect(credentials, session_path).await
    }
}

/// An authenticated Telegram user session.
pub struct TelegramSession {
    client: Client,
    session_path: PathBuf,
    /// Chats seen so far, keyed by marked id. Needed to address a chat by id.
    chats: Mutex<HashMap<i64, PackedChat>>,
}

impl TelegramSession {
    /// Connect to Telegram and sign in if the stored session is not authorized.
    pub async fn connect(credentials: &Credentials, session_path: &Path) -> Result<Self, RelayError> {
        let stored = StoredSession::load_file_or_create(session_path).map_err(|e| {
            RelayError::Session(format!(
                "Failed to load session {}: {}",
                session_path.display(),
                e
            ))
        })?;

        info!(session = %session_path.display(), "Connecting to Telegram...");
        let client = Client::connect(Config {
            session: stored,
            api_id: credentials.account_id,
            api_hash: credentials.secret.expose_secret().to_string(),
            params: InitParams {
                device_model: "tg-group-relay".to_string(),
                app_version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
        })
        .await
        .map_err(|e| RelayError::Auth(format!("Failed to connect: {}", e)))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| RelayError::Auth(format!("Failed to check authorization: {}", e)))?;

        if authorized {
            info!("Already authorized");
        } else {
            sign_in(&client, &credentials.phone).await?;
            save_session(&client, session_path)?;
        }

        Ok(Self {
            client,
            session_path: session_path.to_path_buf(),
            chats: Mutex::new(HashMap::new()),
        })
    }

    fn remember(&self, chat: PackedChat) {
        self.chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(marked_id(chat.ty, chat.id), chat);
    }

    fn cached(&self, chat_id: i64) -> Option<PackedChat> {
        self.chats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&chat_id)
            .cloned()
    }

    /// Find the access details for a chat, walking the dialog list on a cache miss.
    async fn resolve_chat(&self, chat_id: i64) -> Result<PackedChat, RelayError> {
        if let Some(chat) = self.cached(chat_id) {
            return Ok(chat);
        }

        debug!(chat_id, "Chat not cached, scanning dialogs");
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await? {
            let packed = dialog.chat().pack();
            self.remember(packed.clone());
            if marked_id(packed.ty, packed.id) == chat_id {
                return Ok(packed);
            }
        }

        Err(RelayError::UnknownChat(chat_id))
    }

    fn to_inbound(&self, message: &Message) -> InboundMessage {
        let chat = message.chat().pack();
        let inbound = inbound_message(
            chat.ty,
            chat.id,
            message.markdown_text(),
            message
                .sender()
                .map(|sender| Sender::new(sender.id(), sender.username().map(str::to_string))),
        );
        self.remember(chat);
        inbound
    }
}

#[async_trait]
impl Messenger for TelegramSession {
    async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
        let chat = self.resolve_chat(chat_id).await?;
        self.client
            .send_message(chat, InputMessage::markdown(text))
            .await?;
        Ok(())
    }

    async fn resolve_sender(&self, message: &InboundMessage) -> Result<Option<Sender>, RelayError> {
        // Updates carry the sender entity already; no round-trip needed.
        Ok(message.sender.clone())
    }

    fn platform_name(&self) -> &'static str {
        "Telegram"
    }
}

#[async_trait]
impl Session for TelegramSession {
    async fn identity(&self) -> Result<Identity, RelayError> {
        let me = self.client.get_me().await?;
        Ok(Identity {
            id: me.id(),
            name: me.full_name(),
            username: me.username().map(str::to_string),
        })
    }

    async fn next_message(&self) -> Result<Option<InboundMessage>, RelayError> {
        loop {
            match self.client.next_update().await? {
                Some(Update::NewMessage(message)) => return Ok(Some(self.to_inbound(&message))),
                Some(_) => continue,
                // Graceful disconnection
                None => return Ok(None),
            }
        }
    }

    async fn close(&self) -> Result<(), RelayError> {
        save_session(&self.client, &self.session_path)
    }
}

/// Convert a bare id to the marked form used in configuration (Bot API style).
pub fn marked_id(ty: PackedType, id: i64) -> i64 {
    match ty {
        PackedType::User | PackedType::Bot => id,
        PackedType::Chat => -id,
        _ => -(CHANNEL_ID_OFFSET + id),
    }
}

/// Build the relay's view of a backend message.
///
/// `text` is the message rendered back to markdown, so links and emphasis
/// survive forwarding. Empty text (media without caption) becomes `None`.
fn inbound_message(
    ty: PackedType,
    bare_id: i64,
    text: String,
    sender: Option<Sender>,
) -> InboundMessage {
    InboundMessage {
        chat_id: Some(marked_id(ty, bare_id)),
        text: (!text.is_empty()).then_some(text),
        sender,
    }
}

/// Run the interactive login: phone code, then the 2FA password if one is set.
async fn sign_in(client: &Client, phone: &str) -> Result<(), RelayError> {
    info!(phone, "Not authorized, requesting login code");
    let token = client
        .request_login_code(phone)
        .await
        .map_err(|e| RelayError::Auth(format!("Failed to request login code: {}", e)))?;

    let code = prompt("Enter the login code Telegram sent you: ").await?;
    let user = match client.sign_in(&token, &code).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("none").to_string();
            let password = prompt(&format!("Enter your 2FA password (hint: {}): ", hint)).await?;
            client
                .check_password(password_token, password.as_str())
                .await
                .map_err(|e| RelayError::Auth(format!("Password rejected: {}", e)))?
        }
        Err(e) => return Err(RelayError::Auth(format!("Sign-in failed: {}", e))),
    };

    info!(user_id = user.id(), "Signed in");
    Ok(())
}

/// Write the session to disk, creating the file and its directory if needed.
fn save_session(client: &Client, path: &Path) -> Result<(), RelayError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    if !path.exists() {
        fs::File::create(path)?;
    }
    client.session().save_to_file(path).map_err(|e| {
        RelayError::Session(format!("Failed to save session {}: {}", path.display(), e))
    })?;
    info!(session = %path.display(), "Session saved");
    Ok(())
}

/// Print a prompt and read one line from stdin.
async fn prompt(message: &str) -> Result<String, RelayError> {
    let message = message.to_string();
    let line = tokio::task::spawn_blocking(move || -> io::Result<String> {
        let mut stdout = io::stdout();
        stdout.write_all(message.as_bytes())?;
        stdout.flush()?;

        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await??;

    Ok(line.trim().to_string())
}
