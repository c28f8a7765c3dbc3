//! Relay agent: session lifecycle and the update loop.

use crate::config::Config;
use crate::error::RelayError;
use crate::messenger::{Connector, Messenger, Session};
use crate::relay;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How the agent stopped when it stopped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The operator interrupted the process
    Interrupted,
    /// The backend closed the update stream
    Disconnected,
}

/// Run the relay until `interrupt` resolves or the session ends.
///
/// Credentials are validated before anything else; a missing credential
/// returns immediately without touching the network. Each inbound message is
/// handled on its own task, so handlers may interleave while waiting on the
/// backend. The first handler error stops the loop. Once the update stream
/// closes, in-flight handlers are awaited, but `interrupt` still cuts them short.
pub async fn run<C, F>(config: Arc<Config>, connector: &C, interrupt: F) -> Result<Shutdown, RelayError>
where
    C: Connector,
    F: Future<Output = ()>,
{
    config.credentials.validate()?;

    let session = Arc::new(
        connector
            .connect(&config.credentials, &config.session_path)
            .await?,
    );

    let me = session.identity().await?;
    info!(
        platform = session.platform_name(),
        id = me.id,
        host = %get_hostname(),
        "Connected as {} (@{})",
        me.name,
        me.username.as_deref().unwrap_or("no username")
    );

    for warning in config.warnings() {
        warn!("{}", warning);
    }

    info!(
        group = config.target_group_id,
        handles = ?config.target_user_handles.handles(),
        destination = config.destination_chat_id,
        "Listening for new messages"
    );

    let mut handlers = JoinSet::new();
    let mut stream_open = true;
    tokio::pin!(interrupt);

    let result = loop {
        if !stream_open && handlers.is_empty() {
            break Ok(Shutdown::Disconnected);
        }

        tokio::select! {
            biased;

            _ = &mut interrupt => {
                info!("Interrupt received, shutting down");
                handlers.abort_all();
                break Ok(Shutdown::Interrupted);
            }
            Some(joined) = handlers.join_next() => {
                if let Err(e) = flatten(joined) {
                    error!(error = %e, "Message handler failed");
                    handlers.abort_all();
                    break Err(e);
                }
            }
            next = session.next_message(), if stream_open => match next {
                Ok(Some(message)) => {
                    let config = Arc::clone(&config);
                    let session = Arc::clone(&session);
                    handlers.spawn(async move {
                        relay::handle_message(&config, session.as_ref(), &message).await
                    });
                }
                Ok(None) => {
                    info!(in_flight = handlers.len(), "Update stream closed");
                    stream_open = false;
                }
                Err(e) => {
                    error!(error = %e, "Lost connection to {}", session.platform_name());
                    handlers.abort_all();
                    break Err(e);
                }
            }
        }
    };

    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to persist session");
    }
    info!("Relay stopped");

    result
}

type Joined = Result<Result<relay::Outcome, RelayError>, tokio::task::JoinError>;

fn flatten(joined: Joined) -> Result<relay::Outcome, RelayError> {
    joined?
}

/// Get system hostname.
fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::error::{ConfigError, EXIT_AUTH};
    use crate::messenger::{Identity, InboundMessage, Messenger, Sender};
    use crate::relay::tests::test_config;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const GROUP: i64 = -1001234567890;
    const DESTINATION: i64 = 123456789;

    type Sent = Arc<Mutex<Vec<(i64, String)>>>;

    struct ScriptedSession {
        script: Mutex<VecDeque<InboundMessage>>,
        sent: Sent,
        closed: Arc<AtomicBool>,
        hang_when_empty: bool,
        fail_send: bool,
        hang_send: bool,
    }

    #[async_trait]
    impl Messenger for ScriptedSession {
        async fn send_markdown(&self, chat_id: i64, text: &str) -> Result<(), RelayError> {
            if self.hang_send {
                std::future::pending::<()>().await;
            }
            if self.fail_send {
                return Err(RelayError::UnknownChat(chat_id));
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn resolve_sender(
            &self,
            message: &InboundMessage,
        ) -> Result<Option<Sender>, RelayError> {
            Ok(message.sender.clone())
        }

        fn platform_name(&self) -> &'static str {
            "Scripted"
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn identity(&self) -> Result<Identity, RelayError> {
            Ok(Identity {
                id: 42,
                name: "Relay Account".to_string(),
                username: Some("relay".to_string()),
            })
        }

        async fn next_message(&self) -> Result<Option<InboundMessage>, RelayError> {
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(message) => Ok(Some(message)),
                None if self.hang_when_empty => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(&self) -> Result<(), RelayError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubConnector {
        messages: Vec<InboundMessage>,
        connects: AtomicUsize,
        sent: Sent,
        closed: Arc<AtomicBool>,
        reject_login: bool,
        hang_when_empty: bool,
        fail_send: bool,
        hang_send: bool,
    }

    impl StubConnector {
        fn with_messages(messages: Vec<InboundMessage>) -> Self {
            Self {
                messages,
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for StubConnector {
        type Session = ScriptedSession;

        async fn connect(
            &self,
            _credentials: &Credentials,
            _session_path: &Path,
        ) -> Result<ScriptedSession, RelayError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.reject_login {
                return Err(RelayError::Auth("PHONE_CODE_INVALID".to_string()));
            }
            Ok(ScriptedSession {
                script: Mutex::new(self.messages.iter().cloned().collect()),
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
                hang_when_empty: self.hang_when_empty,
                fail_send: self.fail_send,
                hang_send: self.hang_send,
            })
        }
    }

    fn configured(destination: i64) -> Arc<Config> {
        let mut config = test_config(destination);
        config.credentials = Credentials {
            account_id: 12345,
            secret: SecretString::from("0123456789abcdef".to_string()),
            phone: "+12345678900".to_string(),
        };
        Arc::new(config)
    }

    fn message(chat_id: i64, username: &str, text: &str) -> InboundMessage {
        InboundMessage::new(chat_id, text, Some(Sender::new(7, Some(username.to_string()))))
    }

    #[tokio::test]
    async fn test_missing_credentials_never_connect() {
        let config = Arc::new(test_config(DESTINATION));
        let connector = StubConnector::default();

        let result = run(config, &connector, std::future::pending()).await;

        assert!(matches!(
            result,
            Err(RelayError::Config(ConfigError::MissingCredentials(_)))
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_login_is_fatal() {
        let connector = StubConnector {
            reject_login: true,
            ..Default::default()
        };

        let err = run(configured(DESTINATION), &connector, std::future::pending())
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), EXIT_AUTH);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_relays_matching_messages_until_disconnected() {
        let connector = StubConnector::with_messages(vec![
            message(GROUP, "alice", "first"),
            message(-100555, "alice", "elsewhere"),
            message(GROUP, "mallory", "not listed"),
            message(GROUP, "bob", "second"),
        ]);

        let shutdown = run(configured(DESTINATION), &connector, std::future::pending())
            .await
            .unwrap();

        assert_eq!(shutdown, Shutdown::Disconnected);
        let mut bodies: Vec<String> = connector.sent().into_iter().map(|(_, b)| b).collect();
        bodies.sort();
        assert_eq!(
            bodies,
            vec![
                "**New message from @alice in group:**\nfirst".to_string(),
                "**New message from @bob in group:**\nsecond".to_string(),
            ]
        );
        assert!(connector.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_duplicate_events_are_sent_twice() {
        let event = message(GROUP, "alice", "again");
        let connector = StubConnector::with_messages(vec![event.clone(), event]);

        run(configured(DESTINATION), &connector, std::future::pending())
            .await
            .unwrap();

        assert_eq!(connector.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_unset_destination_runs_without_sending() {
        let connector = StubConnector::with_messages(vec![message(GROUP, "alice", "gm")]);

        let shutdown = run(configured(0), &connector, std::future::pending())
            .await
            .unwrap();

        assert_eq!(shutdown, Shutdown::Disconnected);
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn test_interrupt_stops_cleanly() {
        let connector = StubConnector {
            hang_when_empty: true,
            ..Default::default()
        };

        let shutdown = run(configured(DESTINATION), &connector, async {})
            .await
            .unwrap();

        assert_eq!(shutdown, Shutdown::Interrupted);
        assert!(connector.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_failure_stops_the_loop() {
        let connector = StubConnector {
            messages: vec![message(GROUP, "alice", "gm")],
            hang_when_empty: true,
            fail_send: true,
            ..Default::default()
        };

        let result = run(configured(DESTINATION), &connector, std::future::pending()).await;

        assert!(matches!(result, Err(RelayError::UnknownChat(DESTINATION))));
        assert!(connector.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_interrupt_cuts_short_pending_sends_after_stream_closes() {
        let connector = StubConnector {
            messages: vec![message(GROUP, "alice", "gm")],
            hang_send: true,
            ..Default::default()
        };
        let interrupt = tokio::time::sleep(std::time::Duration::from_millis(50));

        let shutdown = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            run(configured(DESTINATION), &connector, interrupt),
        )
        .await
        .expect("run should stop once interrupted")
        .unwrap();

        assert_eq!(shutdown, Shutdown::Interrupted);
        assert!(connector.sent().is_empty());
        assert!(connector.closed.load(Ordering::SeqCst));
    }
}
