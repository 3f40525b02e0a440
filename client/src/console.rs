//! User console commands

use crate::network::ChatClient;
use crate::{CONNECTION_CLOSED, SEND_FAILED};
use log::{debug, warn};
use shared::{interpret, Action, ChatError, CommandContext, Flow, Role, SessionState};

impl ChatClient {
    /// Interprets one console line and applies it.
    ///
    /// Rejections are shown on the notifier; only fatal errors are returned.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow, ChatError> {
        let ctx = CommandContext {
            role: Role::Client(self.session.state()),
            host: self.session.host(),
            port: self.session.port(),
        };
        let action = interpret(line, &ctx);

        let result = match action {
            Ok(action) => self.apply(action).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(flow) => Ok(flow),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Console line {:?} rejected: {}", line, e);
                self.notifier.notify(&e.to_string());
                Ok(Flow::Continue)
            }
        }
    }

    async fn apply(&mut self, action: Action) -> Result<Flow, ChatError> {
        match action {
            Action::Send(text) => match self.session.send_line(&text) {
                Err(ChatError::SendFailed(e)) => {
                    warn!("Could not send to server: {}", e);
                    self.notifier.notify(SEND_FAILED);
                    self.renew_session();
                }
                result => result?,
            },
            Action::Quit => {
                self.quit();
                return Ok(Flow::Quit);
            }
            Action::Logoff => self.logoff()?,
            Action::Login { identity } => {
                let previous = match identity {
                    Some(identity) => Some(self.session.set_identity(&identity)?),
                    None => None,
                };
                if let Err(e) = self.connect().await {
                    if let (Some(previous), ChatError::ConnectError { .. }) = (previous, &e) {
                        self.session.restore_identity(previous);
                    }
                    return Err(e);
                }
            }
            Action::SetHost(host) => {
                self.session.set_host(host)?;
                self.notifier
                    .notify(&format!("Host set to {}", self.session.host()));
            }
            Action::SetPort(port) => {
                self.session.set_port(port)?;
                self.notifier.notify(&format!("Port set to {}", port));
            }
            Action::Report(text) => self.notifier.notify(&text),
            Action::Nothing
            | Action::StartListening
            | Action::StopListening
            | Action::CloseAll => {}
        }
        Ok(Flow::Continue)
    }

    fn logoff(&mut self) -> Result<(), ChatError> {
        if self.session.state() == SessionState::Disconnected {
            return Err(ChatError::NotConnected);
        }
        self.session.close();
        self.notifier.notify(CONNECTION_CLOSED);
        self.renew_session();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::network::ChatClient;
    use crate::{ClientConfig, CONNECTION_CLOSED};
    use shared::transport::read_frame;
    use shared::{ChatError, Flow, Packet, RecordingNotifier, SessionState};
    use std::sync::Arc;
    use tokio::io::BufReader;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn disconnected(identity: Option<&str>) -> (ChatClient, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let config = ClientConfig {
            identity: identity.map(str::to_string),
            ..ClientConfig::default()
        };
        (ChatClient::new(config, Arc::new(notifier.clone())), notifier)
    }

    async fn listening() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_chat_while_disconnected_is_rejected() {
        let (mut client, notifier) = disconnected(Some("alice"));

        let flow = client.handle_line("hello").await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert!(notifier.contains(&ChatError::NotConnected.to_string()));
    }

    #[tokio::test]
    async fn test_reconfigure_while_disconnected() {
        let (mut client, notifier) = disconnected(Some("alice"));

        client.handle_line("#sethost 127.0.0.1").await.unwrap();
        client.handle_line("#setport 6000").await.unwrap();
        client.handle_line("#gethost").await.unwrap();
        client.handle_line("#getport").await.unwrap();

        assert_eq!(client.session().host(), "127.0.0.1");
        assert_eq!(client.session().port(), 6000);
        assert!(notifier.contains("Current host: 127.0.0.1"));
        assert!(notifier.contains("Current port: 6000"));
    }

    #[tokio::test]
    async fn test_invalid_port_leaves_port_unchanged() {
        let (mut client, notifier) = disconnected(Some("alice"));

        client.handle_line("#setport abc").await.unwrap();

        assert_eq!(client.session().port(), shared::DEFAULT_PORT);
        assert!(notifier.contains(&ChatError::InvalidPort("abc".to_string()).to_string()));
    }

    #[tokio::test]
    async fn test_logoff_while_disconnected_reports() {
        let (mut client, notifier) = disconnected(Some("alice"));

        client.handle_line("#logoff").await.unwrap();

        assert!(notifier.contains(&ChatError::NotConnected.to_string()));
        assert_eq!(client.session().id(), 1);
    }

    #[tokio::test]
    async fn test_login_with_new_identity_and_logoff() {
        let (listener, port) = listening().await;
        let (mut client, notifier) = disconnected(Some("alice"));
        client.handle_line("#sethost 127.0.0.1").await.unwrap();
        client.handle_line(&format!("#setport {}", port)).await.unwrap();

        client.handle_line("#login carol").await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        assert_eq!(client.state(), SessionState::Active);
        assert_eq!(
            read_frame(&mut peer).await.unwrap(),
            Some(Packet::Line("#login carol".to_string()))
        );

        client.handle_line("#setport 1234").await.unwrap();
        assert_eq!(client.session().port(), port);
        assert!(notifier.contains(&ChatError::MustDisconnectFirst("port").to_string()));

        client.handle_line("#login").await.unwrap();
        assert!(notifier.contains(&ChatError::AlreadyActive.to_string()));

        client.handle_line("#logoff").await.unwrap();
        assert_eq!(client.state(), SessionState::Disconnected);
        assert_eq!(client.session().identity(), Some("carol"));
        assert!(notifier.contains(CONNECTION_CLOSED));
    }

    #[tokio::test]
    async fn test_failed_login_keeps_previous_identity() {
        let (listener, port) = listening().await;
        drop(listener);
        let (mut client, notifier) = disconnected(Some("alice"));
        client.handle_line("#sethost 127.0.0.1").await.unwrap();
        client.handle_line(&format!("#setport {}", port)).await.unwrap();

        client.handle_line("#login carol").await.unwrap();

        assert!(notifier.contains("Couldn't connect"));
        assert_eq!(client.state(), SessionState::Disconnected);
        assert_eq!(client.session().identity(), Some("alice"));
    }

    #[tokio::test]
    async fn test_overlong_chat_is_refused_locally() {
        let (listener, port) = listening().await;
        let (mut client, notifier) = disconnected(Some("alice"));
        client.handle_line("#sethost 127.0.0.1").await.unwrap();
        client.handle_line(&format!("#setport {}", port)).await.unwrap();
        client.handle_line("#login").await.unwrap();
        let (_peer, _) = listener.accept().await.unwrap();

        let line = "x".repeat(shared::MAX_LINE_LEN + 1);
        client.handle_line(&line).await.unwrap();

        assert!(notifier.contains(&ChatError::LineTooLong(line.len()).to_string()));
        assert_eq!(client.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_chat_reaches_server_verbatim() {
        let (listener, port) = listening().await;
        let (mut client, _notifier) = disconnected(Some("alice"));
        client.handle_line("#sethost 127.0.0.1").await.unwrap();
        client.handle_line(&format!("#setport {}", port)).await.unwrap();
        client.handle_line("#login").await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        client.handle_line("hello #everyone").await.unwrap();

        assert_eq!(
            read_frame(&mut peer).await.unwrap(),
            Some(Packet::Line("#login alice".to_string()))
        );
        assert_eq!(
            read_frame(&mut peer).await.unwrap(),
            Some(Packet::Line("hello #everyone".to_string()))
        );
    }

    #[tokio::test]
    async fn test_login_without_identity_is_fatal() {
        let (listener, port) = listening().await;
        let (mut client, _notifier) = disconnected(None);
        client.handle_line("#sethost 127.0.0.1").await.unwrap();
        client.handle_line(&format!("#setport {}", port)).await.unwrap();

        let result = client.handle_line("#login").await;

        assert!(matches!(result, Err(ChatError::IdentityRequired)));
        drop(listener);
    }

    #[tokio::test]
    async fn test_server_only_commands_are_unknown() {
        let (mut client, notifier) = disconnected(Some("alice"));

        client.handle_line("#start").await.unwrap();

        assert!(notifier.contains(&ChatError::UnknownCommand("start".to_string()).to_string()));
    }

    #[tokio::test]
    async fn test_quit_ends_console() {
        let (mut client, _notifier) = disconnected(Some("alice"));
        assert_eq!(client.handle_line("#quit").await.unwrap(), Flow::Quit);
    }

    #[tokio::test]
    async fn test_run_stops_at_end_of_input() {
        let (mut client, notifier) = disconnected(Some("alice"));
        let script = Builder::new()
            .read(b"#setport 6000\n")
            .read(b"#getport\n")
            .build();

        client.run(BufReader::new(script)).await.unwrap();

        assert!(notifier.contains("Current port: 6000"));
        assert_eq!(client.state(), SessionState::Disconnected);
    }
}
