//! Operator console commands

use crate::network::Server;
use crate::{SERVER_MSG_PREFIX, SHUTDOWN_WARNING};
use log::{debug, info};
use shared::{interpret, Action, ChatError, CommandContext, Envelope, Flow, Role, MAX_LINE_LEN};

impl Server {
    /// Interprets one operator line and applies it.
    ///
    /// Rejected commands are reported on the operator's notifier only.
    pub fn handle_console_line(&mut self, line: &str) -> Flow {
        let ctx = CommandContext {
            role: Role::ServerOperator {
                listening: self.listener.is_listening(),
            },
            host: self.listener.host(),
            port: self.listener.port(),
        };

        let result = interpret(line, &ctx).and_then(|action| self.apply(action));
        match result {
            Ok(flow) => flow,
            Err(e) => {
                debug!("Operator command {:?} rejected: {}", line, e);
                self.notifier.notify(&e.to_string());
                Flow::Continue
            }
        }
    }

    fn apply(&mut self, action: Action) -> Result<Flow, ChatError> {
        match action {
            Action::Send(text) => {
                if text.len() > MAX_LINE_LEN {
                    return Err(ChatError::LineTooLong(text.len()));
                }
                let envelope = Envelope::system(format!("{}{}", SERVER_MSG_PREFIX, text));
                self.hub.broadcast(&envelope, None);
            }
            Action::Quit => {
                info!("Operator requested shutdown");
                return Ok(Flow::Quit);
            }
            Action::StartListening => {
                self.listener.start()?;
            }
            Action::StopListening => self.listener.stop(&mut self.hub)?,
            Action::CloseAll => self.close_all(),
            Action::SetHost(host) => {
                self.listener.set_host(host)?;
                self.notifier
                    .notify(&format!("Host set to {}", self.listener.host()));
            }
            Action::SetPort(port) => {
                self.listener.set_port(port)?;
                self.notifier.notify(&format!("Port set to {}", port));
            }
            Action::Report(text) => self.notifier.notify(&text),
            Action::Nothing | Action::Login { .. } | Action::Logoff => {}
        }
        Ok(Flow::Continue)
    }

    /// Stops listening and disconnects every client.
    fn close_all(&mut self) {
        if self.listener.is_listening() {
            // Only fails when not listening
            let _ = self.listener.stop(&mut self.hub);
        }
        self.hub.broadcast(&Envelope::system(SHUTDOWN_WARNING), None);
        self.hub.close_all();
    }
}
