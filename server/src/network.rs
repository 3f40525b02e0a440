//! Server network layer: TCP acceptor and the main event loop

use crate::listener::{Acceptor, ListeningController};
use crate::registry::Hub;
use crate::ServerConfig;
use log::{debug, error, info, warn};
use shared::transport::spawn_connection;
use shared::{ChatError, ConnectionEvent, Flow, Notifier, Session, SessionId};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LISTEN_BACKLOG: u32 = 1024;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Accepted { stream: TcpStream, addr: SocketAddr },
}

/// Accepts TCP connections on a background task while listening.
pub struct TcpAcceptor {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    task: Option<JoinHandle<()>>,
}

impl TcpAcceptor {
    pub fn new(server_tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            server_tx,
            task: None,
        }
    }

    fn bind(host: &str, port: u16) -> io::Result<TcpListener> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "host resolved to no address")
        })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        // Sessions accepted earlier keep the port busy across #stop / #start
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(LISTEN_BACKLOG)
    }
}

impl Acceptor for TcpAcceptor {
    fn listen(&mut self, host: &str, port: u16) -> Result<SocketAddr, ChatError> {
        let listen_failed = |source| ChatError::ListenFailed {
            addr: format!("{}:{}", host, port),
            source,
        };

        let listener = Self::bind(host, port).map_err(listen_failed)?;
        let local_addr = listener.local_addr().map_err(listen_failed)?;

        self.stop_listening();
        self.task = Some(tokio::spawn(accept_loop(listener, self.server_tx.clone())));
        Ok(local_addr)
    }

    fn stop_listening(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TcpAcceptor {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

async fn accept_loop(listener: TcpListener, server_tx: mpsc::UnboundedSender<ServerMessage>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Accepted TCP connection from {}", addr);
                if server_tx.send(ServerMessage::Accepted { stream, addr }).is_err() {
                    debug!("Server loop gone, accept loop exiting");
                    break;
                }
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        }
    }
}

/// Chat server owning the hub and the listening controller.
///
/// All state is touched from [`Server::run`] only: accepted sockets,
/// per-connection events and operator lines are queued on channels and
/// handled one at a time.
pub struct Server {
    pub(crate) hub: Hub,
    pub(crate) listener: ListeningController<TcpAcceptor>,
    pub(crate) notifier: Arc<dyn Notifier>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    conn_tx: mpsc::UnboundedSender<ConnectionEvent>,
    conn_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    next_session_id: SessionId,
}

impl Server {
    pub fn new(config: ServerConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        let listener = ListeningController::new(
            TcpAcceptor::new(server_tx),
            config.host,
            config.port,
            notifier.clone(),
        );

        Server {
            hub: Hub::new(notifier.clone()),
            listener,
            notifier,
            server_rx,
            conn_tx,
            conn_rx,
            next_session_id: 1,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_listening()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Must be called from within a tokio runtime.
    pub fn start_listening(&mut self) -> Result<SocketAddr, ChatError> {
        self.listener.start()
    }

    /// Runs until `#quit` is read from `input`.
    ///
    /// End of `input` does not stop the server; it keeps serving clients
    /// until the future is dropped. Every session is closed on the way out.
    pub async fn run<R>(&mut self, input: R)
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;

        info!("Server started");

        loop {
            tokio::select! {
                line = lines.next_line(), if input_open => {
                    match line {
                        Ok(Some(line)) => {
                            if self.handle_console_line(&line) == Flow::Quit {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Console input closed");
                            input_open = false;
                        }
                        Err(e) => {
                            error!("Failed to read console input: {}", e);
                            input_open = false;
                        }
                    }
                },

                Some(message) = self.server_rx.recv() => {
                    self.handle_server_message(message);
                },

                Some(event) = self.conn_rx.recv() => {
                    self.hub.handle_event(event);
                },

                else => break,
            }
        }

        self.shutdown();
    }

    /// Stops listening and closes every session.
    pub fn shutdown(&mut self) {
        if self.listener.is_listening() {
            if let Err(e) = self.listener.stop(&mut self.hub) {
                warn!("Failed to stop listening: {}", e);
            }
        }
        self.hub.close_all();
        info!("Server shutting down");
    }

    fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Accepted { stream, addr } => {
                if !self.listener.is_listening() {
                    debug!("Dropping connection from {} queued before stop", addr);
                    return;
                }
                self.accept(stream, addr);
            }
        }
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = self.next_session_id;
        self.next_session_id += 1;

        let handle = spawn_connection(stream, id, self.conn_tx.clone());
        if !self.hub.accept(Session::accepted(id, Box::new(handle), addr)) {
            debug!("Connection from {} closed on arrival", addr);
        }
    }
}
