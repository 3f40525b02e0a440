//! Transport capabilities and their TCP and in-memory implementations.
//!
//! A session never touches a socket. It holds a [`TransportHandle`] for
//! outbound writes and is fed inbound events through [`TransportEventSink`].
//! For TCP, [`spawn_connection`] splits the stream into a reader task and a
//! writer task; the writer drains an unbounded queue so `write` never blocks
//! and fails fast once the connection is gone.
//!
//! Frames are a 4-byte big-endian length followed by a bincode encoded
//! [`Packet`].

use crate::error::TransportError;
use crate::session::{SessionEvent, SessionId};
use crate::{Packet, MAX_FRAME_LEN};
use bincode::{deserialize, serialize};
use log::{debug, error, warn};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Outbound half of a connection.
pub trait TransportHandle: Send {
    fn write(&mut self, packet: &Packet) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// Receiver of the inbound events of one connection.
pub trait TransportEventSink {
    fn on_data(&mut self, packet: Packet) -> SessionEvent;
    fn on_closed(&mut self);
    fn on_error(&mut self, error: &TransportError);
}

/// Inbound events produced by a connection's reader and writer tasks.
#[derive(Debug)]
pub enum ConnectionEvent {
    Data { id: SessionId, packet: Packet },
    Closed { id: SessionId },
    Error { id: SessionId, error: TransportError },
}

impl ConnectionEvent {
    pub fn id(&self) -> SessionId {
        match self {
            ConnectionEvent::Data { id, .. }
            | ConnectionEvent::Closed { id }
            | ConnectionEvent::Error { id, .. } => *id,
        }
    }
}

pub async fn write_frame<W>(writer: &mut W, packet: &Packet) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let data = serialize(packet)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(data.len()));
    }

    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the next frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Packet>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-frame");
            return Err(eof.into());
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(deserialize(&data)?))
}

#[derive(Debug)]
enum Outbound {
    Packet(Packet),
    Close,
}

/// Handle onto a TCP connection driven by [`spawn_connection`].
#[derive(Debug)]
pub struct ChannelHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: AbortHandle,
}

impl TransportHandle for ChannelHandle {
    fn write(&mut self, packet: &Packet) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Packet(packet.clone()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Close);
        self.reader.abort();
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Spawns the reader and writer tasks for `stream`.
///
/// Every inbound frame, the clean closure and any failure are reported on
/// `events` tagged with `id`. Must be called from within a tokio runtime.
pub fn spawn_connection(
    stream: TcpStream,
    id: SessionId,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> ChannelHandle {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle on connection {}: {}", id, e);
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_writer(id, write_half, outbound_rx, events.clone()));
    let reader = tokio::spawn(run_reader(id, read_half, events)).abort_handle();

    ChannelHandle {
        outbound: outbound_tx,
        reader,
    }
}

async fn run_reader(
    id: SessionId,
    read_half: OwnedReadHalf,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let mut reader = BufReader::new(read_half);

    loop {
        match read_frame(&mut reader).await {
            Ok(Some(packet)) => {
                if events.send(ConnectionEvent::Data { id, packet }).is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("Connection {} closed by peer", id);
                let _ = events.send(ConnectionEvent::Closed { id });
                break;
            }
            Err(error) => {
                warn!("Error reading from connection {}: {}", id, error);
                let _ = events.send(ConnectionEvent::Error { id, error });
                break;
            }
        }
    }
}

async fn run_writer(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Packet(packet) => {
                if let Err(error) = write_frame(&mut writer, &packet).await {
                    error!("Failed to write to connection {}: {}", id, error);
                    let _ = events.send(ConnectionEvent::Error { id, error });
                    return;
                }
            }
            Outbound::Close => break,
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of connection {} failed: {}", id, e);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    sent: Vec<Packet>,
    closed: bool,
    fail_writes: bool,
}

/// Transport that records writes in memory instead of touching the network.
///
/// Clones share state, so a caller can keep one clone to inspect what a
/// session sent after handing the other to it.
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes every subsequent write fail as a broken pipe.
    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    pub fn sent(&self) -> Vec<Packet> {
        self.state().sent.clone()
    }

    /// Sent packets rendered as text, the way a console would show them.
    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|packet| match packet {
                Packet::Line(text) => text,
                Packet::Message(envelope) => envelope.to_string(),
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl TransportHandle for MemoryTransport {
    fn write(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away").into());
        }
        state.sent.push(packet.clone());
        Ok(())
    }

    fn close(&mut self) {
        self.state().closed = true;
    }
}
