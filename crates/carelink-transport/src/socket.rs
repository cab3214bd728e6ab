//! Persistent socket transport with a tokio mpsc command/event pattern.
//!
//! The connection is owned by a dedicated background task. External code
//! communicates with it through a typed command channel and receives
//! connection state changes and push frames on an event channel, keeping
//! the transport fully asynchronous and decoupled from the service layer.
//!
//! Frames are newline-delimited JSON. Inbound frames whose `messageId`
//! matches a pending correlation entry resolve that request; everything
//! else is forwarded as a push event.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use carelink_shared::constants::RECONNECT_INTERVAL;
use carelink_shared::protocol::{ClientFrame, ServerFrame};
use carelink_shared::types::LinkStatus;

use crate::correlation::PendingRequests;
use crate::error::TransportError;
use crate::link::ChannelLink;

/// Commands sent *into* the socket task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Write a frame to the wire.
    Send(ClientFrame),
    /// Gracefully shut down the task.
    Shutdown,
}

/// Events sent *from* the socket task to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    /// An uncorrelated inbound frame (push event or chat message).
    Frame(ServerFrame),
}

/// Configuration for spawning the socket task.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// `host:port` of the message server.
    pub addr: String,
    /// How long to wait before retrying a failed connection.
    pub reconnect_interval: Duration,
}

impl SocketConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reconnect_interval: RECONNECT_INTERVAL,
        }
    }
}

/// Cheap-to-clone handle to the socket task.
#[derive(Clone)]
pub struct SocketHandle {
    cmd_tx: mpsc::Sender<SocketCommand>,
    connected: Arc<AtomicBool>,
    pending: Arc<PendingRequests>,
}

impl SocketHandle {
    /// Current connection state.
    pub fn status(&self) -> LinkStatus {
        if self.connected.load(Ordering::SeqCst) {
            LinkStatus::Connected
        } else {
            LinkStatus::Disconnected
        }
    }

    /// Issue a correlated request and await the matching response.
    ///
    /// The pending entry is removed on response, timeout, or connection
    /// drop — exactly one resolution per correlation id.
    pub async fn request(
        &self,
        frame: ClientFrame,
        timeout: Duration,
    ) -> Result<ServerFrame, TransportError> {
        let id = frame
            .message_id()
            .map(str::to_string)
            .ok_or(TransportError::MissingCorrelation)?;

        if self.status() != LinkStatus::Connected {
            return Err(TransportError::NotConnected);
        }

        let rx = self.pending.register(id.clone());
        if self.cmd_tx.send(SocketCommand::Send(frame)).await.is_err() {
            self.pending.abandon(&id);
            return Err(TransportError::Closed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Sender dropped: connection lost while waiting.
                self.pending.abandon(&id);
                Err(TransportError::Closed)
            }
            Err(_) => {
                self.pending.abandon(&id);
                debug!(correlation_id = %id, "correlated request timed out");
                Err(TransportError::Timeout)
            }
        }
    }

    /// Fire-and-acknowledge send without correlation.
    pub async fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        if self.status() != LinkStatus::Connected {
            return Err(TransportError::NotConnected);
        }
        self.cmd_tx
            .send(SocketCommand::Send(frame))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the socket task to shut down.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SocketCommand::Shutdown).await;
    }

    /// Number of in-flight correlated requests.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl ChannelLink for SocketHandle {
    fn status(&self) -> LinkStatus {
        SocketHandle::status(self)
    }

    fn request(
        &self,
        frame: ClientFrame,
        timeout: Duration,
    ) -> impl Future<Output = Result<ServerFrame, TransportError>> + Send {
        SocketHandle::request(self, frame, timeout)
    }

    fn send(&self, frame: ClientFrame) -> impl Future<Output = Result<(), TransportError>> + Send {
        SocketHandle::send(self, frame)
    }
}

/// Spawn the socket task.
///
/// Returns the command handle and the event receiver. The task connects,
/// reconnects on a periodic poll while disconnected, and terminates on
/// [`SocketCommand::Shutdown`] or when all handles are dropped.
pub fn spawn_socket(config: SocketConfig) -> (SocketHandle, mpsc::Receiver<LinkEvent>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SocketCommand>(256);
    let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(256);

    let connected = Arc::new(AtomicBool::new(false));
    let pending = Arc::new(PendingRequests::new());

    let handle = SocketHandle {
        cmd_tx,
        connected: connected.clone(),
        pending: pending.clone(),
    };

    tokio::spawn(async move {
        loop {
            match TcpStream::connect(&config.addr).await {
                Ok(stream) => {
                    info!(addr = %config.addr, "socket connected");
                    connected.store(true, Ordering::SeqCst);
                    let _ = event_tx.send(LinkEvent::Connected).await;

                    let shutdown =
                        run_connection(stream, &mut cmd_rx, &event_tx, &pending).await;

                    connected.store(false, Ordering::SeqCst);
                    // Outstanding requests cannot complete on this connection.
                    pending.clear();
                    let _ = event_tx.send(LinkEvent::Disconnected).await;

                    if shutdown {
                        info!("socket task shut down");
                        return;
                    }
                    warn!(addr = %config.addr, "socket disconnected; will reconnect");
                }
                Err(e) => {
                    debug!(addr = %config.addr, error = %e, "connection attempt failed");
                }
            }

            // Wait out the reconnect interval, staying responsive to Shutdown.
            tokio::select! {
                _ = tokio::time::sleep(config.reconnect_interval) => {}
                cmd = cmd_rx.recv() => match cmd {
                    Some(SocketCommand::Shutdown) | None => {
                        info!("socket task shut down");
                        return;
                    }
                    Some(SocketCommand::Send(frame)) => {
                        debug!(frame = ?frame, "dropping outbound frame while disconnected");
                    }
                },
            }
        }
    });

    (handle, event_rx)
}

/// Drive one established connection. Returns `true` when the task should
/// shut down instead of reconnecting.
async fn run_connection(
    stream: TcpStream,
    cmd_rx: &mut mpsc::Receiver<SocketCommand>,
    event_tx: &mpsc::Sender<LinkEvent>,
    pending: &PendingRequests,
) -> bool {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCommand::Send(frame)) => {
                    let line = match frame.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize outbound frame");
                            continue;
                        }
                    };
                    if let Err(e) = write_all_line(&mut write_half, &line).await {
                        warn!(error = %e, "socket write failed");
                        return false;
                    }
                }
                Some(SocketCommand::Shutdown) | None => return true,
            },

            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_inbound(&line, pending, event_tx).await,
                Ok(None) => {
                    debug!("socket closed by peer");
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, "socket read failed");
                    return false;
                }
            },
        }
    }
}

async fn write_all_line(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    line: &str,
) -> std::io::Result<()> {
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await
}

/// Route one inbound line: correlated response or push event.
async fn handle_inbound(line: &str, pending: &PendingRequests, event_tx: &mpsc::Sender<LinkEvent>) {
    let frame = match ServerFrame::from_json(line) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "ignoring malformed inbound frame");
            return;
        }
    };

    if let Some(id) = frame.message_id().map(str::to_string) {
        if pending.resolve(&id, frame.clone()) {
            return;
        }
        // No pending entry: the frame is a push carrying an id echo.
    }

    let _ = event_tx.send(LinkEvent::Frame(frame)).await;
}
