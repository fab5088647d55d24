//! Cloud relay variant.
//!
//! Instead of the mesh data channel, the wearable can push readings over a
//! persistent TCP connection to a relay. Each reading is an [`HrMessage`]
//! encoded as MessagePack behind a 4-byte big-endian length prefix.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use counterpart_types::{
    decode_frame_len, encode_frame, HeartRate, HrMessage, FRAME_HEADER_LEN,
};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::ClientError;
use crate::sender::HrSender;

const RELAY_QUEUE: usize = 256;

/// Encode one reading as a relay frame.
pub fn encode_reading(reading: HeartRate) -> Result<Vec<u8>, ClientError> {
    let message = HrMessage {
        hr_value: i32::from(reading.bpm()),
    };
    Ok(encode_frame(&message.to_bytes()?)?)
}

/// Sender that streams readings to a TCP relay.
///
/// There is no retry loop: a failed connect is reported to the caller and a
/// failed or stalled write drops the connection until the next
/// [`connect`](HrSender::connect).
pub struct RelayHrSender {
    address: String,
    timeout: Duration,
    stream: Option<TcpStream>,
}

impl RelayHrSender {
    /// Create a sender for the relay at `address`.
    ///
    /// `timeout` bounds the connect and every frame write.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            stream: None,
        }
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

#[async_trait]
impl HrSender for RelayHrSender {
    async fn connect(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Could not disable Nagle on relay socket: {}", e);
                }
                tracing::info!("Connected to relay {}", self.address);
                self.stream = Some(stream);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!("Relay connect to {} failed: {}", self.address, e);
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Relay connect to {} timed out after {:?}",
                    self.address,
                    self.timeout
                );
                false
            }
        }
    }

    async fn send_value(&mut self, reading: HeartRate) {
        let Some(stream) = self.stream.as_mut() else {
            tracing::debug!("Relay not connected, dropping {}", reading);
            return;
        };
        let frame = match encode_reading(reading) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Could not encode {}: {}", reading, e);
                return;
            }
        };
        if let Err(e) = write_frame(stream, &frame, self.timeout).await {
            tracing::warn!("Relay write failed, dropping connection: {}", e);
            self.stream = None;
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("Relay socket shutdown failed: {}", e);
            }
            tracing::info!("Disconnected from relay {}", self.address);
        }
    }
}

/// Write one frame, failing with `TimedOut` if the peer stops reading.
async fn write_frame<W>(writer: &mut W, frame: &[u8], limit: Duration) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, writer.write_all(frame)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("relay write stalled for {:?}", limit),
        )),
    }
}

/// One message received by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayMessage {
    /// Sending peer.
    pub peer: SocketAddr,
    /// Decoded message.
    pub message: HrMessage,
}

/// Bound relay socket, not yet accepting.
pub struct RelayListener {
    listener: TcpListener,
}

impl RelayListener {
    /// Bind the relay to `address`.
    pub async fn bind(address: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    /// Address the relay is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start accepting senders.
    pub fn serve(self) -> RelayServer {
        let (tx, messages) = mpsc::channel(RELAY_QUEUE);
        let task = tokio::spawn(accept_loop(self.listener, tx));
        RelayServer { messages, task }
    }
}

/// Running relay receiver.
pub struct RelayServer {
    messages: mpsc::Receiver<RelayMessage>,
    task: JoinHandle<()>,
}

impl RelayServer {
    /// Next message from any sender. `None` once the relay has stopped.
    pub async fn recv(&mut self) -> Option<RelayMessage> {
        self.messages.recv().await
    }

    /// Stop accepting and drop every connection.
    pub async fn shutdown(self) {
        self.task.abort();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::debug!("Relay accept task ended with error: {}", e);
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<RelayMessage>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::info!("Relay sender connected: {}", peer);
                    connections.spawn(serve_connection(stream, peer, tx.clone()));
                }
                Err(e) => {
                    tracing::warn!("Relay accept failed: {}", e);
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        tracing::error!("Relay connection task failed: {}", e);
                    }
                }
            }
            () = tx.closed() => {
                tracing::debug!("Relay receiver dropped, stopping");
                break;
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, tx: mpsc::Sender<RelayMessage>) {
    match read_frames(&mut stream, peer, &tx).await {
        Ok(()) => tracing::info!("Relay sender disconnected: {}", peer),
        Err(e) => tracing::warn!("Relay connection from {} dropped: {}", peer, e),
    }
}

async fn read_frames(
    stream: &mut TcpStream,
    peer: SocketAddr,
    tx: &mpsc::Sender<RelayMessage>,
) -> Result<(), ClientError> {
    loop {
        let mut header = [0u8; FRAME_HEADER_LEN];
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        let len = decode_frame_len(header)?;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;

        let message = HrMessage::from_bytes(&body)?;
        tracing::debug!("Relay message from {}: {} bpm", peer, message.hr_value);
        if tx.send(RelayMessage { peer, message }).await.is_err() {
            return Ok(());
        }
    }
}
