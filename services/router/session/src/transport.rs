//! Transport seam and the TCP transport.
//!
//! The router only needs "send bytes to neighbor" plus a stream of inbound
//! byte messages. Over TCP every message travels on its own short-lived
//! connection as one length-prefixed frame.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use router_wire::{encode_frame, FrameDecoder, NodeId, DEFAULT_MAX_FRAME_SIZE};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default connect timeout for one TCP send
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1200);

/// Capacity of an inbound byte channel
pub const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Stream of inbound byte messages for one router instance
pub type Inbound = mpsc::Receiver<Bytes>;

/// Send bytes to a neighbor
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one encoded message to `to`
    async fn send(&self, to: &NodeId, bytes: Bytes) -> Result<(), TransportError>;
}

/// Create a TCP listener bound to the given address
pub async fn listen_tcp(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Connect to a TCP address
pub async fn connect_tcp(addr: SocketAddr) -> tokio::io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

/// TCP transport: one connection per message
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addresses: HashMap<NodeId, SocketAddr>,
    connect_timeout: Duration,
    max_frame_size: usize,
}

impl TcpTransport {
    /// Create a transport resolving node ids through `addresses`
    pub fn new(addresses: HashMap<NodeId, SocketAddr>) -> Self {
        Self {
            addresses,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Address of a node
    pub fn address(&self, node: &NodeId) -> Option<SocketAddr> {
        self.addresses.get(node).copied()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, to: &NodeId, bytes: Bytes) -> Result<(), TransportError> {
        let addr = self
            .address(to)
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;
        let frame = encode_frame(&bytes, self.max_frame_size)?;

        let mut stream = tokio::time::timeout(self.connect_timeout, connect_tcp(addr))
            .await
            .map_err(|_| TransportError::Timeout {
                peer: to.clone(),
                after: self.connect_timeout,
            })??;
        stream.write_all(&frame).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Accept loop feeding an [`Inbound`] channel
#[derive(Debug)]
pub struct TcpInbound {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl TcpInbound {
    /// Bind `addr` and start accepting; every decoded frame is pushed to the
    /// returned channel
    pub async fn bind(addr: SocketAddr) -> Result<(Self, Inbound), TransportError> {
        let listener = listen_tcp(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        info!(%local_addr, "Listening for router messages");
        let task = tokio::spawn(accept_loop(listener, tx));
        Ok((Self { local_addr, task }, rx))
    }

    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting; the inbound channel closes once in-flight readers finish
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for TcpInbound {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<Bytes>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        if tx.is_closed() {
            break;
        }
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(e) = read_frames(stream, &tx).await {
                debug!(%peer, "Dropping connection: {}", e);
            }
        });
    }
}

/// Read frames until EOF, forwarding each body
async fn read_frames(mut stream: TcpStream, tx: &mpsc::Sender<Bytes>) -> Result<(), TransportError> {
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        while let Some(body) = decoder.decode(&mut buf)? {
            tx.send(body).await.map_err(|_| TransportError::Closed)?;
        }
        if stream.read_buf(&mut buf).await? == 0 {
            decoder.finish(&buf)?;
            return Ok(());
        }
    }
}
