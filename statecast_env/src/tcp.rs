//! TCP implementation of NetworkTransport.
//!
//! The producer listens; every consumer opens one stream. After a fixed-size
//! handshake the producer writes `header | frame` for the newest published
//! frame whenever one is available. Frames have a fixed length agreed in the
//! handshake, so the stream needs no further framing.
//!
//! ```text
//! handshake: "SCST" | producer NodeId (16) | frame_len u64 LE
//! frame:     sequence u64 LE | timestamp_ms u64 LE | frame_len bytes
//! ```
//!
//! Both directions hand frames to and from the render loop through
//! `tokio::sync::watch`, which only keeps the latest value: a slow consumer
//! skips intermediate frames instead of applying backpressure.
//!
//! When the producer's stream closes, the consumer keeps redialing the same
//! address and re-validates the handshake on every connect. Frames from a
//! restarted producer carry its new `NodeId`.

use crate::error::EnvError;
use crate::network::NetworkTransport;
use crate::types::{FrameEnvelope, NodeId};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const MAGIC: &[u8; 4] = b"SCST";
const HANDSHAKE_LEN: usize = 4 + 16 + 8;
const RECONNECT_DELAY: Duration = Duration::from_millis(250);

type LatestFrame = Option<Arc<FrameEnvelope>>;
/// Newest frame a consumer received, tagged with the producer that sent it
type Inbound = Option<(NodeId, Arc<FrameEnvelope>)>;

enum Endpoint {
    Producer {
        latest: Arc<watch::Sender<LatestFrame>>,
        local_addr: SocketAddr,
    },
    Consumer {
        inbox: Mutex<watch::Receiver<Inbound>>,
    },
}

/// Frame transport over TCP streams.
pub struct TcpTransport {
    local_id: NodeId,
    frame_len: usize,
    endpoint: Endpoint,
    /// Accept loop (producer) or stream reader (consumer)
    task: JoinHandle<()>,
}

impl TcpTransport {
    /// Binds the producer side and starts accepting consumers.
    ///
    /// Fails with `EnvError::ChannelUnavailable` if the address cannot be bound.
    pub async fn bind_producer(
        addr: impl ToSocketAddrs,
        local_id: NodeId,
        frame_len: usize,
    ) -> Result<Self, EnvError> {
        let listener = TcpListener::bind(addr).await.map_err(EnvError::unavailable)?;
        let local_addr = listener.local_addr().map_err(EnvError::unavailable)?;
        let (latest, _) = watch::channel(None);
        let latest = Arc::new(latest);

        info!("Producer {} listening on {}", local_id, local_addr);
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&latest), local_id, frame_len));

        Ok(Self {
            local_id,
            frame_len,
            endpoint: Endpoint::Producer { latest, local_addr },
            task,
        })
    }

    /// Connects a consumer to a producer and validates the handshake.
    ///
    /// Fails with `EnvError::FrameSizeMismatch` when the producer was
    /// configured for a different frame size.
    pub async fn connect_consumer(
        addr: impl ToSocketAddrs,
        local_id: NodeId,
        frame_len: usize,
    ) -> Result<Self, EnvError> {
        let stream = TcpStream::connect(addr).await.map_err(EnvError::unavailable)?;
        let producer_addr = stream.peer_addr().map_err(EnvError::unavailable)?;
        let (stream, producer) = handshake(stream, frame_len).await?;

        info!("Consumer {} connected to producer {}", local_id, producer);
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(follow_producer(producer_addr, stream, producer, tx, frame_len));

        Ok(Self {
            local_id,
            frame_len,
            endpoint: Endpoint::Consumer {
                inbox: Mutex::new(rx),
            },
            task,
        })
    }

    /// Returns the bound address (producer only).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.endpoint {
            Endpoint::Producer { local_addr, .. } => Some(*local_addr),
            Endpoint::Consumer { .. } => None,
        }
    }

    /// Returns the frame length agreed for this session.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
impl NetworkTransport for TcpTransport {
    async fn send(&self, target: NodeId, _frame: FrameEnvelope) -> Result<(), EnvError> {
        // Streams are anonymous on the producer side
        Err(EnvError::unreachable(target))
    }

    async fn broadcast(&self, frame: FrameEnvelope) -> usize {
        let Endpoint::Producer { latest, .. } = &self.endpoint else {
            return 0;
        };
        if frame.size() != self.frame_len {
            warn!(
                "Refusing to publish {} byte frame (session frame is {} bytes)",
                frame.size(),
                self.frame_len
            );
            return 0;
        }
        latest.send_replace(Some(Arc::new(frame)));
        latest.receiver_count()
    }

    fn try_recv(&self) -> Option<(NodeId, FrameEnvelope)> {
        let Endpoint::Consumer { inbox } = &self.endpoint else {
            return None;
        };
        let mut inbox = inbox.lock().ok()?;
        if !inbox.has_changed().unwrap_or(false) {
            return None;
        }
        let latest = inbox.borrow_and_update().clone();
        latest.map(|(producer, frame)| (producer, (*frame).clone()))
    }

    fn local_id(&self) -> NodeId {
        self.local_id
    }
}

fn handshake_bytes(producer: NodeId, frame_len: usize) -> [u8; HANDSHAKE_LEN] {
    let mut handshake = [0u8; HANDSHAKE_LEN];
    handshake[0..4].copy_from_slice(MAGIC);
    handshake[4..20].copy_from_slice(&producer.to_bytes());
    handshake[20..28].copy_from_slice(&(frame_len as u64).to_le_bytes());
    handshake
}

fn parse_handshake(handshake: &[u8; HANDSHAKE_LEN], frame_len: usize) -> Result<NodeId, EnvError> {
    if &handshake[0..4] != MAGIC {
        return Err(EnvError::Handshake("bad magic".to_string()));
    }
    let mut id = [0u8; 16];
    id.copy_from_slice(&handshake[4..20]);
    let mut remote = [0u8; 8];
    remote.copy_from_slice(&handshake[20..28]);
    let remote = u64::from_le_bytes(remote);

    if remote != frame_len as u64 {
        return Err(EnvError::FrameSizeMismatch {
            local: frame_len as u64,
            remote,
        });
    }
    Ok(NodeId::from_bytes(id))
}

/// Reads and validates the producer's handshake.
async fn handshake(
    mut stream: TcpStream,
    frame_len: usize,
) -> Result<(TcpStream, NodeId), EnvError> {
    let mut bytes = [0u8; HANDSHAKE_LEN];
    stream
        .read_exact(&mut bytes)
        .await
        .map_err(|e| EnvError::Handshake(e.to_string()))?;
    let producer = parse_handshake(&bytes, frame_len)?;
    Ok((stream, producer))
}

async fn accept_loop(
    listener: TcpListener,
    latest: Arc<watch::Sender<LatestFrame>>,
    local_id: NodeId,
    frame_len: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!("Consumer connected from {}", peer);
                let rx = latest.subscribe();
                tokio::spawn(serve_consumer(stream, rx, local_id, frame_len));
            }
            Err(e) => {
                warn!("Accept failed: {}", e);
            }
        }
    }
}

async fn serve_consumer(
    mut stream: TcpStream,
    mut rx: watch::Receiver<LatestFrame>,
    local_id: NodeId,
    frame_len: usize,
) {
    if let Err(e) = stream.write_all(&handshake_bytes(local_id, frame_len)).await {
        debug!("Handshake write failed: {}", e);
        return;
    }
    // A frame published before this consumer connected is sent right away
    rx.mark_changed();

    while rx.changed().await.is_ok() {
        let latest = rx.borrow_and_update().clone();
        let Some(frame) = latest else { continue };

        let written = async {
            stream.write_all(&frame.header_bytes()).await?;
            stream.write_all(&frame.frame).await
        }
        .await;
        if let Err(e) = written {
            debug!("Consumer stream closed: {}", e);
            return;
        }
    }
}

/// Streams frames into the inbox, redialing whenever the producer goes away.
///
/// Returns once the transport that owns the inbox is dropped.
async fn follow_producer(
    addr: SocketAddr,
    mut stream: TcpStream,
    mut producer: NodeId,
    tx: watch::Sender<Inbound>,
    frame_len: usize,
) {
    loop {
        match read_frames(&mut stream, producer, &tx, frame_len).await {
            Ok(()) => return,
            Err(e) => warn!("Producer {} stream closed: {}", producer, e),
        }

        loop {
            tokio::time::sleep(RECONNECT_DELAY).await;
            if tx.is_closed() {
                return;
            }
            let connected = match TcpStream::connect(addr).await {
                Ok(fresh) => handshake(fresh, frame_len).await,
                Err(e) => Err(EnvError::unavailable(e)),
            };
            match connected {
                Ok((fresh, id)) => {
                    info!("Reconnected to producer {} at {}", id, addr);
                    stream = fresh;
                    producer = id;
                    break;
                }
                Err(e) => debug!("Reconnect to {} failed: {}", addr, e),
            }
        }
    }
}

/// Reads `header | frame` pairs until the stream fails.
///
/// `Ok` means nobody is listening on the inbox anymore.
async fn read_frames(
    stream: &mut TcpStream,
    producer: NodeId,
    tx: &watch::Sender<Inbound>,
    frame_len: usize,
) -> std::io::Result<()> {
    loop {
        let mut header = [0u8; FrameEnvelope::HEADER_LEN];
        stream.read_exact(&mut header).await?;
        let (sequence, timestamp_ms) = FrameEnvelope::parse_header(&header);

        let mut frame = vec![0u8; frame_len];
        stream.read_exact(&mut frame).await?;

        let envelope = FrameEnvelope::new(sequence, timestamp_ms, frame);
        if tx.send(Some((producer, Arc::new(envelope)))).is_err() {
            return Ok(());
        }
    }
}
