//! Per-connection tasks
//!
//! After the hello, every connection is split into a writer task fed by an
//! unbounded channel and a reader loop that turns frames into
//! [`TransportEvent`]s. Each accepted connection emits exactly one
//! `Closed` event, after any `Error`, whether the read or the write side
//! failed.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use swarmchat_core::{
    ConnectionId, Direction, IncomingConnection, PublicKey, SessionStream, TransportError,
    TransportEvent,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Result, SwarmError};
use crate::handshake;
use crate::topic::Topic;

/// Grace period for queued frames when the swarm shuts down
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

// ----------------------------------------------------------------------------
// Stream Handle
// ----------------------------------------------------------------------------

enum Outbound {
    Frame(Bytes),
    End,
}

/// [`SessionStream`] backed by a connection's writer task
pub struct FramedStreamHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    max_frame_length: usize,
}

impl SessionStream for FramedStreamHandle {
    /// Queue one frame; frames over the codec limit are refused here
    fn write(&self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        if bytes.len() > self.max_frame_length {
            return Err(TransportError::FrameTooLarge {
                len: bytes.len(),
                max: self.max_frame_length,
            });
        }
        self.outbound
            .send(Outbound::Frame(Bytes::copy_from_slice(bytes)))
            .map_err(|_| TransportError::Closed)
    }

    fn end(&self) -> std::result::Result<(), TransportError> {
        self.outbound
            .send(Outbound::End)
            .map_err(|_| TransportError::Closed)
    }
}

// ----------------------------------------------------------------------------
// Connection Context
// ----------------------------------------------------------------------------

/// State shared by every connection of one swarm
pub(crate) struct ConnectionContext {
    pub topic: Topic,
    pub local_key: PublicKey,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub shutdown: CancellationToken,
    pub handshake_timeout: Duration,
    pub max_frame_length: usize,
    next_connection_id: AtomicU64,
}

impl ConnectionContext {
    pub fn new(
        topic: Topic,
        local_key: PublicKey,
        events: mpsc::UnboundedSender<TransportEvent>,
        shutdown: CancellationToken,
        handshake_timeout: Duration,
        max_frame_length: usize,
    ) -> Self {
        Self {
            topic,
            local_key,
            events,
            shutdown,
            handshake_timeout,
            max_frame_length,
            next_connection_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    fn emit(&self, event: TransportEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| SwarmError::EventChannelClosed)
    }
}

// ----------------------------------------------------------------------------
// Connection Driver
// ----------------------------------------------------------------------------

type FrameSink<T> = SplitSink<Framed<T, LengthDelimitedCodec>, Bytes>;
type FrameStream<T> = SplitStream<Framed<T, LengthDelimitedCodec>>;

/// Run one TCP connection from hello to close
pub(crate) async fn drive(
    context: Arc<ConnectionContext>,
    socket: TcpStream,
    direction: Direction,
) -> Result<()> {
    let remote_addr = socket.peer_addr().ok();
    if let Err(e) = socket.set_nodelay(true) {
        debug!(remote = ?remote_addr, "Failed to set TCP_NODELAY: {}", e);
    }
    drive_stream(context, socket, remote_addr, direction).await
}

/// Run one byte stream from hello to close
///
/// Errors before the connection is surfaced (hello failures) are returned;
/// once surfaced, failures are reported as events instead. A failed write
/// ends the connection the same way a failed read does.
pub(crate) async fn drive_stream<T>(
    context: Arc<ConnectionContext>,
    io: T,
    remote_addr: Option<SocketAddr>,
    direction: Direction,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(context.max_frame_length)
        .new_codec();
    let mut framed = Framed::new(io, codec);

    let public_key = tokio::select! {
        () = context.shutdown.cancelled() => return Ok(()),
        result = handshake::exchange(
            &mut framed,
            &context.topic,
            &context.local_key,
            context.handshake_timeout,
        ) => result?,
    };

    let connection_id = context.allocate_id();
    debug!(
        connection_id = %connection_id,
        remote = ?remote_addr,
        %direction,
        peer = %public_key.identifier(),
        "Hello accepted"
    );

    let (sink, mut frames) = framed.split();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let closing = context.shutdown.child_token();
    let mut writer = tokio::spawn(write_loop(sink, outbound_rx, connection_id, closing.clone()));

    context.emit(TransportEvent::Connection(IncomingConnection {
        connection_id,
        stream: Arc::new(FramedStreamHandle {
            outbound,
            max_frame_length: context.max_frame_length,
        }),
        public_key,
        direction,
        remote_addr,
    }))?;

    let result = read_loop(&context, &closing, &mut frames, connection_id, remote_addr).await;

    if context.shutdown.is_cancelled() {
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            trace!(connection_id = %connection_id, "Writer did not drain before shutdown");
        }
    } else if closing.is_cancelled() {
        // the writer cancelled us on its way out
        if let Ok(Err(e)) = (&mut writer).await {
            context.emit(TransportEvent::Error {
                connection_id,
                error: TransportError::Io(e),
            })?;
        }
    }
    writer.abort();

    context.emit(TransportEvent::Closed { connection_id })?;
    result
}

async fn read_loop<T>(
    context: &ConnectionContext,
    closing: &CancellationToken,
    frames: &mut FrameStream<T>,
    connection_id: ConnectionId,
    remote_addr: Option<SocketAddr>,
) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            () = closing.cancelled() => return Ok(()),
            frame = frames.next() => match frame {
                Some(Ok(bytes)) => {
                    trace!(connection_id = %connection_id, len = bytes.len(), "Frame received");
                    context.emit(TransportEvent::Data {
                        connection_id,
                        bytes: bytes.to_vec(),
                    })?;
                }
                Some(Err(e)) => {
                    warn!(connection_id = %connection_id, remote = ?remote_addr, "Read failed: {}", e);
                    context.emit(TransportEvent::Error {
                        connection_id,
                        error: TransportError::Io(e),
                    })?;
                    return Ok(());
                }
                None => {
                    debug!(connection_id = %connection_id, remote = ?remote_addr, "Remote closed the stream");
                    return Ok(());
                }
            }
        }
    }
}

async fn write_loop<T>(
    mut sink: FrameSink<T>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    connection_id: ConnectionId,
    closing: CancellationToken,
) -> io::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(bytes) => {
                if let Err(e) = sink.send(bytes).await {
                    warn!(connection_id = %connection_id, "Write failed: {}", e);
                    closing.cancel();
                    return Err(e);
                }
            }
            Outbound::End => {
                if let Err(e) = sink.close().await {
                    debug!(connection_id = %connection_id, "Close failed: {}", e);
                }
                return Ok(());
            }
        }
    }
    Ok(())
}
