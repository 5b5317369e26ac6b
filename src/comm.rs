//! Full-duplex frame transport over one connection.
//!
//! A [`Communicator`] owns exactly one connected stream and drives two
//! tasks over it: a self-perpetuating read loop that feeds complete frames
//! to an injected [`FrameHandler`], and a writer task draining a FIFO
//! queue (see [`crate::writer`]). Client and server are two independent
//! implementations of the handler capability; the communicator itself
//! knows nothing about calls or dispatch.
//!
//! # Lifecycle
//!
//! `Open → Closing → Closed`. [`Communicator::close`] is idempotent: it
//! stops new sends, cancels the outstanding read, and lets already-queued
//! writes drain (bounded, never hangs). Read errors, write errors, and
//! corrupt frames all funnel into a single `connection_closed`
//! notification, fired at most once per connection.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::{Result, WirecallError};
use crate::protocol::{Frame, FrameBuffer, FrameMeta, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, SentHook, WriterConfig, WriterHandle};

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long `close()` waits for queued writes to drain before detaching.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommState {
    /// Both directions live.
    Open,
    /// Teardown started; sends fail, queued writes may still drain.
    Closing,
    /// Both tasks finished; the socket is released.
    Closed,
}

/// Capability implemented by the owner of a connection.
///
/// Injected into [`Communicator::spawn`]; the read and write tasks call
/// back through it. Handlers run on the connection's I/O tasks, so they
/// must not block; anything long-running gets spawned.
pub trait FrameHandler: Send + Sync + 'static {
    /// A complete frame arrived. `writer` can be cloned to send replies
    /// from spawned tasks.
    fn frame_received(&self, frame: Frame, writer: &WriterHandle);

    /// A frame's bytes were written to the socket, in wire order.
    fn frame_sent(&self, _meta: &FrameMeta, _payload: &Bytes) {}

    /// The connection failed or the peer closed it. Fired at most once;
    /// not fired for a locally initiated `close()`.
    fn connection_closed(&self, error: WirecallError);
}

/// Configuration for a connection.
#[derive(Debug, Clone)]
pub struct CommConfig {
    /// Maximum accepted payload size for incoming frames.
    pub max_payload_size: u32,
    /// Size of the read buffer handed to the socket.
    pub read_buffer_size: usize,
    /// Writer task configuration.
    pub writer: WriterConfig,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            writer: WriterConfig::default(),
        }
    }
}

struct CommShared {
    state: AtomicU8,
    /// Guards the one-shot `connection_closed` notification.
    notified: AtomicBool,
    /// The communicator's own send handle; `None` once closing.
    writer: Mutex<Option<WriterHandle>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    /// Supervisor wrapping the writer I/O task.
    writer_task: Mutex<Option<JoinHandle<()>>>,
}

impl CommShared {
    /// Transition `Open → Closing`: disable sends on every handle clone,
    /// drop our sender so the queue can drain, cancel the outstanding
    /// read. No-op if teardown already started.
    fn begin_close(&self) {
        if self
            .state
            .compare_exchange(
                STATE_OPEN,
                STATE_CLOSING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        let writer = self.writer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(writer) = writer {
            writer.close();
        }

        let read_task = self
            .read_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(read_task) = read_task {
            read_task.abort();
        }
    }
}

/// Async full-duplex frame engine over one connected stream.
pub struct Communicator {
    shared: Arc<CommShared>,
}

impl Communicator {
    /// Spawn the read and write tasks over a TCP stream.
    pub fn spawn(stream: TcpStream, handler: Arc<dyn FrameHandler>, config: CommConfig) -> Self {
        let (reader, write_half) = stream.into_split();
        Self::spawn_io(reader, write_half, handler, config)
    }

    /// Spawn over any split stream. Used by tests with in-memory pipes.
    pub fn spawn_io<R, W>(
        reader: R,
        write_half: W,
        handler: Arc<dyn FrameHandler>,
        config: CommConfig,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let sent_handler = handler.clone();
        let sent_hook: SentHook =
            Arc::new(move |meta, payload| sent_handler.frame_sent(meta, payload));
        let (writer, writer_io_task) =
            spawn_writer_task(write_half, config.writer.clone(), Some(sent_hook));

        let shared = Arc::new(CommShared {
            state: AtomicU8::new(STATE_OPEN),
            notified: AtomicBool::new(false),
            writer: Mutex::new(Some(writer.clone())),
            read_task: Mutex::new(None),
            writer_task: Mutex::new(None),
        });

        // Write-side supervisor: funnel I/O failures into the closed
        // notification and record the terminal state.
        let supervisor = {
            let shared = shared.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                match writer_io_task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(error)) => {
                        tracing::debug!(error = %error, "write side failed");
                        shared.begin_close();
                        if !shared.notified.swap(true, Ordering::SeqCst) {
                            handler.connection_closed(error);
                        }
                    }
                    Err(join_error) => {
                        if !join_error.is_cancelled() {
                            tracing::error!(error = %join_error, "writer task aborted abnormally");
                        }
                    }
                }
                shared.state.store(STATE_CLOSED, Ordering::Release);
            })
        };
        *shared.writer_task.lock().unwrap() = Some(supervisor);

        let read_task = {
            let shared = shared.clone();
            tokio::spawn(read_loop(reader, handler, writer, config, shared))
        };
        *shared.read_task.lock().unwrap() = Some(read_task);

        Self { shared }
    }

    /// Encode and queue a frame for sending. Frames are written in the
    /// order `send` was invoked.
    pub async fn send(&self, meta: FrameMeta, payload: Bytes) -> Result<()> {
        let writer = {
            self.shared
                .writer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        };
        match writer {
            Some(writer) => writer.send(OutboundFrame::encode(meta, payload)?).await,
            None => Err(WirecallError::ConnectionClosed),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommState {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_OPEN => CommState::Open,
            STATE_CLOSING => CommState::Closing,
            _ => CommState::Closed,
        }
    }

    /// Check whether the connection is still open for sends.
    pub fn is_open(&self) -> bool {
        self.state() == CommState::Open
    }

    /// Close the connection: stop new sends, cancel the outstanding read,
    /// and wait (bounded) for queued writes to drain. Idempotent; does not
    /// fire `connection_closed`.
    pub async fn close(&self) {
        self.shared.notified.store(true, Ordering::SeqCst);
        self.shared.begin_close();

        let task = {
            self.shared
                .writer_task
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
        };
        if let Some(task) = task {
            if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                tracing::debug!("write queue did not drain before timeout, detaching");
            }
        }

        self.shared.state.store(STATE_CLOSED, Ordering::Release);
    }
}

/// Self-perpetuating read loop: read bytes, extract complete frames, hand
/// them to the handler, re-arm. Any failure (EOF, I/O error, corrupt
/// frame) terminates the loop and closes the connection.
async fn read_loop<R>(
    mut reader: R,
    handler: Arc<dyn FrameHandler>,
    writer: WriterHandle,
    config: CommConfig,
    shared: Arc<CommShared>,
) where
    R: AsyncRead + Unpin,
{
    let mut frame_buffer = FrameBuffer::with_max_payload(config.max_payload_size);
    let mut buf = vec![0u8; config.read_buffer_size];

    let error = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break WirecallError::ConnectionClosed,
            Ok(n) => n,
            Err(e) => break WirecallError::Io(e),
        };

        match frame_buffer.push(&buf[..n]) {
            Ok(frames) => {
                for frame in frames {
                    handler.frame_received(frame, &writer);
                }
            }
            Err(e) => break e,
        }
    };

    tracing::debug!(error = %error, "read loop terminated");
    shared.begin_close();
    if !shared.notified.swap(true, Ordering::SeqCst) {
        handler.connection_closed(error);
    }
}
