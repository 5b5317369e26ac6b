//! Dedicated writer task for ordered frame sending.
//!
//! Frames are queued on an mpsc channel and drained by a single task, so
//! writes on one connection are strictly FIFO and never interleave. The
//! task batches queued frames into vectored writes.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! Caller N ─┘
//! ```
//!
//! After a frame's bytes have been written, the task fires the sent-hook
//! with the frame's meta and payload, in wire order.

use std::io::IoSlice;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{Result, WirecallError};
use crate::protocol::{FrameMeta, Header, HEADER_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Hook invoked after a frame's bytes reach the socket.
pub type SentHook = Arc<dyn Fn(&FrameMeta, &Bytes) + Send + Sync>;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (12 bytes).
    header: [u8; HEADER_SIZE],
    /// Decoded meta, kept for the sent-hook.
    meta: FrameMeta,
    /// Pre-encoded meta block.
    meta_bytes: Bytes,
    /// Payload bytes (may be empty for failed responses).
    payload: Bytes,
}

impl OutboundFrame {
    /// Encode a frame for sending. The meta block is serialized once,
    /// here; the payload is shared, never copied.
    pub fn encode(meta: FrameMeta, payload: Bytes) -> Result<Self> {
        let meta_bytes = Bytes::from(meta.encode()?);
        let header = Header::new(meta_bytes.len() as u32, payload.len() as u32).encode();
        Ok(Self {
            header,
            meta,
            meta_bytes,
            payload,
        })
    }

    /// The frame's meta block.
    #[inline]
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.meta_bytes.len() + self.payload.len()
    }

    /// The frame's wire parts, in order.
    #[inline]
    fn parts(&self) -> [&[u8]; 3] {
        [&self.header, &self.meta_bytes, &self.payload]
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; all clones share the queue, the pending counter, and
/// the closed flag.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::Sender<OutboundFrame>,
    /// Pending frame count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Set once the owning connection starts closing; sends fail fast.
    closed: Arc<AtomicBool>,
    /// Wakes the writer task so it drains and exits without waiting for
    /// every handle clone to drop.
    shutdown: Arc<Notify>,
    /// Maximum pending frames.
    max_pending: usize,
    /// Backpressure timeout.
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            max_pending,
            timeout,
        }
    }

    /// Send a frame to the writer task.
    ///
    /// Waits if backpressure is active, timing out after the configured
    /// duration. Fails fast with `ConnectionClosed` once the connection
    /// has started closing.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WirecallError::ConnectionClosed);
        }

        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Count the frame before handing it to the channel so the task's
        // decrement can never race the increment below zero.
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            WirecallError::ConnectionClosed
        })
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if self.closed.load(Ordering::Acquire) {
                return Err(WirecallError::ConnectionClosed);
            }
            if start.elapsed() > self.timeout {
                return Err(WirecallError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Mark the connection as closing. Subsequent sends on any clone fail
    /// with `ConnectionClosed`; the task drains frames already queued,
    /// then exits and releases the write half.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shutdown.notify_one();
    }

    /// Check if the handle has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task exits cleanly once every `WriterHandle` clone is dropped and
/// the queue has drained, or with an error on write failure. `sent_hook`
/// fires per frame after its bytes are written.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    sent_hook: Option<SentHook>,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let shutdown = handle.shutdown.clone();
    let task = tokio::spawn(writer_loop(rx, writer, pending, sent_hook, shutdown));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the socket.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    sent_hook: Option<SentHook>,
    shutdown: Arc<Notify>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // Wait for the first frame, or for close.
        let first = tokio::select! {
            frame = rx.recv() => match frame {
                Some(f) => f,
                // All handles dropped, clean shutdown
                None => return Ok(()),
            },
            _ = shutdown.notified() => {
                // Sends were already disabled; whatever sits in the
                // channel is the complete drain set.
                return drain(&mut rx, &mut writer, &pending, &sent_hook).await;
            }
        };

        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;

        if let Some(hook) = &sent_hook {
            for frame in &batch {
                hook(&frame.meta, &frame.payload);
            }
        }

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Flush frames still queued at close time, then release the writer.
async fn drain<W>(
    rx: &mut mpsc::Receiver<OutboundFrame>,
    writer: &mut W,
    pending: &AtomicUsize,
    sent_hook: &Option<SentHook>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        batch.push(frame);
    }
    if batch.is_empty() {
        return Ok(());
    }

    write_batch(writer, &batch).await?;

    if let Some(hook) = sent_hook {
        for frame in &batch {
            hook(&frame.meta, &frame.payload);
        }
    }

    pending.fetch_sub(batch.len(), Ordering::Release);
    Ok(())
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
///
/// Each frame contributes up to three slices (header, meta block,
/// payload). A single vectored write covers the common case; partial
/// writes resume from the interrupted offset.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(batch.len() * 3);
    for frame in batch {
        for part in frame.parts() {
            if !part.is_empty() {
                slices.push(IoSlice::new(part));
            }
        }
    }

    let total_size: usize = batch.iter().map(|f| f.size()).sum();

    let written = writer.write_vectored(&slices).await?;

    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }

    if written == 0 {
        return Err(WirecallError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "write_vectored returned 0",
        )));
    }

    // Partial write; continue with the remaining bytes.
    let mut total_written = written;

    while total_written < total_size {
        let remaining_slices = build_remaining_slices(batch, total_written);
        if remaining_slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining_slices).await?;
        if written == 0 {
            return Err(WirecallError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut skipped = 0;

    for frame in batch {
        for part in frame.parts() {
            if part.is_empty() {
                continue;
            }

            let part_start = skipped;
            let part_end = skipped + part.len();

            if skip_bytes < part_end {
                let start_in_part = skip_bytes.saturating_sub(part_start);
                slices.push(IoSlice::new(&part[start_in_part..]));
            }
            skipped = part_end;
        }
    }

    slices
}
