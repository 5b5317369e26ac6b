//! Reply context for request handlers.
//!
//! Carries a request's correlation id and routing fields together with the
//! connection's write handle, so the response frame a handler produces
//! lands on the right connection with the right id.

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::FrameMeta;
use crate::writer::{OutboundFrame, WriterHandle};

/// Context for replying to one request.
///
/// `Clone` is cheap; the underlying writer is a channel handle.
#[derive(Clone)]
pub struct ReplyContext {
    id: u64,
    service: String,
    method: String,
    writer: WriterHandle,
}

impl ReplyContext {
    pub(crate) fn new(meta: &FrameMeta, writer: WriterHandle) -> Self {
        Self {
            id: meta.id,
            service: meta.service.clone(),
            method: meta.method.clone(),
            writer,
        }
    }

    /// The request's correlation id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The requested service name.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The requested method name.
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Send a successful response carrying `payload`.
    pub async fn ok(&self, payload: Bytes) -> Result<()> {
        let meta = FrameMeta::response(self.id, &self.service, &self.method);
        self.send(meta, payload).await
    }

    /// Send a failed response carrying an error description and no
    /// payload.
    pub async fn fail(&self, error_text: &str) -> Result<()> {
        let meta = FrameMeta::failed_response(self.id, &self.service, &self.method, error_text);
        self.send(meta, Bytes::new()).await
    }

    async fn send(&self, meta: FrameMeta, payload: Bytes) -> Result<()> {
        self.writer.send(OutboundFrame::encode(meta, payload)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameBuffer;
    use crate::writer::{spawn_writer_task, WriterConfig};
    use std::time::Duration;

    fn context_over_duplex() -> (ReplyContext, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(4096);
        let (_, write_half) = tokio::io::split(local);
        let (writer, _task) = spawn_writer_task(write_half, WriterConfig::default(), None);

        let meta = FrameMeta::request(7, "Echo", "Echo");
        (ReplyContext::new(&meta, writer), remote)
    }

    #[tokio::test]
    async fn test_ok_reply_mirrors_request_meta() {
        let (ctx, mut remote) = context_over_duplex();
        assert_eq!(ctx.id(), 7);
        assert_eq!(ctx.service(), "Echo");
        assert_eq!(ctx.method(), "Echo");

        ctx.ok(Bytes::from_static(b"result")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buf = vec![0u8; 256];
        let n = tokio::io::AsyncReadExt::read(&mut remote, &mut buf)
            .await
            .unwrap();

        let mut parser = FrameBuffer::new();
        let frames = parser.push(&buf[..n]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id(), 7);
        assert!(frames[0].is_response());
        assert!(!frames[0].is_failed());
        assert_eq!(frames[0].payload(), b"result");
    }

    #[tokio::test]
    async fn test_fail_reply_carries_error_text() {
        let (ctx, mut remote) = context_over_duplex();

        ctx.fail("no such thing").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buf = vec![0u8; 256];
        let n = tokio::io::AsyncReadExt::read(&mut remote, &mut buf)
            .await
            .unwrap();

        let mut parser = FrameBuffer::new();
        let frames = parser.push(&buf[..n]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_failed());
        assert_eq!(
            frames[0].meta.error_text.as_deref(),
            Some("no such thing")
        );
        assert!(frames[0].payload.is_empty());
    }
}
