//! A byte-stream tee: forwards chunks to the client unmodified while
//! accumulating a copy for recording. The accumulator is only handed to its
//! callback once the upstream stream ends cleanly — a client disconnect (or
//! any other drop before exhaustion) simply drops the accumulator, matching
//! the "no Exchange on mid-stream cancellation" rule (§4.1, §6).

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;

pub struct RecordingStream<S> {
    inner: S,
    buffer: Vec<u8>,
    on_complete: Option<Box<dyn FnOnce(Vec<u8>) + Send>>,
}

impl<S> RecordingStream<S> {
    pub fn new(inner: S, on_complete: impl FnOnce(Vec<u8>) + Send + 'static) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            on_complete: Some(Box::new(on_complete)),
        }
    }
}

impl<S> Stream for RecordingStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<Bytes, axum::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.buffer.extend_from_slice(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(axum::Error::new(e)))),
            Poll::Ready(None) => {
                if let Some(cb) = this.on_complete.take() {
                    cb(std::mem::take(&mut this.buffer));
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn accumulates_and_forwards_every_chunk() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let source = futures_util::stream::iter(chunks);
        let captured = Arc::new(Mutex::new(None));
        let captured_clone = captured.clone();

        let mut tee = RecordingStream::new(source, move |buf| {
            *captured_clone.lock().unwrap() = Some(buf);
        });

        let mut forwarded = Vec::new();
        while let Some(chunk) = tee.next().await {
            forwarded.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(forwarded, b"hello world");
        assert_eq!(captured.lock().unwrap().as_deref(), Some(&b"hello world"[..]));
    }

    #[tokio::test]
    async fn dropping_before_exhaustion_never_fires_callback() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![Ok(Bytes::from_static(b"partial"))];
        let source = futures_util::stream::iter(chunks);
        let captured = Arc::new(Mutex::new(None::<Vec<u8>>));
        let captured_clone = captured.clone();

        let mut tee = RecordingStream::new(source, move |buf| {
            *captured_clone.lock().unwrap() = Some(buf);
        });
        let _ = tee.next().await;
        drop(tee);

        assert!(captured.lock().unwrap().is_none());
    }
}
