//! Streaming response support

use crate::{JoeyError, Result};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Event produced by a streaming chat attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental piece of reply text, never empty
    Delta(String),
    /// Successful end of the stream
    Done,
}

/// Lazy, finite stream of reply events.
///
/// Not restartable; dropping it aborts the underlying request.
pub type DeltaStream = BoxStream<'static, Result<StreamEvent>>;

/// Create a channel-backed delta stream
pub fn create_delta_stream(buffer_size: usize) -> (StreamHandler, DeltaStream) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (StreamHandler { sender }, ReceiverStream::new(receiver).boxed())
}

/// Producer side of a channel-backed delta stream
#[derive(Clone)]
pub struct StreamHandler {
    sender: mpsc::Sender<Result<StreamEvent>>,
}

impl StreamHandler {
    /// Send a delta
    pub async fn send_delta(&self, text: impl Into<String>) -> Result<()> {
        self.send(Ok(StreamEvent::Delta(text.into()))).await
    }

    /// Send an error
    pub async fn send_error(&self, error: JoeyError) -> Result<()> {
        self.send(Err(error)).await
    }

    /// Mark the stream complete
    pub async fn finish(&self) -> Result<()> {
        self.send(Ok(StreamEvent::Done)).await
    }

    async fn send(&self, item: Result<StreamEvent>) -> Result<()> {
        self.sender
            .send(item)
            .await
            .map_err(|e| JoeyError::other(format!("Failed to send stream event: {}", e)))
    }
}

/// Collect all deltas from a stream into a single string
pub async fn collect_stream(mut stream: DeltaStream) -> Result<String> {
    let mut result = String::new();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Delta(text) => result.push_str(&text),
            StreamEvent::Done => break,
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream() {
        let (handler, stream) = create_delta_stream(10);

        tokio::spawn(async move {
            handler.send_delta("Hello").await.unwrap();
            handler.send_delta(" World").await.unwrap();
            handler.finish().await.unwrap();
            // ignored after Done
            let _ = handler.send_delta("!").await;
        });

        let text = collect_stream(stream).await.unwrap();
        assert_eq!(text, "Hello World");
    }

    #[tokio::test]
    async fn test_collect_stream_propagates_error() {
        let (handler, stream) = create_delta_stream(10);
        tokio_test::assert_ok!(handler.send_delta("partial").await);
        tokio_test::assert_ok!(handler.send_error(JoeyError::timeout("stalled")).await);
        drop(handler);

        let err = tokio_test::assert_err!(collect_stream(stream).await);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_closed_channel_ends_stream() {
        let (handler, stream) = create_delta_stream(4);
        handler.send_delta("a").await.unwrap();
        drop(handler);
        assert_eq!(collect_stream(stream).await.unwrap(), "a");
    }
}
