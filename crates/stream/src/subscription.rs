//! Bounded subscription channels for server-streaming calls
//!
//! Every server-streaming call shares one shape: a producer task feeds a
//! bounded channel, the transport drains the other end. Backpressure is the
//! channel bound; cancellation is the subscriber dropping (or closing) its
//! end, which the producer observes as a failed send between items.
//!
//! Termination contract: closing the channel without a trailing error item
//! is a clean end of stream. A data-source failure is delivered as one
//! final `Err` item, so callers can distinguish the two.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tablet_common::{Error, ErrorCode, Result};
use tokio::sync::mpsc;

/// Create a subscription with the given buffer capacity.
pub fn channel<T>(capacity: usize) -> (StreamSender<T>, Subscription<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (StreamSender { tx }, Subscription { rx })
}

/// Producer side of a subscription.
pub struct StreamSender<T> {
    tx: mpsc::Sender<Result<T>>,
}

impl<T> Clone for StreamSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Why a non-blocking send did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrySendError {
    /// Buffer full; the subscriber is slow. Try again later.
    Full,
    /// The subscriber went away; the stream is canceled.
    Closed,
}

impl<T> StreamSender<T> {
    /// Send one item, waiting for buffer space. Fails with `Canceled` once
    /// the subscriber has gone away, which producers treat as the signal to
    /// stop cleanly.
    pub async fn send(&self, item: T) -> Result<()> {
        self.tx
            .send(Ok(item))
            .await
            .map_err(|_| canceled())
    }

    /// Send from a blocking (non-async) context.
    pub fn blocking_send(&self, item: T) -> Result<()> {
        self.tx
            .blocking_send(Ok(item))
            .map_err(|_| canceled())
    }

    /// Send without waiting.
    pub fn try_send(&self, item: T) -> std::result::Result<(), TrySendError> {
        self.tx.try_send(Ok(item)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TrySendError::Full,
            mpsc::error::TrySendError::Closed(_) => TrySendError::Closed,
        })
    }

    /// Reserve buffer space before producing the item. Used by latest-wins
    /// streams to read their source only once the subscriber is ready, so
    /// at most one unconsumed item ever sits in the buffer.
    pub async fn reserve(&self) -> Result<StreamPermit<'_, T>> {
        self.tx
            .reserve()
            .await
            .map(StreamPermit)
            .map_err(|_| canceled())
    }

    /// Deliver a terminal error and end the stream.
    pub async fn fail(self, err: Error) {
        // Best effort: the subscriber may already be gone.
        let _ = self.tx.send(Err(err)).await;
    }

    /// True once the subscriber has dropped or closed its end.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait for the subscriber to go away. Producers that block on an
    /// upstream source select on this so cancellation is observed even
    /// when the source is quiet.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// A reserved slot in the subscription buffer.
pub struct StreamPermit<'a, T>(mpsc::Permit<'a, Result<T>>);

impl<T> StreamPermit<'_, T> {
    pub fn send(self, item: T) {
        self.0.send(Ok(item));
    }
}

/// Consumer side of a server-streaming call.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> Subscription<T> {
    /// Next item. `None` is a clean end of stream; `Some(Err(_))` is a
    /// data-source failure and is always the last item.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    /// Cancel the stream. The producer sees the next send fail and stops;
    /// items already buffered are discarded.
    pub fn cancel(&mut self) {
        self.rx.close();
    }

    /// Drain the stream to completion, collecting items. Stops at the
    /// terminal error, if any.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.recv().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Re-shape the items, preserving the termination contract. Spawns a
    /// forwarding task; cancellation propagates through it in both
    /// directions.
    pub fn map<U, F>(mut self, f: F) -> Subscription<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T) -> U + Send + 'static,
    {
        spawn_producer(1, move |tx| async move {
            while let Some(item) = self.recv().await {
                tx.send(f(item?)).await?;
            }
            Ok(())
        })
    }
}

impl<T> tokio_stream::Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Spawn a producer task feeding a fresh subscription.
///
/// The producer returns `Ok(())` for a clean end of stream. A `Canceled`
/// error (the subscriber went away) also ends the stream cleanly; any other
/// error is delivered to the subscriber as the terminal item.
pub fn spawn_producer<T, F, Fut>(capacity: usize, producer: F) -> Subscription<T>
where
    T: Send + 'static,
    F: FnOnce(StreamSender<T>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let (tx, sub) = channel(capacity);
    let err_tx = tx.clone();
    tokio::spawn(async move {
        match producer(tx).await {
            Ok(()) => {}
            Err(e) if e.code() == ErrorCode::Canceled => {
                tracing::debug!("stream producer stopped: subscriber canceled");
            }
            Err(e) => {
                tracing::debug!("stream producer failed: {}", e);
                err_tx.fail(e).await;
            }
        }
    });
    sub
}

fn canceled() -> Error {
    Error::Canceled("subscriber went away".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clean_end_of_stream() {
        let mut sub = spawn_producer(4, |tx| async move {
            tx.send(1u32).await?;
            tx.send(2).await?;
            Ok(())
        });

        assert_eq!(sub.recv().await.unwrap().unwrap(), 1);
        assert_eq!(sub.recv().await.unwrap().unwrap(), 2);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_source_failure_is_terminal_item() {
        let mut sub = spawn_producer(4, |tx| async move {
            tx.send(1u32).await?;
            Err(Error::Unavailable("source died".to_string()))
        });

        assert_eq!(sub.recv().await.unwrap().unwrap(), 1);
        let err = sub.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unavailable);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_producer() {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut sub = spawn_producer(1, |tx| async move {
            let mut n = 0u32;
            let result = loop {
                n += 1;
                if let Err(e) = tx.send(n).await {
                    break Err(e);
                }
            };
            let _ = done_tx.send(());
            result
        });

        assert_eq!(sub.recv().await.unwrap().unwrap(), 1);
        sub.cancel();

        // Producer observes the closed channel and terminates.
        done_rx.await.unwrap();
    }

    #[tokio::test]
    async fn test_map_preserves_termination() {
        let sub = spawn_producer(4, |tx| async move {
            tx.send(2u32).await?;
            tx.send(3).await?;
            Ok(())
        });

        let doubled = sub.map(|n| n * 2);
        assert_eq!(doubled.collect().await.unwrap(), vec![4, 6]);
    }

    #[tokio::test]
    async fn test_try_send_full_and_closed() {
        let (tx, mut sub) = channel::<u32>(1);
        tx.try_send(1).unwrap();
        assert_eq!(tx.try_send(2), Err(TrySendError::Full));

        sub.cancel();
        assert_eq!(tx.try_send(3), Err(TrySendError::Closed));
        assert!(tx.is_closed());
    }
}
