//! Change-event sources and forwarding
//!
//! The binlog/replication internals live behind the `ChangeSource` trait.
//! An implementation hands back a receiver of ordered events; channel close
//! is a clean end (source shut down), an `Err` item is a source failure.
//! The forwarding pump here turns that receiver into a `Subscription` with
//! the standard cancellation and termination behavior.

use crate::subscription::{Subscription, spawn_producer};
use tablet_common::{Position, Result, StreamEvent, VEvent, VPosition};
use tokio::sync::mpsc;

/// Source of ordered change events, fed by replication internals.
///
/// Both subscription flavors resume from a position token: events strictly
/// after `from` are delivered, in order, each carrying its own position.
/// `None` means "from the current end of the log". The two flavors are
/// deliberately independent surfaces; an implementation must not serve one
/// by translating the other.
pub trait ChangeSource: Send + Sync + 'static {
    /// Subscribe to the legacy update stream.
    fn subscribe_updates(
        &self,
        from: Option<Position>,
    ) -> Result<mpsc::Receiver<Result<StreamEvent>>>;

    /// Subscribe to the vstream.
    fn subscribe_vstream(
        &self,
        from: Option<VPosition>,
    ) -> Result<mpsc::Receiver<Result<VEvent>>>;
}

/// Pump events from a source receiver into a fresh subscription.
///
/// Subscriber cancellation stops the pump (dropping the source receiver,
/// which tells the source to stop producing); a source failure becomes the
/// subscription's terminal error.
pub fn forward_events<T: Send + 'static>(
    mut source: mpsc::Receiver<Result<T>>,
    capacity: usize,
) -> Subscription<T> {
    spawn_producer(capacity, move |tx| async move {
        loop {
            tokio::select! {
                item = source.recv() => match item {
                    Some(item) => tx.send(item?).await?,
                    None => return Ok(()),
                },
                _ = tx.closed() => return Ok(()),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_common::{Error, ErrorCode, Timestamp};

    fn event(n: u64) -> StreamEvent {
        StreamEvent {
            position: Position::new(format!("pos-{:06}", n)),
            statements: vec![format!("update t set v = {}", n)],
            timestamp: Timestamp::from_micros(n),
        }
    }

    #[tokio::test]
    async fn test_forward_in_order_then_clean_end() {
        let (tx, rx) = mpsc::channel(8);
        for n in 1..=3 {
            tx.send(Ok(event(n))).await.unwrap();
        }
        drop(tx);

        let events = forward_events(rx, 4).collect().await.unwrap();
        let positions: Vec<_> = events.iter().map(|e| e.position.as_str().to_string()).collect();
        assert_eq!(positions, vec!["pos-000001", "pos-000002", "pos-000003"]);
    }

    #[tokio::test]
    async fn test_source_failure_terminates_with_error() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(event(1))).await.unwrap();
        tx.send(Err(Error::Unavailable("binlog rotated away".to_string())))
            .await
            .unwrap();
        drop(tx);

        let mut sub = forward_events::<StreamEvent>(rx, 4);
        assert!(sub.recv().await.unwrap().is_ok());
        let err = sub.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unavailable);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_drops_source_receiver() {
        let (tx, rx) = mpsc::channel(1);
        let mut sub = forward_events::<StreamEvent>(rx, 1);
        tx.send(Ok(event(1))).await.unwrap();
        let _ = sub.recv().await;
        sub.cancel();

        // Once the pump notices, the source's send side closes.
        tx.closed().await;
    }
}
