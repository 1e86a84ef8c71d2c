//! Health streaming with latest-wins delivery
//!
//! Snapshots are broadcast over a watch channel: each subscriber holds at
//! most one unconsumed snapshot, and a slow subscriber skips straight to
//! the newest one instead of draining a queue of stale ones. Snapshots go
//! out on every state change and on a steady timer tick in between.

use crate::subscription::{Subscription, spawn_producer};
use std::sync::Arc;
use std::time::Duration;
use tablet_common::HealthSnapshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Broadcasts tablet health to any number of subscribers.
pub struct HealthStreamer {
    tx: watch::Sender<HealthSnapshot>,
    interval: Duration,
}

impl HealthStreamer {
    pub fn new(initial: HealthSnapshot, interval: Duration) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx, interval }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the snapshot and notify all subscribers immediately.
    pub fn set(&self, snapshot: HealthSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Update the snapshot in place and notify all subscribers.
    pub fn update(&self, f: impl FnOnce(&mut HealthSnapshot)) {
        self.tx.send_modify(f);
    }

    /// Subscribe. The first item is the current snapshot; afterwards the
    /// subscriber sees whatever snapshot is newest each time it is ready
    /// for one.
    pub fn subscribe(&self) -> Subscription<HealthSnapshot> {
        let mut rx = self.tx.subscribe();
        rx.mark_changed();
        // Capacity 1, and the producer reserves buffer space before it
        // reads the watch: one unconsumed snapshot at most, and it is the
        // newest one available at send time.
        spawn_producer(1, move |tx| async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            // Streamer dropped; clean end of stream.
                            return Ok(());
                        }
                        let permit = tx.reserve().await?;
                        let snapshot = rx.borrow_and_update().clone();
                        permit.send(snapshot);
                    }
                    _ = tx.closed() => return Ok(()),
                }
            }
        })
    }

    /// Start the steady tick: re-broadcast the current snapshot every
    /// interval so subscribers get a liveness signal even when nothing
    /// changes.
    pub fn start_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let streamer = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(streamer.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                streamer.tx.send_modify(|_| {});
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_common::{TabletType, Target};

    fn snapshot(serving: bool, lag: u64) -> HealthSnapshot {
        let mut s = HealthSnapshot::new(Target::new("ks", "-80", TabletType::Primary));
        s.serving = serving;
        s.replication_lag_seconds = lag;
        s
    }

    #[tokio::test]
    async fn test_first_item_is_current_snapshot() {
        let streamer = HealthStreamer::new(snapshot(true, 0), Duration::from_secs(5));
        let mut sub = streamer.subscribe();
        let first = sub.recv().await.unwrap().unwrap();
        assert!(first.serving);
    }

    #[tokio::test]
    async fn test_slow_subscriber_gets_latest_not_backlog() {
        let streamer = HealthStreamer::new(snapshot(true, 0), Duration::from_secs(5));
        let mut sub = streamer.subscribe();

        // Consume the initial snapshot so the buffer is empty.
        let _ = sub.recv().await.unwrap().unwrap();

        // Three updates while the subscriber is not reading. The watch
        // coalesces them; the subscriber must not see lag 1 or 2.
        streamer.set(snapshot(true, 1));
        streamer.set(snapshot(true, 2));
        streamer.set(snapshot(true, 3));
        tokio::task::yield_now().await;

        let mut last = sub.recv().await.unwrap().unwrap();
        if last.replication_lag_seconds != 3 {
            // The producer may have already buffered one snapshot before
            // the later updates landed; the very next one is the newest.
            last = sub.recv().await.unwrap().unwrap();
        }
        assert_eq!(last.replication_lag_seconds, 3);
    }

    #[tokio::test]
    async fn test_state_change_reaches_subscriber() {
        let streamer = HealthStreamer::new(snapshot(true, 0), Duration::from_secs(5));
        let mut sub = streamer.subscribe();
        let _ = sub.recv().await.unwrap().unwrap();

        streamer.update(|s| {
            s.serving = false;
            s.error = Some("replication stopped".to_string());
        });

        let next = sub.recv().await.unwrap().unwrap();
        assert!(!next.serving);
        assert!(next.error.is_some());
    }

    #[tokio::test]
    async fn test_streamer_drop_ends_stream() {
        let streamer = HealthStreamer::new(snapshot(true, 0), Duration::from_secs(5));
        let mut sub = streamer.subscribe();
        let _ = sub.recv().await.unwrap().unwrap();
        drop(streamer);
        assert!(sub.recv().await.is_none());
    }
}
