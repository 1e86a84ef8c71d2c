//! In-memory change log
//!
//! A `ChangeSource` backed by two independent in-memory logs, one per
//! streaming flavor. Events are retained so late subscribers can resume
//! from any position; live subscribers get new events as they are
//! appended. The two logs never feed each other.

use parking_lot::Mutex;
use tablet_common::{Error, Position, Result, StreamEvent, VEvent, VPosition};
use tablet_stream::ChangeSource;
use tokio::sync::mpsc;

const SUBSCRIBER_BUFFER: usize = 128;

/// In-memory change-event source.
#[derive(Default)]
pub struct MemoryChangeLog {
    updates: Mutex<ChangeLog<StreamEvent>>,
    vstream: Mutex<ChangeLog<VEvent>>,
}

struct ChangeLog<T> {
    events: Vec<T>,
    subscribers: Vec<mpsc::Sender<Result<T>>>,
}

impl<T> Default for ChangeLog<T> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            subscribers: Vec::new(),
        }
    }
}

impl<T: Clone> ChangeLog<T> {
    fn append(&mut self, event: T) {
        self.events.push(event.clone());
        self.subscribers
            .retain(|sub| sub.try_send(Ok(event.clone())).is_ok());
    }

    fn fail(&mut self, err: Error) {
        for sub in self.subscribers.drain(..) {
            let _ = sub.try_send(Err(err.clone()));
        }
    }

    fn subscribe(&mut self, backlog: Vec<T>) -> mpsc::Receiver<Result<T>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER.max(backlog.len() + 1));
        for event in backlog {
            // Capacity covers the backlog; a failed send means the
            // receiver is already gone.
            let _ = tx.try_send(Ok(event));
        }
        self.subscribers.push(tx);
        rx
    }
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the legacy update stream.
    pub fn append_update(&self, event: StreamEvent) {
        self.updates.lock().append(event);
    }

    /// Append to the vstream.
    pub fn append_vevent(&self, event: VEvent) {
        self.vstream.lock().append(event);
    }

    /// Simulate a source failure: every live subscriber on both flavors
    /// gets a terminal error.
    pub fn fail_streams(&self, err: Error) {
        self.updates.lock().fail(err.clone());
        self.vstream.lock().fail(err);
    }
}

impl ChangeSource for MemoryChangeLog {
    fn subscribe_updates(
        &self,
        from: Option<Position>,
    ) -> Result<mpsc::Receiver<Result<StreamEvent>>> {
        let mut log = self.updates.lock();
        let backlog: Vec<StreamEvent> = log
            .events
            .iter()
            .filter(|e| from.as_ref().is_none_or(|p| e.position > *p))
            .cloned()
            .collect();
        Ok(log.subscribe(backlog))
    }

    fn subscribe_vstream(
        &self,
        from: Option<VPosition>,
    ) -> Result<mpsc::Receiver<Result<VEvent>>> {
        let mut log = self.vstream.lock();
        let backlog: Vec<VEvent> = log
            .events
            .iter()
            .filter(|e| from.as_ref().is_none_or(|p| e.position > *p))
            .cloned()
            .collect();
        Ok(log.subscribe(backlog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablet_common::{Timestamp, VEventKind};
    use tablet_stream::forward_events;

    fn update(n: u64) -> StreamEvent {
        StreamEvent {
            position: Position::new(format!("binlog-{:06}", n)),
            statements: vec![format!("stmt-{}", n)],
            timestamp: Timestamp::from_micros(n),
        }
    }

    fn vevent(n: u64) -> VEvent {
        VEvent {
            position: VPosition::new(format!("gtid-{:06}", n)),
            kind: VEventKind::Row,
            payload: None,
            timestamp: Timestamp::from_micros(n),
        }
    }

    #[tokio::test]
    async fn test_resume_from_position_without_gap_or_duplicate() {
        let log = MemoryChangeLog::new();
        for n in 1..=4 {
            log.append_update(update(n));
        }

        let rx = log
            .subscribe_updates(Some(Position::new("binlog-000002")))
            .unwrap();
        let mut sub = forward_events(rx, 8);

        let a = sub.recv().await.unwrap().unwrap();
        let b = sub.recv().await.unwrap().unwrap();
        assert_eq!(a.position.as_str(), "binlog-000003");
        assert_eq!(b.position.as_str(), "binlog-000004");
    }

    #[tokio::test]
    async fn test_flavors_are_independent() {
        let log = MemoryChangeLog::new();
        log.append_update(update(1));
        log.append_vevent(vevent(1));
        log.append_vevent(vevent(2));

        let updates = log.subscribe_updates(None).unwrap();
        let vevents = log.subscribe_vstream(None).unwrap();

        let mut update_sub = forward_events(updates, 8);
        let mut vevent_sub = forward_events(vevents, 8);

        assert_eq!(
            update_sub.recv().await.unwrap().unwrap().position.as_str(),
            "binlog-000001"
        );
        assert_eq!(
            vevent_sub.recv().await.unwrap().unwrap().position.as_str(),
            "gtid-000001"
        );
        assert_eq!(
            vevent_sub.recv().await.unwrap().unwrap().position.as_str(),
            "gtid-000002"
        );
    }
}
