//! Per-table message delivery
//!
//! One manager owns all delivery state for one message table: the pending
//! rows in delivery order, the in-flight leases, and the poisoned set.
//! Rows are delivered to exactly one subscriber at a time; a row comes
//! back into the pending set only when its lease elapses or its subscriber
//! disconnects. Acks retire rows wherever they currently are, so a late
//! ack that raced with a redelivery still wins, without recalling the copy
//! already sent.

use crate::config::MessengerConfig;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tablet_common::{MessageRow, Timestamp};
use tablet_stream::{StreamSender, Subscription, TrySendError, channel};
use uuid::Uuid;

/// Delivery order: enqueue time, then priority epoch, then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct DeliveryKey {
    time_created: Timestamp,
    epoch: i64,
    id: String,
}

impl DeliveryKey {
    fn for_row(row: &MessageRow) -> Self {
        Self {
            time_created: row.time_created,
            epoch: row.epoch,
            id: row.id.clone(),
        }
    }
}

struct InFlight {
    row: MessageRow,
    subscriber: Uuid,
    lease_deadline: Timestamp,
}

struct SubscriberHandle {
    id: Uuid,
    sender: StreamSender<MessageRow>,
}

#[derive(Default)]
struct ManagerState {
    pending: BTreeMap<DeliveryKey, MessageRow>,
    /// id -> key index over `pending`, so acks can retire by id.
    pending_index: HashMap<String, DeliveryKey>,
    in_flight: HashMap<String, InFlight>,
    poisoned: HashMap<String, MessageRow>,
    subscribers: Vec<SubscriberHandle>,
    rr_cursor: usize,
}

/// Delivery state for one message table.
pub struct MessageManager {
    table: String,
    config: MessengerConfig,
    state: Mutex<ManagerState>,
}

impl MessageManager {
    pub fn new(table: impl Into<String>, config: MessengerConfig) -> Self {
        Self {
            table: table.into(),
            config,
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Add rows to the pending set. Ids already known to the manager (in
    /// any state) are skipped; application writes can be replayed.
    pub fn submit(&self, rows: Vec<MessageRow>) {
        let mut state = self.state.lock();
        for row in rows {
            if state.pending_index.contains_key(&row.id)
                || state.in_flight.contains_key(&row.id)
                || state.poisoned.contains_key(&row.id)
            {
                continue;
            }
            let key = DeliveryKey::for_row(&row);
            state.pending_index.insert(row.id.clone(), key.clone());
            state.pending.insert(key, row);
        }
    }

    /// Attach a new subscriber. Pending rows are shared among all
    /// subscribers of the table, each row going to exactly one of them.
    pub fn subscribe(&self) -> Subscription<MessageRow> {
        let (sender, subscription) = channel(self.config.stream_buffer);
        let mut state = self.state.lock();
        state.subscribers.push(SubscriberHandle {
            id: Uuid::now_v7(),
            sender,
        });
        tracing::debug!(table = %self.table, "message subscriber attached");
        subscription
    }

    /// Retire the given ids. Ids that are unknown, already retired, or
    /// poisoned are skipped; the returned count covers only rows actually
    /// retired by this call.
    pub fn ack(&self, ids: &[String]) -> u64 {
        let mut state = self.state.lock();
        let mut count = 0u64;
        for id in ids {
            if state.in_flight.remove(id).is_some() {
                count += 1;
                continue;
            }
            // The lease may have elapsed and put the row back in pending;
            // the ack still retires it before any redelivery happens.
            if let Some(key) = state.pending_index.remove(id) {
                state.pending.remove(&key);
                count += 1;
            }
        }
        count
    }

    /// Rows excluded from delivery after exhausting their retries. Kept
    /// for inspection by external tooling.
    pub fn poisoned_rows(&self) -> Vec<MessageRow> {
        self.state.lock().poisoned.values().cloned().collect()
    }

    /// Number of rows awaiting delivery.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// One pump iteration: drop dead subscribers, expire leases, deliver
    /// due rows. Called on a timer by the engine; tests call it directly
    /// with a synthetic clock.
    pub fn process(&self, now: Timestamp) {
        let mut state = self.state.lock();
        self.drop_closed_subscribers(&mut state, now);
        self.expire_leases(&mut state, now);
        self.deliver_due(&mut state, now);
    }

    fn drop_closed_subscribers(&self, state: &mut ManagerState, now: Timestamp) {
        let closed: Vec<Uuid> = state
            .subscribers
            .iter()
            .filter(|s| s.sender.is_closed())
            .map(|s| s.id)
            .collect();
        if closed.is_empty() {
            return;
        }

        state.subscribers.retain(|s| !closed.contains(&s.id));
        state.rr_cursor = 0;

        // Leases held by a disconnected subscriber are released right
        // away rather than waiting out the ack window.
        let released: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, f)| closed.contains(&f.subscriber))
            .map(|(id, _)| id.clone())
            .collect();
        for id in released {
            if let Some(in_flight) = state.in_flight.remove(&id) {
                tracing::debug!(table = %self.table, id = %id, "releasing lease of disconnected subscriber");
                self.requeue(state, in_flight.row, now);
            }
        }
    }

    fn expire_leases(&self, state: &mut ManagerState, now: Timestamp) {
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, f)| now >= f.lease_deadline)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(in_flight) = state.in_flight.remove(&id) {
                tracing::debug!(table = %self.table, id = %id, "lease expired");
                self.requeue(state, in_flight.row, now);
            }
        }
    }

    /// Put a row back in the pending set, or poison it once its retries
    /// are exhausted.
    fn requeue(&self, state: &mut ManagerState, mut row: MessageRow, now: Timestamp) {
        if row.delivery_count >= self.config.max_delivery_count {
            tracing::warn!(table = %self.table, id = %row.id, deliveries = row.delivery_count, "poisoning message");
            state.poisoned.insert(row.id.clone(), row);
            return;
        }
        row.time_next = now;
        let key = DeliveryKey::for_row(&row);
        state.pending_index.insert(row.id.clone(), key.clone());
        state.pending.insert(key, row);
    }

    fn deliver_due(&self, state: &mut ManagerState, now: Timestamp) {
        if state.subscribers.is_empty() {
            return;
        }

        let due: Vec<DeliveryKey> = state
            .pending
            .iter()
            .filter(|(_, row)| row.time_next <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in due {
            let Some(row) = state.pending.get(&key).cloned() else {
                continue;
            };
            match self.offer(state, row, now) {
                Offer::Delivered => {
                    state.pending.remove(&key);
                    // pending_index entry was moved to in_flight by offer.
                }
                // Every subscriber is at capacity; the channel bound is the
                // backpressure, so stop until the next pump tick.
                Offer::AllBusy => break,
            }
        }
    }

    /// Try each subscriber round-robin until one accepts the row.
    fn offer(&self, state: &mut ManagerState, mut row: MessageRow, now: Timestamp) -> Offer {
        let count = state.subscribers.len();
        for attempt in 0..count {
            let index = (state.rr_cursor + attempt) % count;
            let handle = &state.subscribers[index];
            row.delivery_count += 1;
            match handle.sender.try_send(row.clone()) {
                Ok(()) => {
                    let subscriber = handle.id;
                    state.rr_cursor = (index + 1) % count;
                    state.pending_index.remove(&row.id);
                    state.in_flight.insert(
                        row.id.clone(),
                        InFlight {
                            subscriber,
                            lease_deadline: now.saturating_add(self.config.ack_wait),
                            row,
                        },
                    );
                    return Offer::Delivered;
                }
                Err(TrySendError::Full) | Err(TrySendError::Closed) => {
                    // Closed subscribers are reaped at the top of the next
                    // pump pass; treat both as "not this one".
                    row.delivery_count -= 1;
                }
            }
        }
        Offer::AllBusy
    }
}

enum Offer {
    Delivered,
    AllBusy,
}
