//! Table registry and delivery pumps
//!
//! The engine owns one `MessageManager` per message table, created on
//! first use, plus the background pump task that drives each manager's
//! delivery and lease bookkeeping.

use crate::config::MessengerConfig;
use crate::manager::MessageManager;
use dashmap::DashMap;
use std::sync::Arc;
use tablet_common::{Error, MessageRow, Result, Timestamp};
use tablet_stream::Subscription;
use tokio::sync::watch;

/// The tablet's message-queue engine.
pub struct MessengerEngine {
    config: MessengerConfig,
    managers: DashMap<String, Arc<MessageManager>>,
    shutdown: watch::Sender<bool>,
}

impl MessengerEngine {
    pub fn new(config: MessengerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            managers: DashMap::new(),
            shutdown,
        }
    }

    /// The manager for `table`, creating it (and its pump) on first use.
    /// Must be called from within a tokio runtime.
    pub fn manager(&self, table: &str) -> Arc<MessageManager> {
        self.managers
            .entry(table.to_string())
            .or_insert_with(|| {
                let manager = Arc::new(MessageManager::new(table, self.config.clone()));
                tracing::info!(table, "opening message table");
                spawn_pump(
                    Arc::clone(&manager),
                    self.config.clone(),
                    self.shutdown.subscribe(),
                );
                manager
            })
            .clone()
    }

    /// Subscribe to a table's pending rows.
    pub fn subscribe(&self, table: &str) -> Subscription<MessageRow> {
        self.manager(table).subscribe()
    }

    /// Hand application-written rows to the queue.
    pub fn submit(&self, table: &str, rows: Vec<MessageRow>) {
        self.manager(table).submit(rows);
    }

    /// Ack rows on a table. Unknown tables are an error; unknown ids on a
    /// known table are silently skipped by the manager.
    pub fn ack(&self, table: &str, ids: &[String]) -> Result<u64> {
        let manager = self
            .managers
            .get(table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(format!("message table {} not found", table)))?;
        Ok(manager.ack(ids))
    }

    /// Poisoned rows of a table, for external tooling.
    pub fn poisoned_rows(&self, table: &str) -> Result<Vec<MessageRow>> {
        let manager = self
            .managers
            .get(table)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::NotFound(format!("message table {} not found", table)))?;
        Ok(manager.poisoned_rows())
    }

    /// Stop every pump. Subscribers see a clean end of stream once their
    /// managers stop feeding them.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn spawn_pump(
    manager: Arc<MessageManager>,
    config: MessengerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => manager.process(Timestamp::now()),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::debug!(table = %manager.table(), "message pump stopped");
                        return;
                    }
                }
            }
        }
    });
}
