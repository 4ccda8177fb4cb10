//! In-memory replicated store.
//!
//! A single-process stand-in for the replicated store, for tests, demos and
//! local development. Values merge last-write-wins per path and every write
//! fans out to all subscribers of that path, the writer's own subscription
//! included.
//!
//! # Thread Safety
//!
//! Internal maps sit behind `RwLock`/`Mutex`. A poisoned lock is recovered
//! rather than propagated since the guarded maps stay consistent between
//! statements.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::traits::{ReplicatedStore, StoreAck, StoreFeed};
use crate::Result;

/// In-memory implementation of [`ReplicatedStore`].
#[derive(Default)]
pub struct MemoryReplicatedStore {
    values: RwLock<HashMap<String, serde_json::Value>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<serde_json::Value>>>>,
    write_failure: RwLock<Option<String>>,
}

impl MemoryReplicatedStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with `reason`.
    pub fn fail_writes(&self, reason: impl Into<String>) {
        let mut failure = self.write_failure.write().unwrap_or_else(|e| e.into_inner());
        *failure = Some(reason.into());
    }

    /// Accept writes again after [`fail_writes`](Self::fail_writes).
    pub fn restore_writes(&self) {
        let mut failure = self.write_failure.write().unwrap_or_else(|e| e.into_inner());
        *failure = None;
    }

    /// Write `value` as a foreign replica would, bypassing write failures.
    pub fn inject(&self, path: &str, value: serde_json::Value) {
        self.store_and_fan_out(path, value);
    }

    /// Deliver the current value at `path` to its subscribers again,
    /// simulating a retransmission.
    ///
    /// Returns false if nothing is stored at `path`.
    pub fn redeliver(&self, path: &str) -> bool {
        let value = {
            let values = self.values.read().unwrap_or_else(|e| e.into_inner());
            values.get(path).cloned()
        };
        match value {
            Some(value) => {
                self.fan_out(path, &value);
                true
            }
            None => false,
        }
    }

    /// Number of live subscriptions on `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        match subscribers.get_mut(path) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    fn store_and_fan_out(&self, path: &str, value: serde_json::Value) {
        {
            let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
            values.insert(path.to_string(), value.clone());
        }
        self.fan_out(path, &value);
    }

    fn fan_out(&self, path: &str, value: &serde_json::Value) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(senders) = subscribers.get_mut(path) {
            // Dropped receivers end their subscription
            senders.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl ReplicatedStore for MemoryReplicatedStore {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, value)))]
    async fn put(&self, path: &str, value: serde_json::Value) -> StoreAck {
        let failure = {
            let failure = self.write_failure.read().unwrap_or_else(|e| e.into_inner());
            failure.clone()
        };
        if let Some(reason) = failure {
            return StoreAck::Err(reason);
        }

        self.store_and_fan_out(path, value);
        StoreAck::Ok
    }

    async fn get(&self, path: &str) -> Result<Option<serde_json::Value>> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(path).cloned())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn subscribe(&self, path: &str) -> Result<StoreFeed> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_last_write_wins() {
        let store = MemoryReplicatedStore::new();
        assert_eq!(store.get("channels/a").await.unwrap(), None);

        assert!(store.put("channels/a", json!({"n": 2})).await.is_ok());
        assert!(store.put("channels/a", json!({"n": 1})).await.is_ok());

        // Later write wins regardless of content
        assert_eq!(
            store.get("channels/a").await.unwrap(),
            Some(json!({"n": 1}))
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_own_writes() {
        let store = MemoryReplicatedStore::new();
        let mut feed = store.subscribe("channels/a").await.unwrap();
        let mut other = store.subscribe("channels/b").await.unwrap();

        store.put("channels/a", json!(1)).await;
        assert_eq!(feed.recv().await, Some(json!(1)));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_redeliver_duplicates_value() {
        let store = MemoryReplicatedStore::new();
        let mut feed = store.subscribe("p").await.unwrap();

        assert!(!store.redeliver("p"));
        store.put("p", json!("v")).await;
        assert!(store.redeliver("p"));

        assert_eq!(feed.recv().await, Some(json!("v")));
        assert_eq!(feed.recv().await, Some(json!("v")));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryReplicatedStore::new();
        store.fail_writes("disk full");

        let ack = store.put("p", json!(1)).await;
        assert_eq!(ack, StoreAck::Err("disk full".into()));
        assert_eq!(store.get("p").await.unwrap(), None);

        // Foreign replicas are unaffected
        store.inject("p", json!(2));
        assert_eq!(store.get("p").await.unwrap(), Some(json!(2)));

        store.restore_writes();
        assert!(store.put("p", json!(3)).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_feed_unsubscribes() {
        let store = MemoryReplicatedStore::new();
        let feed = store.subscribe("p").await.unwrap();
        assert_eq!(store.subscriber_count("p"), 1);

        drop(feed);
        assert_eq!(store.subscriber_count("p"), 0);
    }

    #[test]
    fn test_store_ack_into_result() {
        assert!(StoreAck::Ok.into_result().is_ok());
        let err = StoreAck::Err("timeout".into()).into_result().unwrap_err();
        assert_eq!(err, crate::ChannelError::Store("timeout".into()));
    }
}
