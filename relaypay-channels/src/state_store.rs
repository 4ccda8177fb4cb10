//! Channel-scoped access to the replicated store.
//!
//! [`ChannelStateStore`] maps a [`ChannelId`] to the store path
//! `{namespace}/{channel_id}` and converts between [`StatePackage`] and the
//! store's JSON values. It holds no protocol logic: nonce ordering and
//! signature checks belong to the controller.
//!
//! # Consistency
//!
//! The store merges concurrent writes last-write-wins at the leaf, without
//! looking at the nonce. A successful [`put`](ChannelStateStore::put) only
//! means this replica accepted the value. The store is a transport and cache
//! for channel state; the settlement contract's own nonce check is the
//! authority when parties disagree.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use relaypay_lib::{ChannelId, ReplicatedStore, Result, StatePackage};
use tokio::task::JoinHandle;

use crate::timeout::bounded;

/// Default root path segment for channel state.
pub const DEFAULT_NAMESPACE: &str = "channels";

/// A value observed on a channel's path.
#[derive(Clone, Debug, PartialEq)]
pub enum PackageEvent {
    /// A value that decoded as a state package. Its signature is unchecked.
    Package(StatePackage),
    /// A value that is not a state package.
    Malformed {
        /// Decoding error detail
        reason: String,
    },
}

/// Handle to a running subscription.
///
/// The subscription stops when [`unsubscribe`](Self::unsubscribe) is called
/// or the handle is dropped.
#[must_use = "dropping the handle cancels the subscription"]
#[derive(Debug)]
pub struct SubscriptionHandle {
    channel_id: ChannelId,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Channel this subscription watches.
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Whether the subscription is still delivering.
    ///
    /// Becomes false after the store closes the feed.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop delivering packages.
    pub fn unsubscribe(self) {
        // Drop aborts the task
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Facade over [`ReplicatedStore`] scoped to channel paths.
#[derive(Clone)]
pub struct ChannelStateStore {
    store: Arc<dyn ReplicatedStore>,
    namespace: String,
    timeout: Option<Duration>,
}

impl ChannelStateStore {
    /// Create a facade over `store` using the default namespace.
    pub fn new(store: Arc<dyn ReplicatedStore>) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: None,
        }
    }

    /// Use `namespace` instead of `channels` as the root path segment.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Bound `put`, `get` and subscription setup by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Store path for a channel.
    pub fn path(&self, channel_id: &ChannelId) -> String {
        format!("{}/{}", self.namespace, channel_id)
    }

    /// Write a package to the channel's path.
    ///
    /// Resolves once the store acknowledges.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Validation`](relaypay_lib::ChannelError::Validation) for an unusable channel id
    /// - [`ChannelError::Store`](relaypay_lib::ChannelError::Store) with the store's detail if the write is rejected
    /// - [`ChannelError::Timeout`](relaypay_lib::ChannelError::Timeout) if a timeout is set and elapses
    pub async fn put(&self, channel_id: &ChannelId, package: &StatePackage) -> Result<()> {
        channel_id.validate()?;
        let path = self.path(channel_id);
        let value = package.to_value()?;

        bounded("store put", self.timeout, async {
            self.store.put(&path, value).await.into_result()
        })
        .await
    }

    /// One-shot read of the channel's current package.
    ///
    /// # Errors
    ///
    /// Returns a store error on read failure and a serialization error if
    /// the stored value is not a package.
    pub async fn get(&self, channel_id: &ChannelId) -> Result<Option<StatePackage>> {
        channel_id.validate()?;
        let path = self.path(channel_id);

        let value = bounded("store get", self.timeout, self.store.get(&path)).await?;
        value.map(StatePackage::from_value).transpose()
    }

    /// Call `on_package` for every value written to the channel's path.
    ///
    /// Packages are delivered one at a time: the next is not decoded until
    /// the previous callback future completes. Delivery is at-least-once and
    /// unordered, and includes this party's own writes.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the subscription.
    pub async fn subscribe<F, Fut>(
        &self,
        channel_id: &ChannelId,
        mut on_package: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(PackageEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        channel_id.validate()?;
        let path = self.path(channel_id);
        let mut feed = bounded("store subscribe", self.timeout, self.store.subscribe(&path)).await?;

        let task = tokio::spawn(async move {
            while let Some(value) = feed.recv().await {
                let event = match StatePackage::from_value(value) {
                    Ok(package) => PackageEvent::Package(package),
                    Err(e) => PackageEvent::Malformed {
                        reason: e.to_string(),
                    },
                };
                on_package(event).await;
            }
        });

        Ok(SubscriptionHandle {
            channel_id: channel_id.clone(),
            task,
        })
    }
}

impl std::fmt::Debug for ChannelStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStateStore")
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
