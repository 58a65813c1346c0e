//! Registry of live push channels keyed by owner
//!
//! Lock order is map shard, then owner bucket. Membership changes take both;
//! delivery clones the bucket handle out of the map and then locks only the
//! bucket, so pushes to different owners never wait on each other.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::channel::PushChannel;
use crate::types::{OwnerId, PushEvent};

/// Handle identifying one registered channel instance
pub type ChannelId = u64;

#[derive(Default)]
struct Bucket {
    channels: Vec<(ChannelId, Arc<dyn PushChannel>)>,
}

impl Bucket {
    /// Deliver to every channel, dropping those that fail; returns deliveries
    fn deliver(&mut self, owner: OwnerId, event: &PushEvent) -> usize {
        let before = self.channels.len();
        self.channels.retain(|(id, channel)| match channel.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Dropping channel {} of owner {}: {}", id, owner, e);
                false
            }
        });
        let delivered = self.channels.len();
        if delivered < before {
            tracing::info!(
                "Pruned {} dead channel(s) for owner {}",
                before - delivered,
                owner
            );
        }
        delivered
    }
}

/// Process-wide registry of push channels, one bucket per owner
pub struct NotificationHub {
    buckets: DashMap<OwnerId, Arc<Mutex<Bucket>>>,
    next_id: AtomicU64,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            next_id: AtomicU64::new(1),
            keepalive: Mutex::new(None),
        }
    }

    /// Add a channel for `owner`; the same channel may be registered more than once
    pub fn register(&self, owner: OwnerId, channel: Arc<dyn PushChannel>) -> ChannelId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = self.buckets.entry(owner).or_default();
        entry.lock().channels.push((id, channel));
        drop(entry);

        tracing::info!(
            "Channel {} registered for owner {} (total connections: {})",
            id,
            owner,
            self.connection_count()
        );
        id
    }

    /// Remove one registered instance; returns whether it was present
    pub fn unregister(&self, owner: OwnerId, id: ChannelId) -> bool {
        let mut removed = false;
        self.buckets.remove_if(&owner, |_, bucket| {
            let mut bucket = bucket.lock();
            let before = bucket.channels.len();
            bucket.channels.retain(|(cid, _)| *cid != id);
            removed = bucket.channels.len() < before;
            bucket.channels.is_empty()
        });
        if removed {
            tracing::info!("Channel {} unregistered for owner {}", id, owner);
        }
        removed
    }

    /// Deliver `event` to every channel of `owner`.
    ///
    /// Channels whose send fails are removed. With no channels registered this
    /// does nothing; events are never buffered for later connections.
    pub fn push(&self, owner: OwnerId, event: &PushEvent) -> usize {
        let Some(bucket) = self.buckets.get(&owner).map(|b| Arc::clone(b.value())) else {
            return 0;
        };

        let (delivered, now_empty) = {
            let mut bucket = bucket.lock();
            let delivered = bucket.deliver(owner, event);
            (delivered, bucket.channels.is_empty())
        };

        if now_empty {
            self.buckets
                .remove_if(&owner, |_, bucket| bucket.lock().channels.is_empty());
        }
        delivered
    }

    /// Deliver `event` to every owner
    pub fn broadcast(&self, event: &PushEvent) -> usize {
        self.owners()
            .into_iter()
            .map(|owner| self.push(owner, event))
            .sum()
    }

    /// Owners with at least one channel
    pub fn owners(&self) -> Vec<OwnerId> {
        self.buckets.iter().map(|entry| *entry.key()).collect()
    }

    /// Channels registered for one owner
    pub fn channel_count(&self, owner: OwnerId) -> usize {
        self.buckets
            .get(&owner)
            .map(|bucket| bucket.lock().channels.len())
            .unwrap_or(0)
    }

    /// Channels registered across all owners
    pub fn connection_count(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| bucket.value().lock().channels.len())
            .sum()
    }

    /// Start pinging every channel on a fixed interval.
    ///
    /// The task holds a weak reference and ends once the hub is dropped or
    /// [`shutdown`](Self::shutdown) is called. Starting again replaces the
    /// previous task.
    pub fn start_keepalive(self: &Arc<Self>, interval: Duration) {
        let hub: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(hub) = hub.upgrade() else { break };
                let reached = hub.broadcast(&PushEvent::ping("keepalive"));
                tracing::debug!("Keepalive reached {} channel(s)", reached);
            }
        });

        if let Some(previous) = self.keepalive.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the keepalive task and drop every channel
    pub fn shutdown(&self) {
        if let Some(handle) = self.keepalive.lock().take() {
            handle.abort();
        }
        let count = self.connection_count();
        self.buckets.clear();
        tracing::info!("Notification hub shut down ({} channel(s) dropped)", count);
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NotificationHub {
    fn drop(&mut self) {
        if let Some(handle) = self.keepalive.get_mut().take() {
            handle.abort();
        }
    }
}
