//! Cross-tab signal bus.
//!
//! A [`SignalHub`] stands for the browser: every [`SignalBus`] opened on the
//! same channel name is one tab. Publishing delivers the message synchronously
//! to the subscribers of every *other* handle on that channel, in publish
//! order per sender. Nothing is persisted or acknowledged; a lost message is
//! covered by the periodic refresh.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// Channel shared by every tab of the application.
pub const CHANNEL_NAME: &str = "devis-sync";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    QuoteCreated,
    QuoteUpdated,
    QuoteDeleted,
    ClientCreated,
    ClientUpdated,
    ClientDeleted,
    RefreshAll,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::QuoteCreated => "quote_created",
            SyncKind::QuoteUpdated => "quote_updated",
            SyncKind::QuoteDeleted => "quote_deleted",
            SyncKind::ClientCreated => "client_created",
            SyncKind::ClientUpdated => "client_updated",
            SyncKind::ClientDeleted => "client_deleted",
            SyncKind::RefreshAll => "refresh_all",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub kind: SyncKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SyncMessage {
    pub fn new(kind: SyncKind, id: Option<String>) -> Self {
        Self {
            kind,
            id,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Parse a wire message; anything malformed is dropped.
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(msg) => Some(msg),
            Err(err) => {
                debug!(%err, "ignoring malformed sync message");
                None
            }
        }
    }
}

type Callback = Arc<dyn Fn(&SyncMessage) + Send + Sync>;

struct Listener {
    id: u64,
    owner: Uuid,
    callback: Callback,
}

#[derive(Default)]
struct Channel {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Listener>>,
}

impl Channel {
    fn add(&self, owner: Uuid, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.listeners.lock() {
            guard.push(Listener { id, owner, callback });
        }
        id
    }

    fn remove(&self, id: u64) {
        if let Ok(mut guard) = self.listeners.lock() {
            guard.retain(|l| l.id != id);
        }
    }

    fn targets(&self, sender: Uuid) -> Vec<Callback> {
        match self.listeners.lock() {
            Ok(guard) => guard
                .iter()
                .filter(|l| l.owner != sender)
                .map(|l| l.callback.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Registry of named channels; one per browser profile.
#[derive(Clone, Default)]
pub struct SignalHub {
    channels: Arc<Mutex<HashMap<String, Arc<Channel>>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new handle on `name`, the equivalent of one tab joining the channel.
    pub fn open(&self, name: &str) -> SignalBus {
        let channel = match self.channels.lock() {
            Ok(mut guard) => Some(guard.entry(name.to_string()).or_default().clone()),
            Err(_) => {
                warn!(channel = name, "signal hub poisoned; cross-tab sync disabled");
                None
            }
        };
        SignalBus {
            channel,
            handle: Uuid::new_v4(),
        }
    }
}

/// One tab's handle on a cross-tab channel.
#[derive(Clone)]
pub struct SignalBus {
    channel: Option<Arc<Channel>>,
    handle: Uuid,
}

impl SignalBus {
    /// A bus without channel capability: publish and subscribe are no-ops.
    pub fn unavailable() -> Self {
        Self {
            channel: None,
            handle: Uuid::new_v4(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.channel.is_some()
    }

    /// Announce a confirmed mutation to the other tabs. Never fails.
    pub fn publish(&self, kind: SyncKind, id: Option<&str>) {
        let Some(channel) = &self.channel else {
            return;
        };
        let message = SyncMessage::new(kind, id.map(str::to_string));
        let targets = channel.targets(self.handle);
        debug!(kind = kind.as_str(), id = ?message.id, receivers = targets.len(), "publishing sync message");
        for callback in targets {
            callback(&message);
        }
    }

    /// Register `callback` for messages published by other handles.
    /// The returned guard deregisters on `unsubscribe` or drop.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncMessage) + Send + Sync + 'static,
    {
        match &self.channel {
            Some(channel) => {
                let id = channel.add(self.handle, Arc::new(callback));
                Subscription {
                    channel: Arc::downgrade(channel),
                    id: Some(id),
                }
            }
            None => Subscription::noop(),
        }
    }
}

pub struct Subscription {
    channel: Weak<Channel>,
    id: Option<u64>,
}

impl Subscription {
    fn noop() -> Self {
        Self {
            channel: Weak::new(),
            id: None,
        }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let (Some(id), Some(channel)) = (self.id.take(), self.channel.upgrade()) {
            channel.remove(id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
