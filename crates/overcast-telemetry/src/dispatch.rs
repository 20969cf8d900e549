//! Subscription table: `channel:event` pairs to ordered callback lists.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Channel whose events are dispatched in-process and never sent upstream.
pub const LOCAL_CHANNEL: &str = "local";
/// Channel carrying the client's own link status.
pub const STATUS_CHANNEL: &str = "ws";
/// Event on [`STATUS_CHANNEL`] fired on every status transition.
pub const STATUS_EVENT: &str = "status";

/// Subscriber callback. Invoked with the event's `data` payload.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// One name or a list of names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Names(Vec<String>);

impl Names {
    /// Iterate the names in the order given.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether no names were given.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Self(vec![name.to_owned()])
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Self(vec![name])
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl From<Vec<&str>> for Names {
    fn from(names: Vec<&str>) -> Self {
        Self(names.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for Names {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|n| (*n).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|n| (*n).to_owned()).collect())
    }
}

/// Whether a pair on `channel` is registered with the telemetry source.
pub fn is_network_channel(channel: &str) -> bool {
    channel != LOCAL_CHANNEL && channel != STATUS_CHANNEL
}

type Pair = (String, String);

/// Callback lists keyed by `(channel, event)`, remembering first-subscription
/// order so registrations replay deterministically.
#[derive(Default)]
pub struct SubscriptionTable {
    callbacks: HashMap<Pair, Vec<Callback>>,
    order: Vec<Pair>,
}

impl SubscriptionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the pair's list. Returns `true` when the pair is new.
    pub fn add(&mut self, channel: &str, event: &str, callback: Callback) -> bool {
        let key = (channel.to_owned(), event.to_owned());
        if let Some(list) = self.callbacks.get_mut(&key) {
            list.push(callback);
            return false;
        }
        self.order.push(key.clone());
        let _ = self.callbacks.insert(key, vec![callback]);
        true
    }

    /// Snapshot of the pair's callbacks in subscription order.
    pub fn callbacks(&self, channel: &str, event: &str) -> Vec<Callback> {
        self.callbacks
            .get(&(channel.to_owned(), event.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    /// Pairs that are registered upstream, in first-subscription order.
    pub fn network_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter(|(channel, _)| is_network_channel(channel))
            .map(|(c, e)| (c.as_str(), e.as_str()))
    }

    /// Number of distinct pairs.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the table has no pairs.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
