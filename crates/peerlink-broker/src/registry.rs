//! Topic registry.
//!
//! Maps each topic to the connections subscribed to it, and each
//! connection to its topics. Both directions live under one lock so a
//! fanout never observes a half-removed connection. A topic whose last
//! subscriber leaves is removed on the spot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::{Connection, ConnectionId};

type Subscribers = HashMap<ConnectionId, Arc<Connection>>;

#[derive(Debug, Default)]
struct RegistryState {
    topics: HashMap<String, Subscribers>,
    memberships: HashMap<ConnectionId, BTreeSet<String>>,
}

impl RegistryState {
    fn detach(&mut self, id: &str, topic: &str) {
        if let Some(subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(id);
            if subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}

/// In-memory topic registry, shared by reference with a broker.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    state: RwLock<RegistryState>,
}

impl TopicRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the registry knows this connection.
    pub fn is_registered(&self, id: &str) -> bool {
        self.state.read().memberships.contains_key(id)
    }

    /// Record a connection with no subscriptions. No-op if already known.
    pub fn register(&self, connection: &Arc<Connection>) {
        self.state
            .write()
            .memberships
            .entry(connection.id.clone())
            .or_default();
    }

    /// Subscribe a connection to `topics`, returning its full topic set.
    pub fn subscribe<'a, I>(&self, connection: &Arc<Connection>, topics: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut state = self.state.write();
        let mut added = Vec::new();
        {
            let held = state
                .memberships
                .entry(connection.id.clone())
                .or_default();
            for topic in topics {
                if held.insert(topic.clone()) {
                    added.push(topic.clone());
                }
            }
        }
        for topic in added {
            state
                .topics
                .entry(topic)
                .or_default()
                .insert(connection.id.clone(), connection.clone());
        }
        state
            .memberships
            .get(&connection.id)
            .cloned()
            .unwrap_or_default()
    }

    /// Unsubscribe a connection from `topics`, returning what it still holds.
    pub fn unsubscribe<'a, I>(&self, id: &str, topics: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut state = self.state.write();
        let mut removed = Vec::new();
        if let Some(held) = state.memberships.get_mut(id) {
            for topic in topics {
                if held.remove(topic) {
                    removed.push(topic.as_str());
                }
            }
        }
        for topic in removed {
            state.detach(id, topic);
        }
        state.memberships.get(id).cloned().unwrap_or_default()
    }

    /// Forget a connection and every subscription it holds.
    ///
    /// Returns the topics it held, or `None` if it was not registered.
    pub fn remove(&self, id: &str) -> Option<BTreeSet<String>> {
        let mut state = self.state.write();
        let held = state.memberships.remove(id)?;
        for topic in &held {
            state.detach(id, topic);
        }
        Some(held)
    }

    /// Run `f` over a topic's subscribers while holding the read lock.
    ///
    /// Returns `None` if the topic has no subscribers.
    pub fn with_subscribers<R>(
        &self,
        topic: &str,
        f: impl FnOnce(&HashMap<ConnectionId, Arc<Connection>>) -> R,
    ) -> Option<R> {
        let state = self.state.read();
        state.topics.get(topic).map(f)
    }

    /// Topics a connection holds.
    pub fn topics_of(&self, id: &str) -> BTreeSet<String> {
        self.state
            .read()
            .memberships
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state.read().topics.get(topic).map_or(0, HashMap::len)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.state.read().topics.len()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.state.read().memberships.len()
    }

    /// Subscriber entries summed over all topics.
    pub fn subscription_count(&self) -> usize {
        self.state.read().topics.values().map(HashMap::len).sum()
    }

    /// Topic names in sorted order.
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted copy of the topic to connection mapping.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<ConnectionId>> {
        self.state
            .read()
            .topics
            .iter()
            .map(|(topic, subs)| (topic.clone(), subs.keys().cloned().collect()))
            .collect()
    }

    /// Drop all state.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.topics.clear();
        state.memberships.clear();
    }
}
