//! The rendezvous broker.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::attachment::Attachment;
use crate::command::{publish_envelope, ClientCommand, ServerMessage};
use crate::connection::{create_connection, Connection, ConnectionReceiver};
use crate::error::BrokerError;
use crate::registry::TopicRegistry;
use crate::Result;

/// Relays messages between connections that share a topic.
///
/// The registry is injected so several brokers can be tested side by side
/// and so a host can swap in a fresh registry after suspension.
#[derive(Debug)]
pub struct Broker {
    registry: Arc<TopicRegistry>,
}

impl Broker {
    /// Create a broker over `registry`.
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }

    /// The registry backing this broker.
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    /// Open a new connection and return its outbound receiver.
    pub fn connect(&self) -> Result<(Arc<Connection>, ConnectionReceiver)> {
        let id = uuid::Uuid::new_v4().to_string();
        let (connection, receiver) = create_connection(id.clone());

        connection.serialize_attachment(&Attachment::new(id.clone(), BTreeSet::new()))?;
        self.registry.register(&connection);

        info!(connection_id = %id, "Connection opened");
        Ok((connection, receiver))
    }

    /// Join `topics`.
    pub fn subscribe(&self, connection: &Arc<Connection>, topics: &[String]) -> Result<()> {
        let held = self.registry.subscribe(connection, topics);
        connection.serialize_attachment(&Attachment::new(connection.id.clone(), held))?;
        debug!(connection_id = %connection.id, topics = ?topics, "Subscribed");
        Ok(())
    }

    /// Leave `topics`. Topics not held are ignored.
    pub fn unsubscribe(&self, connection: &Arc<Connection>, topics: &[String]) -> Result<()> {
        let held = self.registry.unsubscribe(&connection.id, topics);
        connection.serialize_attachment(&Attachment::new(connection.id.clone(), held))?;
        debug!(connection_id = %connection.id, topics = ?topics, "Unsubscribed");
        Ok(())
    }

    /// Forward `fields` to every subscriber of `topic`, sender included.
    ///
    /// Returns how many subscribers the message was queued for. A topic with
    /// no subscribers is a silent no-op.
    pub fn publish(&self, from: &Connection, topic: &str, fields: Map<String, Value>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        let fanned_out = self.registry.with_subscribers(topic, |subscribers| {
            let envelope = publish_envelope(topic, fields, subscribers.len());
            let message = envelope.to_string();
            for connection in subscribers.values() {
                if connection.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(connection.clone());
                }
            }
            subscribers.len()
        });

        match fanned_out {
            Some(subscribers) => {
                debug!(
                    connection_id = %from.id,
                    topic = %topic,
                    subscribers,
                    delivered,
                    "Published"
                );
            }
            None => debug!(connection_id = %from.id, topic = %topic, "Publish to empty topic"),
        }

        for connection in dead {
            warn!(connection_id = %connection.id, "Dropping unreachable subscriber");
            self.close(&connection);
        }

        delivered
    }

    /// Reply to a ping.
    pub fn ping(&self, connection: &Connection) -> Result<()> {
        let pong = serde_json::to_string(&ServerMessage::Pong)?;
        connection.send(pong)
    }

    /// Tear a connection down. Safe to call more than once.
    pub fn close(&self, connection: &Connection) {
        let held = self.registry.remove(&connection.id);
        connection.clear_attachment();
        if let Some(topics) = held {
            info!(
                connection_id = %connection.id,
                topics = topics.len(),
                "Connection closed"
            );
        }
    }

    /// Handle one inbound text message from `connection`.
    ///
    /// Membership is restored from the attachment first if the registry has
    /// lost track of this connection. Unparseable messages are dropped.
    pub fn handle_message(&self, connection: &Arc<Connection>, text: &str) {
        self.ensure_hydrated(connection);

        let Some(command) = ClientCommand::parse(text) else {
            debug!(connection_id = %connection.id, "Dropping unrecognized message");
            return;
        };

        let result = match command {
            ClientCommand::Subscribe { topics } => self.subscribe(connection, &topics),
            ClientCommand::Unsubscribe { topics } => self.unsubscribe(connection, &topics),
            ClientCommand::Publish { topic, fields } => {
                self.publish(connection, &topic, fields);
                Ok(())
            }
            ClientCommand::Ping => self.ping(connection),
        };

        if let Err(e) = result {
            warn!(connection_id = %connection.id, error = %e, "Command failed");
        }
    }

    /// Rebuild registry entries for connections that survived a suspension.
    pub fn resume<'a, I>(&self, connections: I) -> usize
    where
        I: IntoIterator<Item = &'a Arc<Connection>>,
    {
        connections
            .into_iter()
            .filter(|connection| self.ensure_hydrated(connection))
            .count()
    }

    /// Restore a connection's topics from its attachment if the registry
    /// does not know it. Returns true if the registry was updated.
    pub fn ensure_hydrated(&self, connection: &Arc<Connection>) -> bool {
        if self.registry.is_registered(&connection.id) {
            return false;
        }

        let topics = match stored_topics(connection) {
            Ok(topics) => topics,
            Err(e) => {
                warn!(
                    connection_id = %connection.id,
                    error = %e,
                    "Unusable attachment, starting empty"
                );
                BTreeSet::new()
            }
        };

        self.registry.register(connection);
        let held = self.registry.subscribe(connection, &topics);
        if let Err(e) =
            connection.serialize_attachment(&Attachment::new(connection.id.clone(), held))
        {
            warn!(connection_id = %connection.id, error = %e, "Failed to store attachment");
        }

        info!(
            connection_id = %connection.id,
            topics = topics.len(),
            "Connection rehydrated"
        );
        true
    }

    /// Current topic and subscriber counts.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            topics: self.registry.topic_count(),
            connections: self.registry.subscription_count(),
            topic_list: self.registry.topic_names(),
        }
    }
}

/// Topics recorded in a connection's own attachment.
fn stored_topics(connection: &Connection) -> Result<BTreeSet<String>> {
    match connection.deserialize_attachment()? {
        Some(attachment) if attachment.connection_id != connection.id => {
            Err(BrokerError::AttachmentMismatch {
                expected: connection.id.clone(),
                found: attachment.connection_id,
            })
        }
        Some(attachment) => Ok(attachment.topics),
        None => Ok(BTreeSet::new()),
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(Arc::new(TopicRegistry::new()))
    }
}

/// Broker statistics, as served by the stats probe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerStats {
    /// Topics with at least one subscriber.
    pub topics: usize,
    /// Subscriber entries summed over all topics.
    pub connections: usize,
    /// Topic names.
    pub topic_list: Vec<String>,
}
