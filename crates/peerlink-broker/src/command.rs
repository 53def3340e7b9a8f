//! Broker wire messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Commands that peers can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Join topics.
    Subscribe {
        /// Topics to join.
        #[serde(default)]
        topics: Vec<String>,
    },
    /// Leave topics.
    Unsubscribe {
        /// Topics to leave.
        #[serde(default)]
        topics: Vec<String>,
    },
    /// Relay a message to a topic's subscribers.
    Publish {
        /// Target topic.
        topic: String,
        /// Every other field, passed through untouched.
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    /// Liveness probe.
    Ping,
}

impl ClientCommand {
    /// Parse one inbound message. Unknown types and bad JSON yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Messages the broker originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Reply to a ping.
    Pong,
}

/// Build the object forwarded to subscribers of `topic`.
pub fn publish_envelope(topic: &str, mut fields: Map<String, Value>, clients: usize) -> Value {
    fields.insert("type".to_string(), Value::from("publish"));
    fields.insert("topic".to_string(), Value::from(topic));
    fields.insert("clients".to_string(), Value::from(clients));
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_subscribe() {
        let cmd = ClientCommand::parse(r#"{"type":"subscribe","topics":["a","b"]}"#).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Subscribe {
                topics: vec!["a".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_parse_subscribe_without_topics() {
        let cmd = ClientCommand::parse(r#"{"type":"subscribe"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::Subscribe { topics: vec![] });
    }

    #[test]
    fn test_parse_publish_keeps_extra_fields() {
        let cmd = ClientCommand::parse(
            r#"{"type":"publish","topic":"room","from":"peer-1","data":{"sdp":"v=0"}}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::Publish { topic, fields } => {
                assert_eq!(topic, "room");
                assert_eq!(fields.get("from"), Some(&json!("peer-1")));
                assert_eq!(fields.get("data"), Some(&json!({"sdp": "v=0"})));
                assert!(!fields.contains_key("type"));
                assert!(!fields.contains_key("topic"));
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(
            ClientCommand::parse(r#"{"type":"ping"}"#),
            Some(ClientCommand::Ping)
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(ClientCommand::parse(r#"{"type":"shout"}"#).is_none());
        assert!(ClientCommand::parse(r#"{"topics":["a"]}"#).is_none());
        assert!(ClientCommand::parse(r#"{"type":"publish"}"#).is_none());
        assert!(ClientCommand::parse("not json").is_none());
        assert!(ClientCommand::parse("").is_none());
    }

    #[test]
    fn test_pong_serialization() {
        let json = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_publish_envelope_overrides_clients() {
        let mut fields = Map::new();
        fields.insert("clients".to_string(), json!(99));
        fields.insert("from".to_string(), json!("p"));

        let value = publish_envelope("room", fields, 2);
        assert_eq!(
            value,
            json!({"type": "publish", "topic": "room", "clients": 2, "from": "p"})
        );
    }
}
