//! Serialized per-connection state.
//!
//! The host keeps one attachment per socket across suspension. It is the
//! only record of a connection's topics that survives; the registry is
//! rebuilt from it on resume.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Plain value persisted alongside a suspended connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Connection the attachment belongs to.
    pub connection_id: String,
    /// Topics the connection is subscribed to.
    #[serde(default)]
    pub topics: BTreeSet<String>,
}

impl Attachment {
    /// Build an attachment for a connection.
    pub fn new(connection_id: impl Into<String>, topics: BTreeSet<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            topics,
        }
    }

    /// Serialize to the stored form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the stored form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
