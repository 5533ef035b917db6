//! Business events carried in queue message bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An event as published by the ingestion API.
///
/// Missing or `null` fields decode to empty values (empty string, Unix epoch,
/// empty map). A body that is not a JSON object of this shape fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Correlation id, used for logging only
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,

    /// Selects the routing rule
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub event_type: String,

    #[serde(default, deserialize_with = "nullable")]
    pub timestamp: DateTime<Utc>,

    /// Event fields referenced by body templates
    #[serde(default, deserialize_with = "nullable")]
    pub data: Map<String, Value>,
}

impl Event {
    /// Decode an event from a message body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Encode the event as a message body.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Whether the timestamp was set (not the Unix epoch).
    pub fn has_timestamp(&self) -> bool {
        self.timestamp != DateTime::<Utc>::UNIX_EPOCH
    }

    /// Fill a missing id with a UUID v4 and a missing timestamp with now.
    pub fn fill_defaults(&mut self) {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if !self.has_timestamp() {
            self.timestamp = Utc::now();
        }
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
