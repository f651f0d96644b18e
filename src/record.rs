//! Normalized records.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::decode::{Fields, Value};

pub const TOPIC_KEY: &str = "topic";
pub const TYPE_KEY: &str = "type";
pub const TIME_KEY: &str = "time_ns";

/// Keys owned by record metadata. Decoded fields never override them.
pub const RESERVED_KEYS: [&str; 3] = [TOPIC_KEY, TYPE_KEY, TIME_KEY];

/// One decoded message merged with its metadata.
///
/// Serializes as a flat mapping: `topic`, `type`, `time_ns`, then the
/// decoded fields in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    topic: String,
    type_name: String,
    time_ns: i64,
    fields: Fields,
}

impl Record {
    /// Merge decoded `fields` with metadata. A decoded field whose name is
    /// a reserved key is dropped.
    pub fn new(topic: impl Into<String>, type_name: impl Into<String>, time_ns: i64, fields: Fields) -> Self {
        let topic = topic.into();
        let type_name = type_name.into();
        let mut kept = Fields::with_capacity(fields.len());
        for (name, value) in fields {
            if RESERVED_KEYS.contains(&name.as_str()) {
                log::warn!("{type_name} on {topic}: field {name:?} shadows record metadata, dropped");
                continue;
            }
            kept.insert(name, value);
        }
        Self {
            topic,
            type_name,
            time_ns,
            fields: kept,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn time_ns(&self) -> i64 {
        self.time_ns
    }

    /// Decoded fields only, without the metadata keys.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// Look up a key of the flat record, metadata keys included.
    pub fn get(&self, key: &str) -> Option<Value> {
        match key {
            TOPIC_KEY => Some(Value::from(self.topic.as_str())),
            TYPE_KEY => Some(Value::from(self.type_name.as_str())),
            TIME_KEY => Some(Value::from(self.time_ns)),
            _ => self.fields.get(key).cloned(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The flat mapping: metadata first, then decoded fields.
    pub fn to_map(&self) -> Fields {
        let mut map = Fields::with_capacity(self.fields.len() + RESERVED_KEYS.len());
        map.insert(TOPIC_KEY.to_string(), Value::from(self.topic.as_str()));
        map.insert(TYPE_KEY.to_string(), Value::from(self.type_name.as_str()));
        map.insert(TIME_KEY.to_string(), Value::from(self.time_ns));
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.clone());
        }
        map
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + RESERVED_KEYS.len()))?;
        map.serialize_entry(TOPIC_KEY, &self.topic)?;
        map.serialize_entry(TYPE_KEY, &self.type_name)?;
        map.serialize_entry(TIME_KEY, &self.time_ns)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
