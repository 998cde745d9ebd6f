//! Key-value entries as stored and served by the gateway

use serde::{Deserialize, Serialize};

/// One entry in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Response body for `GET /`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyList {
    pub keys: Vec<KeyValue>,
}

impl From<Vec<KeyValue>> for KeyList {
    fn from(keys: Vec<KeyValue>) -> Self {
        Self { keys }
    }
}
