//! TagEngine wire protocol.
//!
//! JSON text frames exchanged with the tag server:
//!
//! ```text
//! client → server   {"event":"sub","tagIds":["plant1/temp", ...]}
//! client → server   {"event":"set","tags":[{"key":"plant1/temp","value":72}]}
//! server → client   {"event":"tag-values","data":[{"path":"plant1","name":"temp","value":72}, ...]}
//! ```
//!
//! Heartbeats use transport-level ping/pong frames and never appear here.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::constants::TAG_KEY_SEPARATOR;

/// Structured tag identity.
///
/// Kept as a `(path, name)` pair internally; the `path/name` string only
/// exists at the wire boundary (see [`TagKey::wire_name`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagKey {
    /// Hierarchical location of the tag on the server.
    pub path: String,
    /// Tag name within `path`.
    pub name: String,
}

impl TagKey {
    /// Create a key from its parts.
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    /// Split a wire-form key at its last separator.
    ///
    /// Returns `None` when `wire` has no separator at all.
    pub fn parse(wire: &str) -> Option<Self> {
        wire.rsplit_once(TAG_KEY_SEPARATOR)
            .map(|(path, name)| Self::new(path, name))
    }

    /// The `path/name` form used on the wire and in read results.
    pub fn wire_name(&self) -> String {
        format!("{}{}{}", self.path, TAG_KEY_SEPARATOR, self.name)
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.path, TAG_KEY_SEPARATOR, self.name)
    }
}

/// Scalar value of a tag.
///
/// Whole numbers within the exact `f64` integer range serialize as JSON
/// integers (`72`, not `72.0`). Non-finite numbers serialize as `null`.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(untagged)]
pub enum TagValue {
    /// No value, or a value that was never received.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Text value.
    String(String),
}

impl TagValue {
    /// Name of the value's type as reported back to the host.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// Convert an arbitrary JSON value, rejecting objects and arrays.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::String(s)),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// Largest magnitude at which every whole `f64` is an exact integer.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_991.0;

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => {
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "whole and within the exact integer range"
                )]
                let whole = *n as i64;
                serializer.serialize_i64(whole)
            }
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::String(text) => serializer.serialize_str(text),
        }
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// One `(name, value)` pair returned by cache reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagEntry {
    /// Wire-form key (`path/name`).
    pub name: String,
    /// Last known value, `null` if never received.
    pub value: TagValue,
}

/// Single write inside a `set` frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagWrite {
    /// Tag id as understood by the server.
    pub key: String,
    /// Value to write.
    pub value: TagValue,
}

/// Frames sent from the connector to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// Ask the server to push values for these tags.
    Sub {
        /// Tag ids to subscribe to.
        #[serde(rename = "tagIds")]
        tag_ids: Vec<String>,
    },
    /// Write tag values.
    Set {
        /// Writes to apply.
        tags: Vec<TagWrite>,
    },
}

impl ClientFrame {
    /// Serialize to the JSON text carried by a WebSocket text frame.
    pub fn to_text(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A tag update inside a `tag-values` push.
#[derive(Debug, Clone, Deserialize)]
struct RawTagUpdate {
    path: String,
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Envelope of a server frame; only the event tag is required.
#[derive(Debug, Deserialize)]
struct RawServerFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Event name of a tag-value push.
const TAG_VALUES_EVENT: &str = "tag-values";

/// Frames received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Tag values pushed by the server, in payload order.
    TagValues(Vec<(TagKey, TagValue)>),
    /// Any event the connector does not act on.
    Other(String),
}

impl ServerFrame {
    /// Parse a text frame.
    ///
    /// Fails only when the frame is not JSON or lacks an `event` tag. Within
    /// a `tag-values` push, entries that are malformed or carry non-scalar
    /// values are skipped so one bad entry never discards its neighbours.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let raw: RawServerFrame = serde_json::from_str(text)?;
        if raw.event != TAG_VALUES_EVENT {
            return Ok(Self::Other(raw.event));
        }

        let serde_json::Value::Array(items) = raw.data else {
            anyhow::bail!("tag-values push without a data array");
        };

        let updates = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RawTagUpdate>(item) {
                Ok(update) => {
                    let key = TagKey::new(update.path, update.name);
                    match TagValue::from_json(update.value) {
                        Some(value) => Some((key, value)),
                        None => {
                            log::debug!("[Protocol] Skipping non-scalar value for {}", key);
                            None
                        }
                    }
                }
                Err(e) => {
                    log::debug!("[Protocol] Skipping malformed tag update: {}", e);
                    None
                }
            })
            .collect();

        Ok(Self::TagValues(updates))
    }
}
