//! Types exchanged with the query host.
//!
//! These mirror the plugin contract: the host passes [`SourceOptions`] and
//! [`QueryOptions`] on every call and expects a [`QueryResult`] or
//! [`ConnectionTestResult`] back. Field names follow the host's JSON.

use serde::{Deserialize, Serialize};

/// Data source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// WebSocket URL of the tag server, including any credentials.
    pub url: String,
}

/// Operation selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read cached values.
    GetValue,
    /// Write one tag value.
    SetValue,
    /// Subscribe to server pushes.
    Sub,
}

/// Declared type of a value being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Coerce to a number.
    Number,
    /// Coerce to a boolean.
    Boolean,
    /// Leave as text.
    String,
    /// Unrecognised type names leave the value untouched.
    #[serde(other)]
    Other,
}

/// Per-query options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Which operation to run.
    pub operation: Operation,
    /// Comma-separated tag ids for `sub` and `get_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<String>,
    /// Tag id for `set_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<String>,
    /// Raw value for `set_value`: a string, number or boolean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_value: Option<serde_json::Value>,
    /// Declared type of `tag_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
}

impl QueryOptions {
    /// Options for an operation with every other field unset.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            tag_ids: None,
            tag_id: None,
            tag_value: None,
            value_type: None,
        }
    }

    /// `tag_ids` split on commas, trimmed, empties dropped.
    pub fn tag_id_list(&self) -> Vec<String> {
        split_tag_ids(self.tag_ids.as_deref())
    }
}

/// Split a comma-separated tag id list.
pub fn split_tag_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Outcome of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// The call succeeded.
    Ok,
    /// The call failed; see the message.
    Failed,
}

/// Result of [`crate::QueryService::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Outcome.
    pub status: QueryStatus,
    /// Operation-specific payload.
    pub data: serde_json::Value,
    /// Why the call failed.
    #[serde(
        rename = "errorMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub error_message: Option<String>,
}

impl QueryResult {
    /// Successful result carrying `data`.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: QueryStatus::Ok,
            data,
            error_message: None,
        }
    }

    /// Failed result with an empty data array.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: QueryStatus::Failed,
            data: serde_json::Value::Array(Vec::new()),
            error_message: Some(message.into()),
        }
    }

    /// Whether the call succeeded.
    pub fn is_ok(&self) -> bool {
        self.status == QueryStatus::Ok
    }
}

/// Result of [`crate::QueryService::test_connection`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTestResult {
    /// Outcome.
    pub status: QueryStatus,
    /// Human-readable summary.
    pub message: String,
}
