//! Host-facing query service.
//!
//! [`QueryService`] is the seam the query host calls through. The
//! [`TagEngineService`] implementation dispatches each call onto a shared
//! [`TagEngine`]: reads come straight from the tag cache, subscribe and set
//! go out as frames on the session. Every path resolves to a result value;
//! nothing here returns an error to the host.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::coerce::coerce;
use crate::connector::TagEngine;
use crate::host::{
    ConnectionTestResult, Operation, QueryOptions, QueryResult, QueryStatus, SourceOptions,
};
use crate::probe::{probe, ProbeOutcome};

/// Entry points the query host invokes.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Run one operation against the source.
    async fn run(&self, source: &SourceOptions, query: &QueryOptions) -> QueryResult;

    /// Check that the source is reachable.
    async fn test_connection(&self, source: &SourceOptions) -> ConnectionTestResult;
}

/// [`QueryService`] backed by a [`TagEngine`].
#[derive(Debug, Clone)]
pub struct TagEngineService {
    engine: Arc<TagEngine>,
}

impl TagEngineService {
    /// Service over an existing engine.
    pub fn new(engine: Arc<TagEngine>) -> Self {
        Self { engine }
    }

    /// The engine calls are dispatched to.
    pub fn engine(&self) -> &Arc<TagEngine> {
        &self.engine
    }

    fn subscribe(&self, query: &QueryOptions) -> Result<serde_json::Value> {
        let tag_ids = query.tag_id_list();
        if !tag_ids.is_empty() {
            self.engine.subscribe(tag_ids)?;
        }
        Ok(json!({ "tagIds": query.tag_ids }))
    }

    fn get_value(&self, query: &QueryOptions) -> Result<serde_json::Value> {
        let entries = self.engine.cache().get_many(&query.tag_id_list());
        serde_json::to_value(entries).context("Failed to encode tag values")
    }

    fn set_value(&self, query: &QueryOptions) -> Result<serde_json::Value> {
        let tag_id = query
            .tag_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .context("tag_id is required for set_value")?;

        let value = coerce(query.tag_value.as_ref(), query.value_type)?;
        let value_type = value.type_name();
        self.engine.set_value(tag_id, value.clone())?;

        Ok(json!({
            "name": tag_id,
            "value": value,
            "value_type": value_type,
        }))
    }

    fn dispatch(&self, query: &QueryOptions) -> Result<serde_json::Value> {
        match query.operation {
            Operation::Sub => self.subscribe(query),
            Operation::GetValue => self.get_value(query),
            Operation::SetValue => self.set_value(query),
        }
    }
}

#[async_trait]
impl QueryService for TagEngineService {
    async fn run(&self, source: &SourceOptions, query: &QueryOptions) -> QueryResult {
        self.engine.ensure_connected(&source.url);

        match self.dispatch(query) {
            Ok(data) => QueryResult::ok(data),
            Err(e) => {
                log::warn!("[Dispatch] {:?} failed: {:#}", query.operation, e);
                QueryResult::failed(format!("{e:#}"))
            }
        }
    }

    async fn test_connection(&self, source: &SourceOptions) -> ConnectionTestResult {
        let outcome = probe(&source.url, self.engine.config().probe_timeout).await;
        let (status, message) = match outcome {
            ProbeOutcome::Connected => (QueryStatus::Ok, "Connection to TagEngine server successful"),
            ProbeOutcome::Closed(_) => (QueryStatus::Failed, "Connection to TagEngine server closed"),
            ProbeOutcome::Failed(_) => (QueryStatus::Failed, "Connection to TagEngine server failed"),
            ProbeOutcome::TimedOut => {
                (QueryStatus::Failed, "Connection to TagEngine server timed out")
            }
        };
        ConnectionTestResult {
            status,
            message: message.to_string(),
        }
    }
}
