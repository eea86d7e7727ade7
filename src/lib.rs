//! TagEngine connector - WebSocket bridge between a query host and a tag server.
//!
//! The connector keeps one persistent WebSocket session to the configured
//! tag server, caches every tag value the server pushes, and answers three
//! operations on behalf of the host: subscribe, read cached values, write a
//! value.
//!
//! # Architecture
//!
//! - **Session** - background task running the connect / heartbeat /
//!   reconnect state machine for one URL
//! - **TagCache** - last known value per tag, fed only by server pushes
//! - **TagEngine** - context object owning the cache and the current session
//! - **TagEngineService** - host adapter dispatching queries onto the engine
//! - **Probe** - one-shot connectivity check for configuration validation
//!
//! # Modules
//!
//! - [`session`] - Connection state machine
//! - [`cache`] - Tag value cache
//! - [`connector`] - Session ownership and outbound frames
//! - [`service`] - Query host contract
//! - [`protocol`] - Wire frames
//! - [`config`] - Timing and retry configuration

// Library modules
pub mod cache;
pub mod coerce;
pub mod commands;
pub mod config;
pub mod connector;
pub mod constants;
pub mod host;
pub mod probe;
pub mod protocol;
pub mod service;
pub mod session;
pub mod ws;

// Re-export commonly used types
pub use cache::TagCache;
pub use config::SessionConfig;
pub use connector::TagEngine;
pub use host::{
    ConnectionTestResult, Operation, QueryOptions, QueryResult, QueryStatus, SourceOptions,
    ValueType,
};
pub use protocol::{TagEntry, TagKey, TagValue};
pub use service::{QueryService, TagEngineService};
pub use session::SessionState;
