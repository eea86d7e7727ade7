//! CLI subcommand implementations.
//!
//! Each subcommand drives the library exactly the way a query host would:
//! through a [`crate::TagEngineService`] over a shared [`crate::TagEngine`].

pub mod run;
pub mod watch;

use anyhow::Result;

use crate::host::{ConnectionTestResult, QueryStatus, SourceOptions};
use crate::service::{QueryService, TagEngineService};

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `probe`: one-shot connection test.
///
/// Returns `true` when the server accepted the connection.
pub async fn probe(service: &TagEngineService, url: &str) -> Result<bool> {
    let source = SourceOptions {
        url: url.to_string(),
    };
    let result: ConnectionTestResult = service.test_connection(&source).await;
    print_json(&result)?;
    Ok(result.status == QueryStatus::Ok)
}
