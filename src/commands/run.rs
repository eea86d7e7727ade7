//! `run`: execute a single host query from the command line.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::host::{QueryOptions, SourceOptions};
use crate::service::{QueryService, TagEngineService};

/// Parse `query_json`, wait for the session, run the query, print the result.
///
/// The wait matters for a one-shot process: a host keeps its session alive
/// between calls, a CLI invocation starts from nothing. If the session does
/// not open in time the query still runs and reports what it can (a cache
/// read returns nulls, a write fails as not connected).
///
/// Returns whether the query succeeded.
pub async fn execute(
    service: &TagEngineService,
    url: &str,
    query_json: &str,
    connect_timeout: Duration,
    settle: Duration,
) -> Result<bool> {
    let query: QueryOptions =
        serde_json::from_str(query_json).context("query must be a QueryOptions JSON object")?;
    let source = SourceOptions {
        url: url.to_string(),
    };

    service.engine().ensure_connected(url);
    if !service.engine().wait_until_open(connect_timeout).await {
        log::warn!(
            "[Run] Session to {} not open after {}ms, running anyway",
            url,
            connect_timeout.as_millis()
        );
    }

    let result = service.run(&source, &query).await;
    super::print_json(&result)?;

    // Give fire-and-forget frames a moment to leave before the process exits.
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    service.engine().shutdown();

    Ok(result.is_ok())
}
