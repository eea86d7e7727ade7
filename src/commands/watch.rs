//! `watch`: subscribe to tags and print the cache periodically.

use std::time::Duration;

use anyhow::Result;

use crate::host::{split_tag_ids, Operation, QueryOptions, SourceOptions};
use crate::service::{QueryService, TagEngineService};
use crate::session::SessionState;

/// Subscribe to `tags` and print their cached values every `interval` until
/// Ctrl-C.
///
/// The subscription is re-sent every time the session (re)opens, since the
/// server forgets subscriptions with the connection.
pub async fn execute(
    service: &TagEngineService,
    url: &str,
    tags: &str,
    interval: Duration,
) -> Result<()> {
    let source = SourceOptions {
        url: url.to_string(),
    };
    let mut subscribe = QueryOptions::new(Operation::Sub);
    subscribe.tag_ids = Some(tags.to_string());
    let mut read = QueryOptions::new(Operation::GetValue);
    read.tag_ids = Some(tags.to_string());

    log::info!(
        "[Watch] Watching {} tag(s) on {}",
        split_tag_ids(Some(tags)).len(),
        url
    );

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    let mut was_open = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = tokio::signal::ctrl_c() => {
                result?;
                log::info!("[Watch] Interrupted, shutting down");
                break;
            }
        }

        // `run` re-triggers the connection if the session gave up.
        let is_open = service.engine().state() == Some(SessionState::Open);
        if is_open && !was_open {
            service.run(&source, &subscribe).await;
        }
        was_open = is_open;

        let result = service.run(&source, &read).await;
        super::print_json(&result.data)?;
    }

    service.engine().shutdown();
    Ok(())
}
