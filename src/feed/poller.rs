//! Periodic session list refresh.
//!
//! Fetch failures are logged and skipped; the previous snapshot stays
//! published until the next successful tick replaces it.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SessionFeed;
use crate::api::ApiClient;

/// Spawn the feed refresh task.
///
/// The first fetch happens immediately, then once per `interval`. The
/// returned receiver holds `None` until the first successful fetch.
#[must_use]
pub fn spawn_feed_task(
    client: ApiClient,
    interval: Duration,
    cancel: CancellationToken,
) -> (watch::Receiver<Option<SessionFeed>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("feed task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match client.list_sessions().await {
                        Ok(sessions) => {
                            let feed = SessionFeed::partition(sessions, Utc::now());
                            debug!(
                                active = feed.active.len(),
                                upcoming = feed.upcoming.len(),
                                past = feed.past.len(),
                                "feed refreshed"
                            );
                            if tx.send(Some(feed)).is_err() {
                                info!("feed receivers dropped; stopping");
                                break;
                            }
                        }
                        Err(err) => warn!(%err, "feed refresh failed; retrying next tick"),
                    }
                }
            }
        }
    });
    (rx, handle)
}
