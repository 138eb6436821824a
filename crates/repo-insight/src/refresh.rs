/// Periodic re-index of the search-qualifier documentation.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::store::QualifierStore;

/// Spawn a task that calls `refresh_documents` every `interval`, starting one interval from
/// now. Failures are logged and the previous index stays active. Abort the handle to stop.
///
/// `interval` must be non-zero; [`crate::config::Config`] rejects a zero period.
pub fn spawn_refresh_scheduler(
    store: Arc<dyn QualifierStore>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; startup already built the index.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.refresh_documents().await {
                Ok(sections) => info!(sections, "qualifier documentation refreshed"),
                Err(e) => warn!(error = %e, "qualifier documentation refresh failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{qualifier_docs, KeywordEmbedder, StaticSource};
    use crate::store::InMemoryQualifierStore;

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_each_interval_until_aborted() {
        let source = Arc::new(StaticSource::new(qualifier_docs()));
        let store: Arc<dyn QualifierStore> = Arc::new(InMemoryQualifierStore::new(
            Arc::new(KeywordEmbedder),
            Arc::clone(&source) as Arc<dyn crate::store::SectionSource>,
        ));

        let handle = spawn_refresh_scheduler(store, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.load_count(), 0);

        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(source.load_count(), 2);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.load_count(), 2);
    }
}
