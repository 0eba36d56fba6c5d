//! Cooperative job scheduler.
//!
//! Three timer-driven jobs share the runtime: the orchestrator tick, the
//! archival pass, and the embedding backfill. Each job runs in its own
//! task whose loop awaits the previous run before the next fires, so a
//! job never overlaps itself. Shutdown is cooperative: a watch signal
//! lets the current run finish, then the tasks are awaited.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::orchestrator::Orchestrator;

const ARCHIVAL_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);
const BACKFILL_LIMIT: i64 = 50;
const TEST_MODE_INTERVAL: Duration = Duration::from_secs(5);
const EVENT_LOG_RETENTION_DAYS: i64 = 30;

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    fetch_interval: Duration,
}

impl Scheduler {
    /// `fetch_interval_minutes` comes from config; test mode shrinks it to
    /// five seconds.
    pub fn new(orchestrator: Arc<Orchestrator>, fetch_interval_minutes: u64, test_mode: bool) -> Self {
        let fetch_interval = if test_mode {
            TEST_MODE_INTERVAL
        } else {
            Duration::from_secs(fetch_interval_minutes * 60)
        };
        Self {
            orchestrator,
            fetch_interval,
        }
    }

    /// Spawn the job tasks. They stop after `shutdown` flips to true; the
    /// returned handles complete once in-flight runs have finished.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            fetch_interval_secs = self.fetch_interval.as_secs(),
            "scheduler starting"
        );

        let tick = {
            let orchestrator = self.orchestrator.clone();
            let mut shutdown = shutdown.clone();
            let period = self.fetch_interval;
            tokio::spawn(async move {
                // Immediate tick on startup, then the steady interval.
                orchestrator.run_once(false).await;
                let _ = orchestrator.backfill_embeddings(BACKFILL_LIMIT).await;

                let mut timer = interval(period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                timer.reset();
                loop {
                    tokio::select! {
                        _ = timer.tick() => {
                            orchestrator.run_once(false).await;
                            let _ = orchestrator.backfill_embeddings(BACKFILL_LIMIT).await;
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                info!("fetch job stopped");
            })
        };

        let archival = {
            let orchestrator = self.orchestrator.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut timer = interval(ARCHIVAL_INTERVAL);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the interval's immediate first tick; archival waits
                // a full period after startup.
                timer.tick().await;
                loop {
                    tokio::select! {
                        _ = timer.tick() => {
                            orchestrator.run_archival().await;
                            prismis_observability::cleanup_old_files(EVENT_LOG_RETENTION_DAYS);
                        }
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                info!("archival job stopped");
            })
        };

        vec![tick, archival]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use prismis_config::Config;
    use prismis_llm::{ContentEvaluation, ContentSummary, LocalHashEmbedder, SummarizeRequest};
    use prismis_storage::Storage;

    use crate::notifier::Notifier;
    use crate::orchestrator::Analyzer;

    struct NoopAnalyzer;

    #[async_trait]
    impl Analyzer for NoopAnalyzer {
        async fn summarize(
            &self,
            _request: &SummarizeRequest,
        ) -> prismis_core::Result<Option<ContentSummary>> {
            Ok(None)
        }
        async fn evaluate(
            &self,
            _content: &str,
            _title: &str,
            _url: &str,
            _context: &str,
            _learned_preferences: Option<&str>,
        ) -> prismis_core::Result<ContentEvaluation> {
            Ok(ContentEvaluation::default())
        }
    }

    #[tokio::test]
    async fn startup_tick_runs_and_shutdown_joins_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open(dir.path().join("test.db")).await.unwrap());

        let mut config = Config::default();
        config.api.key = "k".into();

        let orchestrator = Arc::new(Orchestrator::new(
            storage,
            HashMap::new(),
            Arc::new(NoopAnalyzer),
            Arc::new(LocalHashEmbedder::new()),
            Notifier::new(true, "definitely-not-a-real-notifier"),
            Arc::new(config),
        ));

        let scheduler = Scheduler::new(orchestrator, 30, true);
        let (tx, rx) = watch::channel(false);
        let handles = scheduler.start(rx);

        // Give the immediate tick a moment, then stop.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
