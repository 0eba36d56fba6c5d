//! The per-tick ingest-enrich-store pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use prismis_config::Config;
use prismis_core::{
    ContentItem, Error, Priority, Result, Source, SourceKind, TickStats,
};
use prismis_fetchers::ContentFetcher;
use prismis_llm::{
    ContentEvaluation, ContentSummary, EmbeddingProvider, Evaluator, SummarizeRequest, Summarizer,
    call_with_retry,
};
use prismis_storage::Storage;

use crate::notifier::Notifier;

/// File-source baselines beyond this size skip LLM analysis entirely;
/// diffs (which start with a `---` header) are always analyzed.
const BASELINE_ANALYSIS_LIMIT: usize = 50_000;

/// Minimum flagged votes (last 30 days) before learned preferences are
/// passed to the evaluator.
const FEEDBACK_VOTE_THRESHOLD: i64 = 5;
const FEEDBACK_WINDOW_DAYS: i64 = 30;

/// Summarize+evaluate seam. The production implementation wraps the LLM
/// coordinator; tests substitute canned analysis.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn summarize(&self, request: &SummarizeRequest) -> Result<Option<ContentSummary>>;

    async fn evaluate(
        &self,
        content: &str,
        title: &str,
        url: &str,
        context: &str,
        learned_preferences: Option<&str>,
    ) -> Result<ContentEvaluation>;
}

pub struct LlmAnalyzer {
    summarizer: Summarizer,
    evaluator: Evaluator,
}

impl LlmAnalyzer {
    pub fn new(summarizer: Summarizer, evaluator: Evaluator) -> Self {
        Self {
            summarizer,
            evaluator,
        }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn summarize(&self, request: &SummarizeRequest) -> Result<Option<ContentSummary>> {
        self.summarizer.summarize_with_analysis(request).await
    }

    async fn evaluate(
        &self,
        content: &str,
        title: &str,
        url: &str,
        context: &str,
        learned_preferences: Option<&str>,
    ) -> Result<ContentEvaluation> {
        self.evaluator
            .evaluate_content(content, title, url, context, learned_preferences)
            .await
    }
}

pub struct Orchestrator {
    storage: Arc<Storage>,
    fetchers: HashMap<SourceKind, Box<dyn ContentFetcher>>,
    analyzer: Arc<dyn Analyzer>,
    embedder: Arc<dyn EmbeddingProvider>,
    notifier: Notifier,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(
        storage: Arc<Storage>,
        fetchers: HashMap<SourceKind, Box<dyn ContentFetcher>>,
        analyzer: Arc<dyn Analyzer>,
        embedder: Arc<dyn EmbeddingProvider>,
        notifier: Notifier,
        config: Arc<Config>,
    ) -> Self {
        Self {
            storage,
            fetchers,
            analyzer,
            embedder,
            notifier,
            config,
        }
    }

    /// One tick: every active source, in id order. Per-item errors are
    /// recorded and skipped; a fetch failure aborts only its source.
    pub async fn run_once(&self, force_refetch: bool) -> TickStats {
        let started = Instant::now();
        let mut stats = TickStats::default();

        let learned_preferences = self.learned_preferences().await;

        let sources = match self.storage.get_active_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "cannot load active sources");
                stats.errors.push(format!("cannot load active sources: {e}"));
                return stats;
            }
        };

        prismis_observability::log(
            "daemon.cycle.start",
            json!({"sources": sources.len(), "force_refetch": force_refetch}),
        );

        if sources.is_empty() {
            info!("no active sources configured");
            return stats;
        }
        info!(count = sources.len(), "processing active sources");

        for source in &sources {
            match self
                .fetch_source_content(source, force_refetch, learned_preferences.as_deref())
                .await
            {
                Ok(source_stats) => {
                    stats.absorb(source_stats);
                    if let Err(e) = self
                        .storage
                        .update_source_fetch_status(&source.id, true, None)
                        .await
                    {
                        warn!(source = %source.label(), error = %e, "status update failed");
                    }
                }
                Err(e) => {
                    let message = format!("failed to process source {}: {e}", source.url);
                    warn!(%message);
                    stats.errors.push(message);
                    if let Err(status_err) = self
                        .storage
                        .update_source_fetch_status(&source.id, false, Some(&e.to_string()))
                        .await
                    {
                        warn!(source = %source.label(), error = %status_err, "status update failed");
                    }
                }
            }
        }

        if !stats.new_high_priority.is_empty() {
            info!(
                count = stats.new_high_priority.len(),
                "notifying about new high priority items"
            );
            self.notifier.notify_new_content(&stats.new_high_priority).await;
        }

        prismis_observability::log(
            "daemon.cycle.complete",
            json!({
                "duration_ms": started.elapsed().as_millis() as u64,
                "items_fetched": stats.items_fetched,
                "items_new": stats.items_new,
                "items_updated": stats.items_updated,
                "errors": stats.errors.len(),
            }),
        );
        info!(
            fetched = stats.items_fetched,
            analyzed = stats.items_processed,
            new = stats.items_new,
            updated = stats.items_updated,
            errors = stats.errors.len(),
            "cycle complete"
        );
        stats
    }

    /// Flagged-item digest, once the vote threshold is met. Never blocks
    /// the tick.
    async fn learned_preferences(&self) -> Option<String> {
        match self.storage.get_feedback_stats(FEEDBACK_WINDOW_DAYS).await {
            Ok(stats) if stats.total_votes >= FEEDBACK_VOTE_THRESHOLD => {
                info!(votes = stats.total_votes, "using learned preferences");
                stats.digest
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "feedback statistics unavailable");
                None
            }
        }
    }

    /// Fetch one source and run every new item through the enrich-store
    /// pipeline.
    async fn fetch_source_content(
        &self,
        source: &Source,
        force_refetch: bool,
        learned_preferences: Option<&str>,
    ) -> Result<TickStats> {
        let mut stats = TickStats::default();

        let fetcher = self
            .fetchers
            .get(&source.kind)
            .ok_or_else(|| Error::fetch(format!("no fetcher for kind {}", source.kind)))?;

        let all_items = fetcher.fetch(source).await?;
        stats.items_fetched = all_items.len();
        if all_items.is_empty() {
            info!(source = %source.label(), "no items found");
            return Ok(stats);
        }
        info!(source = %source.label(), count = all_items.len(), "fetched items");

        let items_to_process: Vec<ContentItem> = if force_refetch {
            all_items
        } else {
            let existing = self.storage.get_existing_external_ids(&source.id).await?;
            let fresh: Vec<ContentItem> = all_items
                .into_iter()
                .filter(|item| !existing.contains(&item.external_id))
                .collect();
            let skipped = stats.items_fetched - fresh.len();
            if skipped > 0 {
                info!(skipped, fresh = fresh.len(), "deduplicated fetch batch");
            }
            fresh
        };
        stats.items_processed = items_to_process.len();

        for item in items_to_process {
            if let Err(e) = self
                .process_item(source, item, learned_preferences, &mut stats)
                .await
            {
                let message = format!("failed to analyze item: {e}");
                warn!(source = %source.label(), %message);
                stats.errors.push(message);
            }
        }

        Ok(stats)
    }

    async fn process_item(
        &self,
        source: &Source,
        mut item: ContentItem,
        learned_preferences: Option<&str>,
        stats: &mut TickStats,
    ) -> Result<()> {
        // Large file baselines are stored raw; there is nothing for the
        // LLM to say about 50k+ bytes of first import, but search should
        // still find it.
        let is_diff = item.content.starts_with("---");
        if source.kind == SourceKind::File
            && item.content.len() > BASELINE_ANALYSIS_LIMIT
            && !is_diff
        {
            debug!(
                bytes = item.content.len(),
                "storing file baseline without LLM analysis"
            );
            item.priority = Some(Priority::High);
            let (content_id, is_new) = self.storage.create_or_update_content(&item).await?;
            self.embed_item(&content_id, &item.title, None, &item.content).await;
            if is_new {
                stats.items_new += 1;
            } else {
                stats.items_updated += 1;
            }
            return Ok(());
        }

        let metrics = item
            .analysis
            .as_ref()
            .and_then(|a| a.get("metrics"))
            .cloned();

        let request = SummarizeRequest {
            content: item.content.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            source_kind: Some(source.kind),
            source_name: source.label().to_string(),
            metrics,
        };

        let max_retries = self.config.daemon.llm_max_retries;
        let backoff = self.config.daemon.llm_retry_backoff_base;

        let Some(summary_result) =
            call_with_retry(max_retries, backoff, || self.analyzer.summarize(&request)).await?
        else {
            debug!(title = %item.title, "summarization yielded nothing, skipping item");
            return Ok(());
        };

        let evaluation = call_with_retry(max_retries, backoff, || {
            self.analyzer.evaluate(
                &item.content,
                &item.title,
                &item.url,
                &self.config.context,
                learned_preferences,
            )
        })
        .await?;

        let llm_analysis = json!({
            "reading_summary": summary_result.reading_summary,
            "alpha_insights": summary_result.alpha_insights,
            "patterns": summary_result.patterns,
            "entities": summary_result.entities,
            "quotes": summary_result.quotes,
            "tools": summary_result.tools,
            "urls": summary_result.urls,
            "matched_interests": evaluation.matched_interests,
            "priority_reasoning": evaluation.reasoning,
            "metadata": summary_result.metadata,
        });
        let merged = merge_analysis(item.analysis.as_ref(), llm_analysis);

        // File sources stay HIGH regardless of the evaluator's opinion:
        // the user subscribed to the file explicitly.
        let priority = if source.kind == SourceKind::File {
            item.priority.or(Some(Priority::High))
        } else {
            evaluation.priority
        };

        item.summary = Some(summary_result.summary.clone());
        item.analysis = Some(merged);
        item.priority = priority;

        let (content_id, is_new) = self.storage.create_or_update_content(&item).await?;

        self.embed_item(
            &content_id,
            &item.title,
            Some(&summary_result.summary),
            &item.content,
        )
        .await;

        if is_new {
            stats.items_new += 1;
            if priority == Some(Priority::High) {
                if let Ok(Some(record)) = self.storage.get_content_by_id(&content_id).await {
                    stats.new_high_priority.push(record);
                }
            }
        } else {
            stats.items_updated += 1;
        }

        debug!(
            title = %item.title,
            new = is_new,
            priority = ?priority,
            "item stored"
        );
        Ok(())
    }

    /// Generate and store an embedding from the summary (preferred) or the
    /// raw content. Failure logs and moves on: it never blocks the
    /// content write.
    async fn embed_item(
        &self,
        content_id: &str,
        title: &str,
        summary: Option<&str>,
        content: &str,
    ) {
        let text = summary.filter(|s| !s.is_empty()).unwrap_or(content);
        if text.is_empty() {
            return;
        }
        match self.embedder.embed_for_content(Some(title), text).await {
            Ok(embedding) => {
                if let Err(e) = self
                    .storage
                    .add_embedding(content_id, &embedding, self.embedder.model_name())
                    .await
                {
                    warn!(content_id, error = %e, "embedding store failed");
                }
            }
            Err(e) => warn!(content_id, error = %e, "embedding generation failed"),
        }
    }

    /// Archival job: apply the configured priority windows.
    pub async fn run_archival(&self) -> u64 {
        if !self.config.archival.enabled {
            return 0;
        }
        match self
            .storage
            .archive_old_content(&self.config.archival_windows())
            .await
        {
            Ok(count) => {
                if count > 0 {
                    info!(count, "auto-archival complete");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "archival failed");
                0
            }
        }
    }

    /// Embedding backfill: index items that missed their embedding (for
    /// example after a provider outage). Returns (processed, failed).
    pub async fn backfill_embeddings(&self, limit: i64) -> (usize, usize) {
        let batch = match self.storage.get_content_without_embeddings(limit).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "embedding backfill query failed");
                return (0, 0);
            }
        };
        if batch.is_empty() {
            return (0, 0);
        }

        let mut processed = 0;
        let mut failed = 0;
        for record in batch {
            let text = record
                .summary
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(&record.content);
            let text = if text.is_empty() { &record.title } else { text };

            match self.embedder.embed_for_content(Some(&record.title), text).await {
                Ok(embedding) => {
                    match self
                        .storage
                        .add_embedding(&record.id, &embedding, self.embedder.model_name())
                        .await
                    {
                        Ok(()) => processed += 1,
                        Err(e) => {
                            warn!(id = %record.id, error = %e, "backfill store failed");
                            failed += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "backfill embedding failed");
                    failed += 1;
                }
            }
        }

        if processed > 0 {
            info!(processed, failed, "embedding backfill complete");
        }
        (processed, failed)
    }
}

/// Overlay LLM fields onto the fetcher's analysis. Fetcher `metrics`
/// always survive; other fetcher keys are kept unless the LLM produced
/// the same key.
fn merge_analysis(existing: Option<&Value>, llm_analysis: Value) -> Value {
    let mut merged = match llm_analysis {
        Value::Object(map) => map,
        other => {
            // Non-object LLM payloads cannot be merged; keep the metrics.
            let mut map = Map::new();
            map.insert("llm".into(), other);
            map
        }
    };

    if let Some(Value::Object(existing)) = existing {
        if let Some(metrics) = existing.get("metrics") {
            merged.insert("metrics".into(), metrics.clone());
        }
        for (key, value) in existing {
            if key != "metrics" && !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use prismis_core::ContentItem;
    use prismis_llm::LocalHashEmbedder;

    // ── Test doubles ───────────────────────────────────────────────────────

    /// Fetcher returning a fixed batch every tick.
    struct FixedFetcher {
        items: Vec<ContentItem>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ContentFetcher for FixedFetcher {
        async fn fetch(&self, source: &Source) -> Result<Vec<ContentItem>> {
            *self.calls.lock().unwrap() += 1;
            let mut items = self.items.clone();
            for item in &mut items {
                item.source_id = Some(source.id.clone());
            }
            Ok(items)
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ContentFetcher for FailingFetcher {
        async fn fetch(&self, _source: &Source) -> Result<Vec<ContentItem>> {
            Err(Error::fetch("connection refused"))
        }
    }

    /// Analyzer returning canned results; can fail on request.
    struct StubAnalyzer {
        priority: Option<Priority>,
        fail_titles: Vec<String>,
    }

    impl StubAnalyzer {
        fn with_priority(priority: Option<Priority>) -> Self {
            Self {
                priority,
                fail_titles: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Analyzer for StubAnalyzer {
        async fn summarize(&self, request: &SummarizeRequest) -> Result<Option<ContentSummary>> {
            if self.fail_titles.contains(&request.title) {
                return Err(Error::Validation("analysis failed".into()));
            }
            Ok(Some(ContentSummary {
                summary: format!("summary of {}", request.title),
                reading_summary: "# Reading".into(),
                alpha_insights: vec!["insight".into()],
                patterns: vec![],
                entities: vec!["rust".into()],
                quotes: vec![],
                tools: vec![],
                urls: vec![],
                metadata: json!({"summarization_mode": "standard"}),
            }))
        }

        async fn evaluate(
            &self,
            _content: &str,
            _title: &str,
            _url: &str,
            _context: &str,
            _learned_preferences: Option<&str>,
        ) -> Result<ContentEvaluation> {
            Ok(ContentEvaluation {
                priority: self.priority,
                matched_interests: self
                    .priority
                    .map(|_| vec!["stub interest".into()])
                    .unwrap_or_default(),
                reasoning: Some("stubbed".into()),
            })
        }
    }

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.api.key = "test-key".into();
        config.daemon.llm_max_retries = 0;
        Arc::new(config)
    }

    async fn temp_storage() -> (tempfile::TempDir, Arc<Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(dir.path().join("test.db")).await.unwrap();
        (dir, Arc::new(storage))
    }

    fn orchestrator_with(
        storage: Arc<Storage>,
        kind: SourceKind,
        fetcher: Box<dyn ContentFetcher>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Orchestrator {
        let mut fetchers: HashMap<SourceKind, Box<dyn ContentFetcher>> = HashMap::new();
        fetchers.insert(kind, fetcher);
        Orchestrator::new(
            storage,
            fetchers,
            analyzer,
            Arc::new(LocalHashEmbedder::new()),
            Notifier::new(true, "definitely-not-a-real-notifier"),
            test_config(),
        )
    }

    fn batch(count: usize) -> Vec<ContentItem> {
        (0..count)
            .map(|n| {
                let mut item = ContentItem::new(
                    "placeholder",
                    format!("ext-{n}"),
                    format!("Item {n}"),
                    format!("https://example.com/{n}"),
                    format!("body of item {n} with some words in it"),
                );
                item.analysis = Some(json!({"metrics": {"score": n}}));
                item
            })
            .collect()
    }

    // ── Tests ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn second_tick_over_unchanged_feed_stores_nothing_new() {
        let (_dir, storage) = temp_storage().await;
        let source_id = storage
            .add_source("https://example.com/feed", SourceKind::Feed, Some("Feed"))
            .await
            .unwrap();

        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::Feed,
            Box::new(FixedFetcher {
                items: batch(3),
                calls: Mutex::new(0),
            }),
            Arc::new(StubAnalyzer::with_priority(Some(Priority::Medium))),
        );

        let first = orchestrator.run_once(false).await;
        assert_eq!(first.items_new, 3);
        assert_eq!(first.items_updated, 0);
        assert!(first.errors.is_empty());

        let second = orchestrator.run_once(false).await;
        assert_eq!(second.items_fetched, 3);
        assert_eq!(second.items_processed, 0);
        assert_eq!(second.items_new, 0);
        assert_eq!(second.items_updated, 0);

        let stored = storage.get_existing_external_ids(&source_id).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn stored_items_carry_summary_priority_and_metrics() {
        let (_dir, storage) = temp_storage().await;
        storage
            .add_source("https://example.com/feed", SourceKind::Feed, Some("Feed"))
            .await
            .unwrap();

        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::Feed,
            Box::new(FixedFetcher {
                items: batch(1),
                calls: Mutex::new(0),
            }),
            Arc::new(StubAnalyzer::with_priority(Some(Priority::High))),
        );
        let stats = orchestrator.run_once(false).await;
        assert_eq!(stats.items_new, 1);
        assert_eq!(stats.new_high_priority.len(), 1);

        let items = storage.get_content_since(None, false).await.unwrap();
        assert_eq!(items.len(), 1);
        let record = &items[0];
        assert_eq!(record.priority, Some(Priority::High));
        assert_eq!(record.summary.as_deref(), Some("summary of Item 0"));
        assert!(record.fetched_at.is_some());
        assert_eq!(record.source_name.as_deref(), Some("Feed"));

        // Fetcher metrics survive the merge; LLM fields land beside them.
        let analysis = record.analysis.as_ref().unwrap();
        assert_eq!(analysis["metrics"]["score"], 0);
        assert_eq!(analysis["matched_interests"][0], "stub interest");
        assert_eq!(analysis["reading_summary"], "# Reading");

        // Embedding was generated from the summary.
        assert_eq!(storage.count_content_without_embeddings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn one_bad_item_never_aborts_the_tick() {
        let (_dir, storage) = temp_storage().await;
        storage
            .add_source("https://example.com/feed", SourceKind::Feed, Some("Feed"))
            .await
            .unwrap();

        let analyzer = StubAnalyzer {
            priority: Some(Priority::Low),
            fail_titles: vec!["Item 1".into()],
        };
        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::Feed,
            Box::new(FixedFetcher {
                items: batch(3),
                calls: Mutex::new(0),
            }),
            Arc::new(analyzer),
        );

        let stats = orchestrator.run_once(false).await;
        assert_eq!(stats.items_new, 2);
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("analysis failed"));
    }

    #[tokio::test]
    async fn fetch_failures_count_toward_deactivation() {
        let (_dir, storage) = temp_storage().await;
        let source_id = storage
            .add_source("https://example.com/feed", SourceKind::Feed, Some("Feed"))
            .await
            .unwrap();

        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::Feed,
            Box::new(FailingFetcher),
            Arc::new(StubAnalyzer::with_priority(None)),
        );

        for _ in 0..5 {
            let stats = orchestrator.run_once(false).await;
            assert_eq!(stats.errors.len(), 1);
        }

        let source = storage.get_source(&source_id).await.unwrap().unwrap();
        assert!(!source.active);
        assert_eq!(source.error_count, 5);

        // The deactivated source is no longer ticked.
        let stats = orchestrator.run_once(false).await;
        assert!(stats.errors.is_empty());
        assert_eq!(stats.items_fetched, 0);
    }

    #[tokio::test]
    async fn large_file_baseline_skips_llm_but_still_embeds() {
        let (_dir, storage) = temp_storage().await;
        storage
            .add_source("https://example.com/doc.md", SourceKind::File, Some("Doc"))
            .await
            .unwrap();

        let mut baseline = ContentItem::new(
            "placeholder",
            "file-ext-1",
            "Doc Updated",
            "https://example.com/doc.md",
            "word ".repeat(20_000), // 100k bytes, not a diff
        );
        baseline.analysis = Some(json!({"content_hash": "h1", "first_fetch": true}));

        // Analyzer that panics if consulted: the baseline path must not
        // touch the LLM.
        struct PanickingAnalyzer;
        #[async_trait]
        impl Analyzer for PanickingAnalyzer {
            async fn summarize(&self, _request: &SummarizeRequest) -> Result<Option<ContentSummary>> {
                panic!("LLM must not be called for oversized baselines");
            }
            async fn evaluate(
                &self,
                _content: &str,
                _title: &str,
                _url: &str,
                _context: &str,
                _learned_preferences: Option<&str>,
            ) -> Result<ContentEvaluation> {
                panic!("LLM must not be called for oversized baselines");
            }
        }

        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::File,
            Box::new(FixedFetcher {
                items: vec![baseline],
                calls: Mutex::new(0),
            }),
            Arc::new(PanickingAnalyzer),
        );

        let stats = orchestrator.run_once(false).await;
        assert_eq!(stats.items_new, 1);
        assert!(stats.errors.is_empty());

        let items = storage.get_content_since(None, false).await.unwrap();
        assert_eq!(items[0].priority, Some(Priority::High));
        assert_eq!(storage.count_content_without_embeddings().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn file_diffs_force_high_priority_over_evaluator() {
        let (_dir, storage) = temp_storage().await;
        storage
            .add_source("https://example.com/doc.md", SourceKind::File, Some("Doc"))
            .await
            .unwrap();

        let mut diff = ContentItem::new(
            "placeholder",
            "file-ext-2",
            "Doc Updated",
            "https://example.com/doc.md",
            "--- a\n+++ b\n@@ -1 +1 @@\n-old\n+new\n",
        );
        diff.priority = Some(Priority::High);

        // Evaluator says "unprioritized"; the file source rule wins.
        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::File,
            Box::new(FixedFetcher {
                items: vec![diff],
                calls: Mutex::new(0),
            }),
            Arc::new(StubAnalyzer::with_priority(None)),
        );

        orchestrator.run_once(false).await;
        let items = storage.get_content_since(None, false).await.unwrap();
        assert_eq!(items[0].priority, Some(Priority::High));
    }

    #[tokio::test]
    async fn archival_job_respects_enabled_flag() {
        let (_dir, storage) = temp_storage().await;
        let mut config = Config::default();
        config.api.key = "k".into();
        config.archival.enabled = false;

        let orchestrator = Orchestrator::new(
            storage,
            HashMap::new(),
            Arc::new(StubAnalyzer::with_priority(None)),
            Arc::new(LocalHashEmbedder::new()),
            Notifier::new(true, "true"),
            Arc::new(config),
        );
        assert_eq!(orchestrator.run_archival().await, 0);
    }

    #[tokio::test]
    async fn backfill_embeds_stragglers() {
        let (_dir, storage) = temp_storage().await;
        let source_id = storage
            .add_source("https://example.com/feed", SourceKind::Feed, None)
            .await
            .unwrap();
        let item = ContentItem::new(&source_id, "straggler", "Straggler", "https://x", "text");
        storage.add_content(&item).await.unwrap();

        let orchestrator = orchestrator_with(
            storage.clone(),
            SourceKind::Feed,
            Box::new(FixedFetcher {
                items: vec![],
                calls: Mutex::new(0),
            }),
            Arc::new(StubAnalyzer::with_priority(None)),
        );

        let (processed, failed) = orchestrator.backfill_embeddings(50).await;
        assert_eq!((processed, failed), (1, 0));
        assert_eq!(storage.count_content_without_embeddings().await.unwrap(), 0);

        // Nothing left to do on the next run.
        assert_eq!(orchestrator.backfill_embeddings(50).await, (0, 0));
    }

    #[test]
    fn merge_preserves_metrics_and_fetcher_keys() {
        let existing = json!({
            "metrics": {"score": 42, "num_comments": 7},
            "content_hash": "abc",
            "reading_summary": "fetcher-side value",
        });
        let llm = json!({
            "reading_summary": "llm value",
            "entities": ["rust"],
        });

        let merged = merge_analysis(Some(&existing), llm);
        assert_eq!(merged["metrics"]["score"], 42);
        assert_eq!(merged["content_hash"], "abc");
        // LLM fields overlay on conflict.
        assert_eq!(merged["reading_summary"], "llm value");
        assert_eq!(merged["entities"][0], "rust");
    }

    #[test]
    fn merge_with_non_object_llm_payload_keeps_metrics() {
        let existing = json!({"metrics": {"score": 1}});
        let merged = merge_analysis(Some(&existing), json!("not an object"));
        assert_eq!(merged["metrics"]["score"], 1);
    }
}
