//! End-to-end file-source change detection through the orchestrator.
//!
//! A minimal local HTTP server plays the monitored document; three ticks
//! exercise baseline storage, diff generation, and no-change suppression.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use prismis_config::Config;
use prismis_core::{Priority, Result, SourceKind};
use prismis_daemon::{Analyzer, Notifier, Orchestrator};
use prismis_fetchers::{ContentFetcher, FileFetcher};
use prismis_llm::{ContentEvaluation, ContentSummary, LocalHashEmbedder, SummarizeRequest};
use prismis_storage::Storage;

/// Serves the current value of the watched document over HTTP.
async fn spawn_doc_server(body_rx: watch::Receiver<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let body = body_rx.borrow().clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/markdown\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });

    format!("http://{addr}/doc.md")
}

struct CannedAnalyzer;

#[async_trait]
impl Analyzer for CannedAnalyzer {
    async fn summarize(&self, request: &SummarizeRequest) -> Result<Option<ContentSummary>> {
        Ok(Some(ContentSummary {
            summary: format!("changes to {}", request.title),
            reading_summary: "# What Changed".into(),
            alpha_insights: vec![],
            patterns: vec![],
            entities: vec!["docs".into()],
            quotes: vec![],
            tools: vec![],
            urls: vec![],
            metadata: serde_json::json!({"summarization_mode": "diff"}),
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
        Ok(ContentEvaluation::default())
    }
}

#[tokio::test]
async fn file_source_baseline_diff_and_no_change() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::open(dir.path().join("test.db")).await.unwrap());

    let (body_tx, body_rx) = watch::channel(
        "# Changelog\n\n- initial release\n- second entry\n".to_string(),
    );
    let url = spawn_doc_server(body_rx).await;

    let source_id = storage
        .add_source(&url, SourceKind::File, Some("Changelog"))
        .await
        .unwrap();

    let mut config = Config::default();
    config.api.key = "k".into();
    config.daemon.llm_max_retries = 0;

    let mut fetchers: HashMap<SourceKind, Box<dyn ContentFetcher>> = HashMap::new();
    fetchers.insert(
        SourceKind::File,
        Box::new(FileFetcher::new(storage.clone()).unwrap()),
    );

    let orchestrator = Orchestrator::new(
        storage.clone(),
        fetchers,
        Arc::new(CannedAnalyzer),
        Arc::new(LocalHashEmbedder::new()),
        Notifier::new(true, "definitely-not-a-real-notifier"),
        Arc::new(config),
    );

    // Tick 1: baseline stored with the full body and first_fetch marker.
    let stats = orchestrator.run_once(false).await;
    assert_eq!(stats.items_new, 1, "errors: {:?}", stats.errors);

    let baseline = storage
        .get_latest_content_for_source(&source_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(baseline.priority, Some(Priority::High));
    assert!(baseline.content.contains("initial release"));
    let analysis = baseline.analysis.as_ref().unwrap();
    assert_eq!(analysis["first_fetch"], true);
    assert!(analysis["content_hash"].as_str().unwrap().len() == 64);

    // Tick 2: one changed line produces exactly one diff item.
    body_tx
        .send("# Changelog\n\n- initial release\n- second entry REVISED\n".to_string())
        .unwrap();
    let stats = orchestrator.run_once(false).await;
    assert_eq!(stats.items_new, 1, "errors: {:?}", stats.errors);

    let diff = storage
        .get_latest_content_for_source(&source_id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(diff.id, baseline.id);
    assert!(diff.content.starts_with("---"), "content: {}", diff.content);
    assert!(diff.content.contains("+- second entry REVISED"));
    let analysis = diff.analysis.as_ref().unwrap();
    assert_eq!(analysis["first_fetch"], false);
    let added = analysis["diff_stats"]["added_lines"].as_i64().unwrap();
    let removed = analysis["diff_stats"]["removed_lines"].as_i64().unwrap();
    assert!(added + removed >= 1);
    // The new full body is preserved for the next diff.
    assert!(analysis["full_text"].as_str().unwrap().contains("REVISED"));

    // Tick 3: unchanged content stores nothing.
    let stats = orchestrator.run_once(false).await;
    assert_eq!(stats.items_fetched, 0);
    assert_eq!(stats.items_new, 0);

    let ids = storage.get_existing_external_ids(&source_id).await.unwrap();
    assert_eq!(ids.len(), 2);
}
