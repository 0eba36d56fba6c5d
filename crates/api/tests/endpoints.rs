//! Router-level tests: auth, envelope shape, filters, prune protection.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use prismis_api::AppState;
use prismis_config::Config;
use prismis_core::{ContentItem, Priority, SourceKind};
use prismis_llm::{LlmClient, LlmSettings, LocalHashEmbedder};
use prismis_storage::Storage;

const API_KEY: &str = "test-secret";

async fn test_app() -> (tempfile::TempDir, PathBuf, Router) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    // Create the schema up front.
    Storage::open(&db_path).await.unwrap().close();

    let mut config = Config::default();
    config.api.key = API_KEY.into();
    config.llm.provider = "openai".into();
    config.llm.model = "gpt-4o-mini".into();
    config.llm.api_key = "unused-in-tests".into();

    let settings =
        LlmSettings::from_config("openai", "gpt-4o-mini", "unused-in-tests", None).unwrap();
    let state = AppState::new(
        Arc::new(config),
        db_path.clone(),
        Arc::new(LocalHashEmbedder::new()),
        Arc::new(LlmClient::new(settings).unwrap()),
    );
    (dir, db_path, prismis_api::router(state))
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn health_needs_no_key_but_api_does() {
    let (_dir, _db, app) = test_app().await;

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["database"], "connected");

    let (status, body) = send(&app, "GET", "/api/entries", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Missing API key"));
    assert_eq!(body["data"], Value::Null);

    let (status, _) = send(&app, "GET", "/api/entries", Some("wrong-key"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn entry_listing_filters_match_storage_counts() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, Some("Feed"))
        .await
        .unwrap();

    // 2 unread high, 1 read high, 1 unread medium, 1 unprioritized.
    for (ext, priority, read) in [
        ("h1", Some(Priority::High), false),
        ("h2", Some(Priority::High), false),
        ("h3", Some(Priority::High), true),
        ("m1", Some(Priority::Medium), false),
        ("u1", None, false),
    ] {
        let mut item = ContentItem::new(&source_id, ext, ext, "https://example.com/x", "body");
        item.priority = priority;
        item.read = read;
        storage.add_content(&item).await.unwrap();
    }
    storage.close();

    let (status, body) = send(
        &app,
        "GET",
        "/api/entries?priority=high&unread_only=true",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);

    // Unprioritized items never appear in listings.
    let (_, body) = send(&app, "GET", "/api/entries?limit=100", Some(API_KEY), None).await;
    assert_eq!(body["data"]["total"], 4);

    // Invalid priority is a 422 through the envelope.
    let (status, body) = send(
        &app,
        "GET",
        "/api/entries?priority=urgent",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        "GET",
        "/api/entries?limit=20000",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn entry_detail_is_lightweight_unless_content_requested() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();
    let mut item = ContentItem::new(&source_id, "e1", "Entry", "https://example.com/1", "the full body");
    item.priority = Some(Priority::Low);
    let id = storage.add_content(&item).await.unwrap().unwrap();
    storage.close();

    let (status, body) = send(&app, "GET", &format!("/api/entries/{id}"), Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].get("content").is_none());
    assert_eq!(body["data"]["title"], "Entry");

    let (_, body) = send(
        &app,
        "GET",
        &format!("/api/entries/{id}?include=content"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(body["data"]["content"], "the full body");

    let (status, _) = send(
        &app,
        "GET",
        "/api/entries/does-not-exist",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn raw_endpoint_returns_plain_text() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();
    let item = ContentItem::new(&source_id, "e1", "Entry", "https://example.com/1", "pipeable text");
    let id = storage.add_content(&item).await.unwrap().unwrap();
    storage.close();

    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/entries/{id}/raw"))
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"), "{content_type}");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), b"pipeable text");
}

#[tokio::test]
async fn entry_update_flows_and_validation() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();
    let item = ContentItem::new(&source_id, "e1", "Entry", "https://example.com/1", "body");
    let id = storage.add_content(&item).await.unwrap().unwrap();
    storage.close();

    // Empty body: validation error.
    let (status, _) = send(
        &app,
        "PATCH",
        &format!("/api/entries/{id}"),
        Some(API_KEY),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/entries/{id}"),
        Some(API_KEY),
        Some(serde_json::json!({"read": true, "flagged": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["read"], true);
    assert_eq!(body["data"]["flagged"], true);

    let storage = Storage::open(&db_path).await.unwrap();
    let record = storage.get_content_by_id(&id).await.unwrap().unwrap();
    assert!(record.read);
    assert!(record.flagged_interesting);
    storage.close();
}

#[tokio::test]
async fn prune_endpoints_respect_protection() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();
    let mut ids = Vec::new();
    for n in 0..5 {
        let item = ContentItem::new(
            &source_id,
            format!("u{n}"),
            "Unprioritized",
            "https://example.com/x",
            "body",
        );
        ids.push(storage.add_content(&item).await.unwrap().unwrap());
    }
    storage.set_flagged(&ids[0], true).await.unwrap();
    storage.set_flagged(&ids[1], true).await.unwrap();
    storage
        .update_content_status(&ids[2], None, Some(true))
        .await
        .unwrap();
    storage.close();

    let (status, body) = send(&app, "GET", "/api/prune/count", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 2);

    let (status, body) = send(&app, "POST", "/api/prune", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 2);

    // Flagged and favorited items survive.
    let storage = Storage::open(&db_path).await.unwrap();
    for id in &ids[..3] {
        assert!(storage.get_content_by_id(id).await.unwrap().is_some());
    }
    storage.close();
}

#[tokio::test]
async fn delete_source_preserves_favorites() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();
    let favorite = ContentItem::new(&source_id, "fav", "Favorite", "https://example.com/f", "body");
    let favorite_id = storage.add_content(&favorite).await.unwrap().unwrap();
    storage
        .update_content_status(&favorite_id, None, Some(true))
        .await
        .unwrap();
    let other = ContentItem::new(&source_id, "other", "Other", "https://example.com/o", "body");
    let other_id = storage.add_content(&other).await.unwrap().unwrap();
    storage.close();

    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/sources/{source_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let storage = Storage::open(&db_path).await.unwrap();
    let survivor = storage.get_content_by_id(&favorite_id).await.unwrap().unwrap();
    assert_eq!(survivor.source_id, None);
    assert!(storage.get_content_by_id(&other_id).await.unwrap().is_none());
    storage.close();

    // Deleting again: 404 through the envelope.
    let (status, body) = send(
        &app,
        "DELETE",
        &format!("/api/sources/{source_id}"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn pause_and_resume_toggle_active() {
    let (_dir, db_path, app) = test_app().await;

    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();
    storage
        .update_source_fetch_status(&source_id, false, Some("boom"))
        .await
        .unwrap();
    storage.close();

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/sources/{source_id}/pause"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], false);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/sources/{source_id}/resume"),
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], true);

    let storage = Storage::open(&db_path).await.unwrap();
    let source = storage.get_source(&source_id).await.unwrap().unwrap();
    assert!(source.active);
    assert_eq!(source.error_count, 0);
    storage.close();
}

#[tokio::test]
async fn semantic_search_ranks_by_relevance() {
    let (_dir, db_path, app) = test_app().await;

    let embedder = LocalHashEmbedder::new();
    let storage = Storage::open(&db_path).await.unwrap();
    let source_id = storage
        .add_source("https://example.com/feed", SourceKind::Feed, None)
        .await
        .unwrap();

    use prismis_llm::EmbeddingProvider;
    let texts = [
        ("rust-post", "rust async runtime scheduling internals explained"),
        ("bread-post", "sourdough bread baking hydration temperatures"),
    ];
    for (ext, text) in texts {
        let item = ContentItem::new(&source_id, ext, ext, "https://example.com/x", text);
        let id = storage.add_content(&item).await.unwrap().unwrap();
        let vector = embedder.embed_text(text).await.unwrap();
        storage
            .add_embedding(&id, &vector, embedder.model_name())
            .await
            .unwrap();
    }
    storage.close();

    let (status, body) = send(
        &app,
        "GET",
        "/api/search?q=rust%20async%20runtime%20scheduling%20internals%20explained",
        Some(API_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["data"]["items"].as_array().unwrap();
    assert!(!items.is_empty());
    assert_eq!(items[0]["external_id"], "rust-post");
    assert!(items[0]["relevance_score"].as_f64().unwrap() >= 0.85);

    // Out-of-range limit rejected.
    let (status, _) = send(&app, "GET", "/api/search?q=x&limit=100", Some(API_KEY), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
