use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use phrase_api::aggregate::RetryPolicy;
use phrase_api::graph::{GraphStore, InMemoryGraphStore};
use phrase_api::model::{content_key, EdgeKind, PhraseStatus};
use phrase_api::pipeline::DocumentProcessor;
use phrase_api::server::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn app(store: Arc<InMemoryGraphStore>) -> Router {
    let processor = DocumentProcessor::load(
        store,
        RetryPolicy::new(3, Duration::from_millis(1)),
        reqwest::Client::new(),
    )
    .await
    .expect("processor should load");
    router(AppState::new(processor))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn bags(items: &Value) -> Vec<String> {
    items["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["bag"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_html_document_end_to_end() {
    let store = Arc::new(InMemoryGraphStore::new());
    let app = app(store.clone()).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/doc-process/?doc_type=HTML&ngram_range=1,2",
        Some(json!({ "document": "<html><body><p>hello world</p><script>var x;</script></body></html>" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Results integration done.");

    let (status, body) = send(&app, "GET", "/api/data-fetcher/?status=no_status&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut found = bags(&body);
    found.sort();
    assert_eq!(found, vec!["hello", "hello world", "world"]);

    let phrase = store.phrase("hello world").await.unwrap();
    assert_eq!(phrase.key, content_key("hello world"));
    assert_eq!(phrase.count, 1);
}

#[tokio::test]
async fn test_repeated_documents_accumulate_counts() {
    let store = Arc::new(InMemoryGraphStore::new());
    let app = app(store.clone()).await;

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            "POST",
            "/api/doc-process/",
            Some(json!({ "document": "tehran news tehran" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, "GET", "/api/data-fetcher/?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bags(&body), vec!["tehran"]);
    assert_eq!(body["items"][0]["count"], 4);

    let (_, page_two) = send(&app, "GET", "/api/data-fetcher/?limit=1&page=2", None).await;
    assert_eq!(page_two["items"].as_array().unwrap().len(), 1);
    assert_ne!(bags(&page_two), vec!["tehran"]);
}

#[tokio::test]
async fn test_no_status_fetch_honours_limit_and_order() {
    let store = Arc::new(InMemoryGraphStore::new());
    let app = app(store.clone()).await;

    // 5 + 5 + 4 distinct n-grams, "alpha" counted twice
    let (status, _) = send(
        &app,
        "POST",
        "/api/doc-process/",
        Some(json!({ "document": "alpha beta gamma delta epsilon alpha" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    store.set_status(&content_key("beta"), PhraseStatus::Stop).await.unwrap();

    let (status, body) = send(&app, "GET", "/api/data-fetcher/?status=no_status&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 10);
    assert_eq!(items[0]["bag"], "alpha");
    assert!(items.iter().all(|item| item["status"].is_null()));
    let counts: Vec<u64> = items.iter().map(|item| item["count"].as_u64().unwrap()).collect();
    assert!(counts.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn test_data_fetcher_rejects_bad_queries() {
    let app = app(Arc::new(InMemoryGraphStore::new())).await;

    let (status, body) = send(&app, "GET", "/api/data-fetcher/?status=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Wrong status code input."));

    let (status, _) = send(&app, "GET", "/api/data-fetcher/?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/data-fetcher/?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_doc_process_rejects_bad_requests() {
    let app = app(Arc::new(InMemoryGraphStore::new())).await;

    let (status, _) = send(&app, "POST", "/api/doc-process/?ngram_range=3,1", Some(json!({ "document": "a b" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/api/doc-process/?doc_id=7", Some(json!({ "document": "a b" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/api/doc-process/", Some(json!({ "text": "a b" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_doc_process_with_doc_ref_stages_only() {
    let store = Arc::new(InMemoryGraphStore::new());
    let app = app(store.clone()).await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/doc-process/?doc_id=42&sitename=news",
        Some(json!({ "document": "hello world" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(store.phrase_count().await, 0);
    assert_eq!(store.edge_count(EdgeKind::Phrase).await, 0);
    assert_eq!(store.doc_phrases("news", "42").await.unwrap().len(), 3);
    assert_eq!(store.doc_edges("news", "42").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_status_updater() {
    let store = Arc::new(InMemoryGraphStore::new());
    let app = app(store.clone()).await;
    send(&app, "POST", "/api/doc-process/", Some(json!({ "document": "hello world" }))).await;

    let (status, _) = send(&app, "POST", "/api/status-updater/hello%20world/0", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(store.phrase("hello world").await.unwrap().status, Some(PhraseStatus::Stop));

    let (status, _) = send(&app, "POST", "/api/status-updater/hello%20world/1", None).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, "POST", "/api/status-updater/hello%20world/5", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/api/status-updater/never%20seen/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (_, body) = send(&app, "GET", "/api/data-fetcher/?status=highlight", None).await;
    assert_eq!(bags(&body), vec!["hello world"]);
    let (_, body) = send(&app, "GET", "/api/data-fetcher/?status=has_status", None).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_word_graph() {
    let store = Arc::new(InMemoryGraphStore::new());
    let app = app(store.clone()).await;

    let (status, body) = send(&app, "POST", "/api/word-graph/", Some(json!({ "document": "red fox. red hen" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Results integration done.");
    assert_eq!(store.word("red").await.unwrap().count, 2);
}
