//! HTTP-level tests for the pracuj fetcher and Telegram notifier.
//!
//! Each test spawns a local axum server that stands in for the remote API.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};

use jobwatch_core::{ListingFetcher, Notifier, Posting, SearchDefinition};
use jobwatch_sources::{PracujFetcher, TelegramConfig, TelegramNotifier};

const LISTING_PAGE: &str = r#"<html><body>
<script id="__NEXT_DATA__" type="application/json">
{"props":{"pageProps":{"data":{"jobOffers":{"groupedOffers":[
  {"groupId":"g-1","jobTitle":"Python Developer","companyName":"Acme","positionLevels":["Mid"],
   "technologies":["Python"],"offers":[{"displayWorkplace":"Warszawa","offerAbsoluteUri":"https://www.pracuj.pl/praca/g-1"}]},
  {"groupId":"g-2","jobTitle":"Data Engineer","companyName":"Globex",
   "offers":[{"displayWorkplace":"Warszawa","offerAbsoluteUri":"https://www.pracuj.pl/praca/g-2"}]}
]}}}}}
</script></body></html>"#;

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn search() -> SearchDefinition {
    SearchDefinition::new("Python Developer", Some("Warszawa")).unwrap()
}

// ============================================================================
// FETCHER
// ============================================================================

async fn spawn_listing_server(requested: Arc<Mutex<Vec<String>>>) -> String {
    let router = Router::new()
        .route(
            "/ok/*rest",
            get(move |Path(rest): Path<String>| {
                let requested = requested.clone();
                async move {
                    requested.lock().unwrap().push(rest);
                    Html(LISTING_PAGE)
                }
            }),
        )
        .route(
            "/limited/*rest",
            get(|| async { StatusCode::TOO_MANY_REQUESTS }),
        )
        .route("/gone/*rest", get(|| async { StatusCode::NOT_FOUND }))
        .route(
            "/interstitial/*rest",
            get(|| async { Html("<html><body>Just a moment…</body></html>") }),
        );
    spawn_server(router).await
}

#[tokio::test]
async fn test_fetch_listing_page() {
    let requested = Arc::new(Mutex::new(Vec::new()));
    let base = spawn_listing_server(requested.clone()).await;
    let fetcher = PracujFetcher::with_base_url(format!("{base}/ok")).unwrap();

    let postings = fetcher.fetch(&search()).await.unwrap();
    let ids: Vec<_> = postings.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["g-1", "g-2"]);

    let requested = requested.lock().unwrap();
    assert_eq!(requested.len(), 1);
    assert!(requested[0].starts_with("Python Developer;kw/Warszawa;wp"));
}

#[tokio::test]
async fn test_fetch_rate_limited_is_transient() {
    let base = spawn_listing_server(Arc::default()).await;
    let fetcher = PracujFetcher::with_base_url(format!("{base}/limited")).unwrap();
    let err = fetcher.fetch(&search()).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_not_found_is_permanent() {
    let base = spawn_listing_server(Arc::default()).await;
    let fetcher = PracujFetcher::with_base_url(format!("{base}/gone")).unwrap();
    let err = fetcher.fetch(&search()).await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_fetch_interstitial_is_transient() {
    let base = spawn_listing_server(Arc::default()).await;
    let fetcher = PracujFetcher::with_base_url(format!("{base}/interstitial")).unwrap();
    let err = fetcher.fetch(&search()).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_unreachable_host_is_transient() {
    // Port 9 (discard) on localhost is normally closed.
    let fetcher = PracujFetcher::with_base_url("http://127.0.0.1:9/praca").unwrap();
    let err = fetcher.fetch(&search()).await.unwrap_err();
    assert!(err.is_transient());
}

// ============================================================================
// NOTIFIER
// ============================================================================

type Received = Arc<Mutex<Vec<(String, JsonValue)>>>;

async fn send_message(
    State(received): State<Received>,
    Path(bot): Path<String>,
    Json(body): Json<JsonValue>,
) -> impl IntoResponse {
    received.lock().unwrap().push((bot, body.clone()));
    match body["chat_id"].as_str() {
        Some("missing") => (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "description": "Bad Request: chat not found"})),
        ),
        Some("flaky") => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"ok": false, "description": "Too Many Requests: retry after 5"})),
        ),
        _ => (StatusCode::OK, Json(json!({"ok": true, "result": {}}))),
    }
}

async fn spawn_telegram_server() -> (String, Received) {
    let received: Received = Arc::default();
    let router = Router::new()
        .route("/:bot/sendMessage", post(send_message))
        .with_state(received.clone());
    (spawn_server(router).await, received)
}

fn notifier(base: &str, chat_id: &str) -> TelegramNotifier {
    TelegramNotifier::new(TelegramConfig::new("123:abc", chat_id).with_api_base(base)).unwrap()
}

fn posting() -> Posting {
    Posting::new("g-1", "Python Developer", "https://www.pracuj.pl/praca/g-1")
        .with_company("Acme")
        .with_location("Warszawa")
}

#[tokio::test]
async fn test_send_message_success() {
    let (base, received) = spawn_telegram_server().await;
    notifier(&base, "-1001").send(&search(), &posting()).await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let (bot, body) = &received[0];
    assert_eq!(bot, "bot123:abc");
    assert_eq!(body["chat_id"], "-1001");
    assert_eq!(body["parse_mode"], "HTML");
    assert!(body["text"].as_str().unwrap().contains("Python Developer"));
}

#[tokio::test]
async fn test_send_message_unknown_chat_is_permanent() {
    let (base, _received) = spawn_telegram_server().await;
    let err = notifier(&base, "missing")
        .send(&search(), &posting())
        .await
        .unwrap_err();
    assert!(!err.is_transient());
    assert!(err.message().contains("chat not found"));
}

#[tokio::test]
async fn test_send_message_rate_limited_is_transient() {
    let (base, _received) = spawn_telegram_server().await;
    let err = notifier(&base, "flaky")
        .send(&search(), &posting())
        .await
        .unwrap_err();
    assert!(err.is_transient());
}
