use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use serde_json::json;
use urnas_fetch::{
    ClientOptions, DownloadOutcome, FetchError, Fetcher, RateLimitedClient, RetryPolicy,
};

#[derive(Default)]
struct Hits {
    flaky: AtomicUsize,
    broken: AtomicUsize,
    file: AtomicUsize,
    flaky_file: AtomicUsize,
}

async fn ok_json() -> Json<serde_json::Value> {
    Json(json!({"abr": [{"cd": "DF"}]}))
}

async fn flaky(State(hits): State<Arc<Hits>>) -> Response {
    if hits.flaky.fetch_add(1, Ordering::SeqCst) < 2 {
        StatusCode::TOO_MANY_REQUESTS.into_response()
    } else {
        Json(json!({"ok": true})).into_response()
    }
}

async fn broken(State(hits): State<Arc<Hits>>) -> StatusCode {
    hits.broken.fetch_add(1, Ordering::SeqCst);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn file(State(hits): State<Arc<Hits>>) -> Vec<u8> {
    hits.file.fetch_add(1, Ordering::SeqCst);
    vec![7u8; 20_000]
}

async fn flaky_file(State(hits): State<Arc<Hits>>) -> Response {
    if hits.flaky_file.fetch_add(1, Ordering::SeqCst) == 0 {
        StatusCode::BAD_GATEWAY.into_response()
    } else {
        b"ballot".to_vec().into_response()
    }
}

/// Twenty slow 1000-byte chunks of one letter.
async fn letters(fill: u8) -> Body {
    let chunks = futures::stream::iter(0..20).then(move |_| async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok::<_, std::io::Error>(vec![fill; 1000])
    });
    Body::from_stream(chunks)
}

async fn serve() -> (SocketAddr, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/ok.json", get(ok_json))
        .route("/flaky.json", get(flaky))
        .route("/broken.json", get(broken))
        .route("/broken.bu", get(broken))
        .route("/file.bu", get(file))
        .route("/flaky.bu", get(flaky_file))
        .route("/aaa/o00406-9701200010001.bu", get(|| letters(b'A')))
        .route("/bbb/o00406-9701200010001.bu", get(|| letters(b'B')))
        .with_state(Arc::clone(&hits));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn client() -> RateLimitedClient {
    RateLimitedClient::new(ClientOptions {
        rate_limit: 1000,
        burst: Some(100),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 4,
            backoff_unit: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(5),
        },
        user_agent: "urnas-test".to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn json_found_and_not_found() {
    let (addr, _) = serve().await;
    let c = client();
    let found = c.fetch_json(&format!("http://{addr}/ok.json")).await.unwrap();
    assert_eq!(found.unwrap()["abr"][0]["cd"], "DF");

    let missing = c.fetch_json(&format!("http://{addr}/nope.json")).await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn too_many_requests_is_retried() {
    let (addr, hits) = serve().await;
    let value = client()
        .fetch_json(&format!("http://{addr}/flaky.json"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value["ok"], true);
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn server_errors_exhaust_the_budget() {
    let (addr, hits) = serve().await;
    let err = client()
        .fetch_json(&format!("http://{addr}/broken.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Exhausted { attempts: 4, .. }));
    assert_eq!(hits.broken.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn download_then_skip_existing() {
    let (addr, hits) = serve().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let dest = tmp.path().join("df/97012/0001/0042/o00406-1.bu");
    let c = client();
    let url = format!("http://{addr}/file.bu");

    let first = c.download_file(&url, &dest).await.unwrap();
    assert_eq!(first, DownloadOutcome::Downloaded { bytes: 20_000 });
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 20_000);
    assert_eq!(entries(dest.parent().unwrap()), vec!["o00406-1.bu"]);

    let second = c.download_file(&url, &dest).await.unwrap();
    assert_eq!(second, DownloadOutcome::AlreadyPresent);
    assert_eq!(hits.file.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_downloads_to_one_destination_never_mix() {
    let (addr, _) = serve().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let dest = tmp.path().join("o00406-9701200010001.bu");
    let c = client();
    let a = format!("http://{addr}/aaa/o00406-9701200010001.bu");
    let b = format!("http://{addr}/bbb/o00406-9701200010001.bu");

    let (ra, rb) = tokio::join!(c.download_file(&a, &dest), c.download_file(&b, &dest));
    for outcome in [ra.unwrap(), rb.unwrap()] {
        assert!(matches!(
            outcome,
            DownloadOutcome::Downloaded { bytes: 20_000 } | DownloadOutcome::AlreadyPresent
        ));
    }

    let body = std::fs::read(&dest).unwrap();
    assert_eq!(body.len(), 20_000);
    assert!(
        body.iter().all(|&b| b == body[0]),
        "file mixes bytes from both sources"
    );
    assert_eq!(entries(tmp.path()), vec!["o00406-9701200010001.bu"]);
}

#[tokio::test]
async fn empty_file_is_downloaded_again() {
    let (addr, hits) = serve().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let dest = tmp.path().join("o00406-1.bu");
    std::fs::write(&dest, b"").unwrap();
    let outcome = client()
        .download_file(&format!("http://{addr}/file.bu"), &dest)
        .await
        .unwrap();
    assert!(matches!(outcome, DownloadOutcome::Downloaded { .. }));
    assert_eq!(hits.file.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_retries_then_succeeds() {
    let (addr, hits) = serve().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let dest = tmp.path().join("x.bu");
    let outcome = client()
        .download_file(&format!("http://{addr}/flaky.bu"), &dest)
        .await
        .unwrap();
    assert_eq!(outcome, DownloadOutcome::Downloaded { bytes: 6 });
    assert_eq!(std::fs::read(&dest).unwrap(), b"ballot");
    assert_eq!(hits.flaky_file.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_download_leaves_nothing_behind() {
    let (addr, _) = serve().await;
    let tmp = tempfile::TempDir::new().unwrap();
    let dest = tmp.path().join("gone.bu");
    let c = client();

    let err = c
        .download_file(&format!("http://{addr}/broken.bu"), &dest)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Exhausted { .. }));
    assert!(!dest.exists());
    assert!(entries(tmp.path()).is_empty());

    let missing = c
        .download_file(&format!("http://{addr}/nothing.bu"), &dest)
        .await
        .unwrap();
    assert_eq!(missing, DownloadOutcome::NotFound);
    assert!(!dest.exists());
}

#[tokio::test]
async fn connection_refused_is_retried_then_fails() {
    // Bind and drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client()
        .fetch_json(&format!("http://{addr}/ok.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Exhausted { attempts: 4, .. }));
}
