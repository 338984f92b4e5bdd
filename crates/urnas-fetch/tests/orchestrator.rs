use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use urnas_core::{RoundCode, Section, SectionLayout};
use urnas_fetch::{
    DownloadOrchestrator, DownloadOutcome, DownloadRequest, FetchError, Fetcher, ResourceNavigator,
};

const BASE: &str = "http://tse";

/// In-memory authority: JSON pages by URL, failing URLs, a log of every
/// download attempt, and the most downloads ever in flight at once.
#[derive(Default)]
struct FakeAuthority {
    pages: HashMap<String, Value>,
    failing: HashSet<String>,
    downloads: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Fetcher for FakeAuthority {
    async fn fetch_json(&self, url: &str) -> Result<Option<Value>, FetchError> {
        if self.failing.contains(url) {
            return Err(FetchError::Exhausted {
                url: url.to_string(),
                attempts: 10,
                last: "HTTP 503".to_string(),
            });
        }
        Ok(self.pages.get(url).cloned())
    }

    async fn download_file(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, FetchError> {
        if dest.exists() {
            return Ok(DownloadOutcome::AlreadyPresent);
        }
        self.downloads.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(dest, url.as_bytes()).unwrap();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(DownloadOutcome::Downloaded {
            bytes: url.len() as u64,
        })
    }
}

fn round() -> RoundCode {
    RoundCode::from("406")
}

fn section(n: &str) -> Section {
    Section::new("df", "97012", "0001", n)
}

fn state_page(sections: &[&str]) -> (String, Value) {
    let sec: Vec<Value> = sections.iter().map(|ns| json!({ "ns": ns })).collect();
    (
        format!("{BASE}/ele2022/arquivo-urna/406/config/df/df-p000406-cs.json"),
        json!({"abr": [{"cd": "DF", "ds": "DISTRITO FEDERAL", "mu": [
            {"cd": "97012", "nm": "BRASÍLIA", "zon": [{"cd": "0001", "sec": sec}]}
        ]}]}),
    )
}

fn manifest_url(n: &str) -> String {
    format!(
        "{BASE}/ele2022/arquivo-urna/406/dados/df/97012/0001/{n}/p000406-df-m97012-z0001-s{n}-aux.json"
    )
}

fn orchestrator(authority: FakeAuthority, root: &Path) -> (DownloadOrchestrator, Arc<FakeAuthority>) {
    orchestrator_with(authority, root, 4)
}

fn orchestrator_with(
    authority: FakeAuthority,
    root: &Path,
    max_concurrent: usize,
) -> (DownloadOrchestrator, Arc<FakeAuthority>) {
    let authority = Arc::new(authority);
    let navigator = ResourceNavigator::new(authority.clone(), BASE);
    let orch = DownloadOrchestrator::new(navigator, SectionLayout::new(root), max_concurrent);
    (orch, authority)
}

fn request() -> DownloadRequest {
    DownloadRequest::new("ele2022", round(), "DF")
}

#[tokio::test]
async fn three_section_state() {
    let mut authority = FakeAuthority::default();
    let (url, page) = state_page(&["0001", "0002", "0003"]);
    authority.pages.insert(url, page);
    // Ordinary machine plus a contingency replacement.
    authority.pages.insert(
        manifest_url("0001"),
        json!({"hashes": [
            {"hash": "aaa", "st": "Totalizado", "nmarq": ["o00406-9701200010001.bu", "o00406-9701200010001.logjez"]},
            {"hash": "bbb", "st": "Recebido", "nmarq": ["o00406-9701200010001.bu.c"]}
        ]}),
    );
    authority.pages.insert(manifest_url("0002"), json!({"hashes": []}));
    // 0003 is not published yet.

    let tmp = tempfile::TempDir::new().unwrap();
    let done: Arc<Mutex<Vec<(PathBuf, String)>>> = Arc::default();
    let sink_log = Arc::clone(&done);
    let (orch, authority) = orchestrator(authority, tmp.path());
    let orch = orch.with_sink(Arc::new(move |dir: &Path, round: &RoundCode| {
        sink_log
            .lock()
            .unwrap()
            .push((dir.to_path_buf(), round.to_string()));
    }));

    let stats = orch.download_state(&request()).await.unwrap();
    assert_eq!(stats.sections_processed, 3);
    assert_eq!(stats.downloaded, 3);
    assert_eq!(stats.errors, 0);

    let layout = SectionLayout::new(tmp.path());
    let dir = layout.section_dir(&section("0001"));
    assert!(dir.join("o00406-9701200010001.bu").exists());
    assert!(dir.join("o00406-9701200010001.bu.c").exists());

    let urls = authority.downloads.lock().unwrap().clone();
    assert!(urls.contains(&format!(
        "{BASE}/ele2022/arquivo-urna/406/dados/df/97012/0001/0001/bbb/o00406-9701200010001.bu.c"
    )));

    let mut done = done.lock().unwrap().clone();
    done.sort();
    assert_eq!(done.len(), 3);
    assert_eq!(done[0], (dir, "406".to_string()));
}

#[tokio::test]
async fn placeholder_hashes_never_download() {
    let mut authority = FakeAuthority::default();
    let (url, page) = state_page(&["0001"]);
    authority.pages.insert(url, page);
    authority.pages.insert(
        manifest_url("0001"),
        json!({"hashes": [
            {"hash": "0", "nmarq": ["o00406-1.bu"]},
            {"hash": "", "arq": [{"nm": "o00406-1-bu.dat"}]}
        ]}),
    );
    let tmp = tempfile::TempDir::new().unwrap();
    let (orch, authority) = orchestrator(authority, tmp.path());

    let stats = orch.download_state(&request()).await.unwrap();
    assert_eq!(stats.sections_processed, 1);
    assert_eq!(stats.downloaded, 0);
    assert_eq!(stats.errors, 0);
    assert!(authority.downloads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_section_does_not_abort_siblings() {
    let mut authority = FakeAuthority::default();
    let (url, page) = state_page(&["0001", "0002", "0003"]);
    authority.pages.insert(url, page);
    for n in ["0001", "0003"] {
        authority.pages.insert(
            manifest_url(n),
            json!({"hashes": [{"hash": "h", "nmarq": [format!("o00406-{n}.bu")]}]}),
        );
    }
    authority.failing.insert(manifest_url("0002"));

    let tmp = tempfile::TempDir::new().unwrap();
    let (orch, _) = orchestrator(authority, tmp.path());
    let stats = orch.download_state(&request()).await.unwrap();
    assert_eq!(stats.sections_processed, 2);
    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn filters_and_sampling() {
    let mut authority = FakeAuthority::default();
    let names: Vec<String> = (1..=6).map(|i| format!("{i:04}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (url, page) = state_page(&refs);
    authority.pages.insert(url, page);
    for n in &names {
        authority.pages.insert(
            manifest_url(n),
            json!({"hashes": [{"hash": "h", "nmarq": [
                format!("o00406-{n}.bu"), format!("o00406-{n}.rdv"), format!("o00406-{n}.imgbu")
            ]}]}),
        );
    }
    let tmp = tempfile::TempDir::new().unwrap();
    let (orch, authority) = orchestrator(authority, tmp.path());

    let mut req = request();
    req.file_types = vec![".bu".to_string()];
    req.max_sections = Some(4);
    req.municipalities = vec!["brasília".to_string()];
    let stats = orch.download_state(&req).await.unwrap();
    assert_eq!(stats.sections_processed, 4);
    assert_eq!(stats.downloaded, 4);
    assert!(authority.downloads.lock().unwrap().iter().all(|u| u.ends_with(".bu")));

    let mut other_town = request();
    other_town.municipalities = vec!["GAMA".to_string()];
    let stats = orch.download_state(&other_town).await.unwrap();
    assert_eq!(stats.sections_processed, 0);
}

#[tokio::test]
async fn unpublished_state_yields_empty_stats() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (orch, _) = orchestrator(FakeAuthority::default(), tmp.path());
    let stats = orch.download_state(&request()).await.unwrap();
    assert_eq!(stats, Default::default());
}

#[tokio::test]
async fn shared_file_name_is_fetched_from_the_first_hash_group() {
    let mut authority = FakeAuthority::default();
    let (url, page) = state_page(&["0001"]);
    authority.pages.insert(url, page);
    authority.pages.insert(
        manifest_url("0001"),
        json!({"hashes": [
            {"hash": "aaa", "nmarq": ["o00406-9701200010001.bu", "o00406-9701200010001.logjez"]},
            {"hash": "bbb", "nmarq": ["o00406-9701200010001.bu"]}
        ]}),
    );
    let tmp = tempfile::TempDir::new().unwrap();
    let (orch, authority) = orchestrator(authority, tmp.path());

    let stats = orch.download_state(&request()).await.unwrap();
    assert_eq!(stats.downloaded, 2);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.errors, 0);

    let dest = SectionLayout::new(tmp.path())
        .section_dir(&section("0001"))
        .join("o00406-9701200010001.bu");
    let body = std::fs::read_to_string(dest).unwrap();
    assert!(body.ends_with("/aaa/o00406-9701200010001.bu"), "{body}");
    let urls = authority.downloads.lock().unwrap().clone();
    assert!(!urls.iter().any(|u| u.contains("/bbb/")));
}

#[tokio::test]
async fn concurrent_states_share_one_budget() {
    let mut authority = FakeAuthority::default();
    let names: Vec<String> = (1..=4).map(|i| format!("{i:04}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (url, page) = state_page(&refs);
    authority.pages.insert(url, page);
    for n in &names {
        authority.pages.insert(
            manifest_url(n),
            json!({"hashes": [{"hash": "h", "nmarq": [
                format!("o00406-{n}.bu"), format!("o00406-{n}.rdv")
            ]}]}),
        );
    }
    let tmp = tempfile::TempDir::new().unwrap();
    let (orch, authority) = orchestrator_with(authority, tmp.path(), 1);

    let mut ballots = request();
    ballots.file_types = vec![".bu".to_string()];
    let mut records = request();
    records.file_types = vec![".rdv".to_string()];
    let (a, b) = tokio::join!(orch.download_state(&ballots), orch.download_state(&records));
    assert_eq!(a.unwrap().downloaded, 4);
    assert_eq!(b.unwrap().downloaded, 4);
    assert_eq!(authority.peak.load(Ordering::SeqCst), 1);
}
