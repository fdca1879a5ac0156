//! Integration tests for the mirror engine.
//!
//! These tests drive a full crawl against an in-memory server:
//! - Tree reproduction and checksum verification on arrival
//! - Idempotent re-runs
//! - Self-healing of corrupt local or transferred archives
//! - Fail-fast aborts and resumption on the next run
//!
//! Run with: `cargo test --test mirror_integration`

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use md5::{Digest, Md5};
use tempfile::TempDir;

use rncs_mirror::{
    Credentials, MirrorError, MirrorResult, MismatchPolicy, RemoteTransport, TreeCrawler,
};

// ============================================================================
// Helper Functions
// ============================================================================

const ROOT: &str = "ftp://rncs.example/public/";

fn creds() -> Credentials {
    Credentials::new("anonymous", "guest")
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}

/// In-memory FTP server holding a tree of files under `ROOT`.
///
/// Listings are generated in the `ls -l` format served by vsftpd, sorted by
/// name.
#[derive(Default)]
struct FakeServer {
    files: BTreeMap<String, Vec<u8>>,
    corrupt: Mutex<HashMap<String, u32>>,
    failing: Mutex<HashSet<String>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeServer {
    fn new() -> Self {
        Self::default()
    }

    fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.insert(path.to_string(), data.to_vec());
        self
    }

    /// Add `name.zip` and its matching `name.md5`.
    fn with_pair(self, name: &str, data: &[u8]) -> Self {
        let digest = md5_hex(data);
        self.with_file(&format!("{}.zip", name), data)
            .with_file(&format!("{}.md5", name), digest.as_bytes())
    }

    /// Serve `path` with a flipped byte for the next `times` fetches.
    fn corrupt_next(&self, path: &str, times: u32) {
        self.corrupt.lock().unwrap().insert(path.to_string(), times);
    }

    fn fail(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    fn heal(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    /// Paths fetched since the last call.
    fn take_fetches(&self) -> Vec<String> {
        std::mem::take(&mut *self.fetches.lock().unwrap())
    }

    fn relative(url: &str) -> Option<&str> {
        url.strip_prefix(ROOT)
    }

    fn error(url: &str, reason: &str) -> MirrorError {
        MirrorError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl RemoteTransport for FakeServer {
    fn list(&self, url: &str, _credentials: &Credentials) -> MirrorResult<String> {
        let dir = Self::relative(url).ok_or_else(|| Self::error(url, "550 outside root"))?;

        let mut dirs = BTreeSet::new();
        let mut lines = Vec::new();
        for (path, data) in self.files.range(dir.to_string()..) {
            let Some(rest) = path.strip_prefix(dir) else {
                break;
            };
            match rest.split_once('/') {
                Some((sub, _)) => {
                    dirs.insert(sub.to_string());
                }
                None => lines.push(format!(
                    "-rw-r--r--    1 ftp      ftp      {:>8} Mar 14 09:26 {}",
                    data.len(),
                    rest
                )),
            }
        }
        if lines.is_empty() && dirs.is_empty() && !dir.is_empty() {
            return Err(Self::error(url, "550 no such directory"));
        }

        let mut payload = String::new();
        for sub in dirs {
            payload.push_str(&format!(
                "drwxr-xr-x    2 ftp      ftp          4096 Mar 14 09:26 {}\r\n",
                sub
            ));
        }
        for line in lines {
            payload.push_str(&line);
            payload.push_str("\r\n");
        }
        Ok(payload)
    }

    fn fetch(
        &self,
        url: &str,
        _credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> MirrorResult<u64> {
        let path = Self::relative(url).ok_or_else(|| Self::error(url, "550 outside root"))?;
        self.fetches.lock().unwrap().push(path.to_string());

        if self.failing.lock().unwrap().contains(path) {
            return Err(Self::error(url, "426 connection closed; transfer aborted"));
        }
        let mut data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Self::error(url, "550 no such file"))?;

        if let Some(remaining) = self.corrupt.lock().unwrap().get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                if let Some(first) = data.first_mut() {
                    *first ^= 0xff;
                }
            }
        }

        for chunk in data.chunks(3) {
            sink.write_all(chunk)
                .map_err(|_| Self::error(url, "transfer aborted by local writer"))?;
        }
        Ok(data.len() as u64)
    }
}

fn sample_server() -> FakeServer {
    FakeServer::new()
        .with_file("LISEZMOI.txt", b"Bilans saisis, format XML")
        .with_pair("2018/CA_20180101", b"first archive payload")
        .with_pair("2019/CA_20190101", b"second archive payload")
        .with_pair("2019/CA_20190102", b"third archive payload")
        .with_pair("2019/06/CA_20190601", b"nested archive payload")
}

fn assert_matches_server(server: &FakeServer, local: &Path) {
    for (path, data) in &server.files {
        let local_file = local.join(path);
        assert_eq!(
            fs::read(&local_file).unwrap_or_else(|e| panic!("{}: {}", local_file.display(), e)),
            *data,
            "content differs for {}",
            path
        );
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A first run reproduces the whole tree and verifies every pair.
#[test]
fn test_full_mirror_reproduces_tree() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    let crawler = TreeCrawler::new(&server);

    let report = crawler.mirror(ROOT, &creds(), temp.path()).unwrap();

    assert_matches_server(&server, temp.path());
    assert_eq!(report.directories, 4);
    assert_eq!(report.files(), 9);
    // Each `.md5` sorts before its `.zip`: the checksum waits, the archive verifies.
    assert_eq!(report.unverified, 4);
    assert_eq!(report.downloaded, 5);
    assert_eq!(report.recovered, 0);
}

/// Directories are mirrored depth-first, in listing order.
#[test]
fn test_traversal_order() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    let crawler = TreeCrawler::new(&server);

    crawler.mirror(ROOT, &creds(), temp.path()).unwrap();

    assert_eq!(
        server.take_fetches(),
        vec![
            "2018/CA_20180101.md5",
            "2018/CA_20180101.zip",
            "2019/06/CA_20190601.md5",
            "2019/06/CA_20190601.zip",
            "2019/CA_20190101.md5",
            "2019/CA_20190101.zip",
            "2019/CA_20190102.md5",
            "2019/CA_20190102.zip",
            "LISEZMOI.txt",
        ]
    );
}

/// A second run over an intact mirror transfers nothing.
#[test]
fn test_second_run_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    let crawler = TreeCrawler::new(&server);

    crawler.mirror(ROOT, &creds(), temp.path()).unwrap();
    server.take_fetches();

    let report = crawler.mirror(ROOT, &creds(), temp.path()).unwrap();

    assert!(server.take_fetches().is_empty());
    assert!(report.is_noop());
    assert_eq!(report.skipped, 4);
    assert_eq!(report.present, 5);
}

/// An archive damaged on disk is detected and fetched again with its checksum.
#[test]
fn test_corrupt_local_archive_is_repaired() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    let crawler = TreeCrawler::new(&server);
    crawler.mirror(ROOT, &creds(), temp.path()).unwrap();
    server.take_fetches();

    fs::write(temp.path().join("2019/CA_20190102.zip"), b"bit rot").unwrap();
    let report = crawler.mirror(ROOT, &creds(), temp.path()).unwrap();

    assert_eq!(report.recovered, 1);
    assert_eq!(
        server.take_fetches(),
        vec!["2019/CA_20190102.md5", "2019/CA_20190102.zip"]
    );
    assert_matches_server(&server, temp.path());
}

/// An archive corrupted in transit is fetched again under the default policy.
#[test]
fn test_transient_corruption_recovers() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    server.corrupt_next("2018/CA_20180101.zip", 1);
    let crawler = TreeCrawler::new(&server);

    let report = crawler.mirror(ROOT, &creds(), temp.path()).unwrap();

    assert_eq!(report.recovered, 1);
    assert_matches_server(&server, temp.path());
}

/// Persistent corruption stops the run after the configured number of attempts.
#[test]
fn test_persistent_corruption_exhausts_retries() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    server.corrupt_next("2018/CA_20180101.zip", u32::MAX);
    let crawler =
        TreeCrawler::new(&server).with_policy(MismatchPolicy::Retry { max_attempts: 2 });

    let err = crawler.mirror(ROOT, &creds(), temp.path()).unwrap_err();

    match err {
        MirrorError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("Expected RetriesExhausted, got {:?}", other),
    }
    assert!(!temp.path().join("2018/CA_20180101.zip").exists());
    assert!(!temp.path().join("2018/CA_20180101.md5").exists());
    assert!(!temp.path().join("2019").exists());
}

/// Under fail-stop a corrupt pair is removed and the next run fetches it again.
#[test]
fn test_fail_stop_then_next_run_heals() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    server.corrupt_next("2019/CA_20190101.zip", 1);
    let crawler = TreeCrawler::new(&server).with_policy(MismatchPolicy::FailStop);

    let err = crawler.mirror(ROOT, &creds(), temp.path()).unwrap_err();
    assert!(err.is_integrity());
    assert!(!temp.path().join("2019/CA_20190101.zip").exists());
    assert!(!temp.path().join("2019/CA_20190101.md5").exists());

    crawler.mirror(ROOT, &creds(), temp.path()).unwrap();
    assert_matches_server(&server, temp.path());
}

/// A transfer failure aborts the crawl; later siblings are untouched and the
/// next run picks up where the first one stopped.
#[test]
fn test_fail_fast_and_resume() {
    let temp = TempDir::new().unwrap();
    let server = sample_server();
    server.fail("2019/06/CA_20190601.zip");
    let crawler = TreeCrawler::new(&server);

    let err = crawler.mirror(ROOT, &creds(), temp.path()).unwrap_err();
    assert!(matches!(err, MirrorError::Transport { .. }));
    let first = server.take_fetches();
    assert_eq!(first.last().map(String::as_str), Some("2019/06/CA_20190601.zip"));
    assert!(!temp.path().join("2019/06/CA_20190601.zip").exists());
    assert!(!temp.path().join("2019/CA_20190101.md5").exists());
    assert!(!temp.path().join("LISEZMOI.txt").exists());

    server.heal("2019/06/CA_20190601.zip");
    crawler.mirror(ROOT, &creds(), temp.path()).unwrap();

    let second = server.take_fetches();
    assert!(!second.contains(&"2018/CA_20180101.zip".to_string()));
    assert!(second.contains(&"2019/06/CA_20190601.zip".to_string()));
    assert_matches_server(&server, temp.path());
}
