// crates/nextforge-runtime/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: License authority, artifact repository, and config fixtures.
// Purpose: Provide reusable provisioning fixtures for runtime tests.
// Dependencies: nextforge-config, nextforge-core, tempfile, tiny_http
// ============================================================================

//! ## Overview
//! [`MockLicense`] is a loopback license authority answering a script, then
//! granting. [`Fixture`] owns a temporary `file://` repository, an artifact
//! cache, and store directories, and renders configuration text around them.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use nextforge_config::NextforgeConfig;
use nextforge_core::ArtifactId;
use nextforge_core::DEFAULT_HASH_ALGORITHM;
use nextforge_core::hash_bytes;
use tempfile::TempDir;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: License Authority
// ============================================================================

/// Body returned once the script is exhausted.
const GRANTED: &str = r#"{"granted":true,"entitlements":["storage"]}"#;

/// Loopback license authority.
pub struct MockLicense {
    /// Verification endpoint.
    endpoint: String,
    /// Requests served.
    hits: Arc<AtomicUsize>,
    /// Stop flag for the server thread.
    stop: Arc<AtomicBool>,
    /// Server thread.
    handle: Option<JoinHandle<()>>,
}

impl MockLicense {
    /// Starts an authority answering `script` in order, then granting.
    pub fn start(script: Vec<(u16, &'static str)>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let endpoint = format!("http://{}/v1/verify", server.server_addr());
        let hits = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let hits = Arc::clone(&hits);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut script = script.into_iter();
                while !stop.load(Ordering::SeqCst) {
                    let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(20)) else {
                        continue;
                    };
                    hits.fetch_add(1, Ordering::SeqCst);
                    let (status, body) = script.next().unwrap_or((200, GRANTED));
                    let response = Response::from_string(body).with_status_code(status);
                    let _ = request.respond(response);
                }
            })
        };
        Self {
            endpoint,
            hits,
            stop,
            handle: Some(handle),
        }
    }

    /// Starts an authority that always grants.
    pub fn granting() -> Self {
        Self::start(Vec::new())
    }

    /// Returns the verification endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the number of requests served.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockLicense {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// SECTION: Fixture
// ============================================================================

/// Temporary repository, cache, and data directories.
pub struct Fixture {
    /// Root of every fixture directory.
    root: TempDir,
    /// Pins rendered into `[[artifacts.pins]]`.
    pins: Vec<(String, String)>,
}

impl Fixture {
    /// Creates empty fixture directories.
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("repo")).unwrap();
        Self {
            root,
            pins: Vec::new(),
        }
    }

    /// Returns a path beneath the fixture root.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Returns the artifact cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.path("cache")
    }

    /// Publishes `bytes` for `coordinate` and pins its real hash.
    pub fn publish(&mut self, coordinate: &str, bytes: &[u8]) {
        let sha256 = hash_bytes(DEFAULT_HASH_ALGORITHM, bytes).value;
        self.publish_with_pin(coordinate, bytes, &sha256);
    }

    /// Publishes `bytes` for `coordinate` and pins `sha256`.
    pub fn publish_with_pin(&mut self, coordinate: &str, bytes: &[u8], sha256: &str) {
        let id = ArtifactId::parse(coordinate).unwrap();
        let target = self.path("repo").join(id.relative_path());
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(target, bytes).unwrap();
        self.pins.push((coordinate.to_string(), sha256.to_string()));
    }

    /// Renders a configuration around `backend` (a `[backend]` table body).
    pub fn config_text(&self, license: &str, backend: &str) -> String {
        let mut text = format!(
            "[license]\nkey = \"NF-TEST-KEY\"\nendpoint = \"{license}\"\n\n\
             [artifacts]\ncache_dir = \"{cache}\"\nlib_dir = \"{lib}\"\n\n\
             [[artifacts.repositories]]\nid = \"local\"\nurl = \"file://{repo}\"\n\n",
            cache = self.cache_dir().display(),
            lib = self.path("lib").display(),
            repo = self.path("repo").display(),
        );
        for (coordinate, sha256) in &self.pins {
            let _ = write!(text, "[[artifacts.pins]]\ncoordinate = \"{coordinate}\"\nsha256 = \"{sha256}\"\n\n");
        }
        text.push_str("[backend]\n");
        text.push_str(backend);
        text.push_str(PLAYERS_COLLECTION);
        text
    }

    /// Parses a configuration around `backend`.
    pub fn config(&self, license: &str, backend: &str) -> NextforgeConfig {
        NextforgeConfig::from_toml_str(&self.config_text(license, backend)).unwrap()
    }
}

/// Collection declaration shared by every test configuration.
const PLAYERS_COLLECTION: &str = r#"

[[collections]]
collection = "players"
fields = [
    { name = "balance", type = "integer" },
    { name = "guild", type = "string", optional = true },
]
indexes = [
    { name = "by_balance", fields = ["balance"] },
    { name = "by_guild", fields = ["guild"] },
]
"#;

/// Returns the `h2` backend table for a database file under `dir`.
pub fn h2_backend(dir: &Path) -> String {
    format!("id = \"h2\"\noptions = {{ path = \"{}\" }}\n", dir.join("players.db").display())
}

/// Returns the `json` backend table for a store under `dir`.
pub fn json_backend(dir: &Path) -> String {
    format!("id = \"json\"\noptions = {{ directory = \"{}\" }}\n", dir.display())
}
