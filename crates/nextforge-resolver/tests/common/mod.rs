// crates/nextforge-resolver/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Scripted HTTP repositories and coordinate helpers.
// Purpose: Provide reusable fixtures for resolver integration tests.
// Dependencies: nextforge-core, tiny_http
// ============================================================================

//! ## Overview
//! [`MockRepository`] serves a fixed script of HTTP responses, then 404 for
//! every further request, and counts the requests it received.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;

use nextforge_core::ArtifactCoordinate;
use nextforge_core::ArtifactId;
use nextforge_core::DEFAULT_HASH_ALGORITHM;
use nextforge_core::hash_bytes;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Mock Repository
// ============================================================================

/// HTTP repository answering from a response script.
pub struct MockRepository {
    /// Base URL of the server.
    url: String,
    /// Number of requests served.
    hits: Arc<AtomicUsize>,
    /// Request paths in arrival order.
    paths: Arc<Mutex<Vec<String>>>,
    /// Stop flag for the server thread.
    stop: Arc<AtomicBool>,
    /// Server thread.
    handle: Option<JoinHandle<()>>,
}

impl MockRepository {
    /// Starts a server answering `script` in order, then 404.
    pub fn start(script: Vec<(u16, Vec<u8>)>) -> Self {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let url = format!("http://{}/repo/", server.server_addr());
        let hits = Arc::new(AtomicUsize::new(0));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let hits = Arc::clone(&hits);
            let paths = Arc::clone(&paths);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut script = script.into_iter();
                while !stop.load(Ordering::SeqCst) {
                    let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(20)) else {
                        continue;
                    };
                    hits.fetch_add(1, Ordering::SeqCst);
                    paths.lock().unwrap().push(request.url().to_string());
                    let (status, body) = script.next().unwrap_or((404, b"missing".to_vec()));
                    let response = Response::from_data(body).with_status_code(status);
                    request.respond(response).expect("respond");
                }
            })
        };
        Self {
            url,
            hits,
            paths,
            stop,
            handle: Some(handle),
        }
    }

    /// Starts a server that serves `body` once.
    pub fn serving(body: &[u8]) -> Self {
        Self::start(vec![(200, body.to_vec())])
    }

    /// Returns the repository base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the number of requests served.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Returns the request paths served.
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl Drop for MockRepository {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ============================================================================
// SECTION: Coordinate Helpers
// ============================================================================

/// Returns a coordinate for `group:name:version` pinned to `bytes`.
pub fn pinned(coordinate: &str, bytes: &[u8]) -> ArtifactCoordinate {
    ArtifactCoordinate::new(
        ArtifactId::parse(coordinate).unwrap(),
        hash_bytes(DEFAULT_HASH_ALGORITHM, bytes),
    )
}
