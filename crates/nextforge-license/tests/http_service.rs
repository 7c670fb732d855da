// crates/nextforge-license/tests/http_service.rs
// ============================================================================
// Module: License Service HTTP Tests
// Description: License gate against a loopback license authority.
// Purpose: Validate wire mapping, retry, and denial behavior over HTTP.
// Dependencies: nextforge-license, nextforge-core, tiny_http
// ============================================================================

//! ## Overview
//! Runs [`nextforge_license::LicenseGate`] over [`HttpLicenseService`]
//! against scripted `tiny_http` servers.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use nextforge_core::BackoffPolicy;
use nextforge_core::RecordingSleeper;
use nextforge_license::HttpLicenseService;
use nextforge_license::LicenseError;
use nextforge_license::LicenseGate;
use nextforge_license::LicenseKey;
use nextforge_license::LicenseService;
use nextforge_license::LicenseVerdict;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Starts a server answering `script` in order and recording request bodies.
fn serve(script: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>, JoinHandle<()>) {
    let server = Server::http("127.0.0.1:0").expect("http server");
    let endpoint = format!("http://{}/v1/verify", server.server_addr());
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&bodies);
    let handle = std::thread::spawn(move || {
        for (status, body) in script {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let mut received = String::new();
            request.as_reader().read_to_string(&mut received).unwrap();
            recorded.lock().unwrap().push(received);
            request.respond(Response::from_string(body).with_status_code(status)).unwrap();
        }
    });
    (endpoint, bodies, handle)
}

/// Builds an HTTP service for `endpoint`.
fn service(endpoint: &str) -> Arc<HttpLicenseService> {
    Arc::new(HttpLicenseService::new(endpoint, "nextforge-core", Duration::from_secs(5)).unwrap())
}

/// Builds a gate with a recording sleeper.
fn gate(endpoint: &str, attempts: u32, sleeper: &RecordingSleeper) -> LicenseGate {
    LicenseGate::new(
        service(endpoint),
        BackoffPolicy::new(attempts, Duration::from_millis(200), Duration::from_secs(2)),
    )
    .with_sleeper(Arc::new(sleeper.clone()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Tests three unavailable answers followed by a grant.
#[test]
fn unavailable_three_times_then_granted() {
    let (endpoint, bodies, handle) = serve(vec![
        (503, ""),
        (503, ""),
        (503, ""),
        (200, r#"{"granted": true, "entitlements": ["storage", "mongo"]}"#),
    ]);
    let sleeper = RecordingSleeper::new();

    let grant = gate(&endpoint, 5, &sleeper).verify(&LicenseKey::new("KEY-1")).unwrap();

    handle.join().unwrap();
    assert_eq!(grant.attempts(), 4);
    assert!(grant.has("mongo"));
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_millis(200), Duration::from_millis(400), Duration::from_millis(800)]
    );
    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 4);
    let request: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(request["key"], "KEY-1");
    assert_eq!(request["product"], "nextforge-core");
}

/// Tests an explicit denial is not retried.
#[test]
fn denial_body_is_terminal() {
    let (endpoint, bodies, handle) = serve(vec![(200, r#"{"granted": false, "reason": "expired"}"#)]);
    let sleeper = RecordingSleeper::new();

    let err = gate(&endpoint, 5, &sleeper).verify(&LicenseKey::new("KEY-1")).unwrap_err();

    handle.join().unwrap();
    assert_eq!(
        err,
        LicenseError::Denied {
            reason: "expired".to_string()
        }
    );
    assert_eq!(bodies.lock().unwrap().len(), 1);
    assert!(sleeper.delays().is_empty());
}

/// Tests client-error statuses map to denial.
#[test]
fn forbidden_status_is_denied() {
    let (endpoint, _bodies, handle) = serve(vec![(403, r#"{"granted": false, "reason": "revoked"}"#)]);
    let verdict = service(&endpoint).verify(&LicenseKey::new("KEY-1"));
    handle.join().unwrap();
    assert_eq!(
        verdict,
        LicenseVerdict::Denied {
            reason: "revoked".to_string()
        }
    );
}

/// Tests malformed bodies are treated as unavailable.
#[test]
fn malformed_body_is_unavailable() {
    let (endpoint, _bodies, handle) = serve(vec![(200, "<html>maintenance</html>")]);
    let verdict = service(&endpoint).verify(&LicenseKey::new("KEY-1"));
    handle.join().unwrap();
    assert!(matches!(verdict, LicenseVerdict::ServiceUnavailable { .. }));
}

/// Tests an unreachable authority fails closed after the attempt budget.
#[test]
fn unreachable_service_fails_closed() {
    let server = Server::http("127.0.0.1:0").unwrap();
    let endpoint = format!("http://{}/v1/verify", server.server_addr());
    drop(server);
    let sleeper = RecordingSleeper::new();

    let err = gate(&endpoint, 3, &sleeper).verify(&LicenseKey::new("KEY-1")).unwrap_err();

    assert!(matches!(err, LicenseError::ServiceUnavailable { attempts: 3, .. }));
    assert_eq!(sleeper.delays().len(), 2);
}
