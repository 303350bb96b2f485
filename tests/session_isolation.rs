//! Session Isolation Tests
//!
//! A physical connection carries one caller's identity at a time:
//! - Every statement runs under the identity of the request that sent it
//! - Settings are cleared before a connection is reused
//! - A connection whose reset cannot be verified never returns to the pool

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use aerogate::config::GatewayConfig;
use aerogate::executor::{Row, SqlValue};
use aerogate::rest_api::{Method, RestApi, RestRequest};
use aerogate::schema::SchemaCache;

use common::{app_schema, FakePool, StaticAuth, CLAIMS};

// =============================================================================
// Helper Functions
// =============================================================================

/// Answers every read with the claims the session carried at that moment
fn echo_claims_pool(size: usize) -> FakePool {
    FakePool::with_responder(size, |call| {
        Ok(vec![Row::new().with("seen", SqlValue::Text(call.claims().to_string()))])
    })
}

fn gateway(pool: &FakePool, config: GatewayConfig) -> RestApi {
    RestApi::new(
        config,
        SchemaCache::new(app_schema(1)),
        Arc::new(StaticAuth),
        Arc::new(pool.clone()),
    )
}

fn read_as(token: Option<&str>) -> RestRequest {
    let req = RestRequest::new(Method::Get, "todos");
    match token {
        Some(token) => req.with_token(token),
        None => req,
    }
}

fn seen_claims(data: &Value) -> Value {
    let raw = data[0]["seen"].as_str().unwrap_or_default();
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

// =============================================================================
// Sequential Reuse
// =============================================================================

/// Alice then an anonymous caller on one connection: nothing of Alice survives.
#[tokio::test]
async fn test_identity_does_not_leak_to_next_borrower() {
    let pool = echo_claims_pool(1);
    let api = gateway(&pool, GatewayConfig::default());
    let cancel = CancellationToken::new();

    let alice = api.handle(read_as(Some("token-alice")), &cancel).await;
    assert_eq!(seen_claims(alice.data().unwrap())["sub"], "alice");

    let anon = api.handle(read_as(None), &cancel).await;
    let claims = seen_claims(anon.data().unwrap());
    assert_eq!(claims["role"], "anon");
    assert!(claims.get("sub").is_none());

    let calls = pool.app_calls();
    assert_eq!(calls[0].connection_id, calls[1].connection_id);
    assert_eq!(calls[1].settings.get("request.jwt.claim.sub").map(String::as_str), Some(""));
    assert_eq!(pool.released(), 2);
}

/// After release every setting the binder touched is back to its reset state.
#[tokio::test]
async fn test_settings_cleared_on_release() {
    let pool = echo_claims_pool(1);
    let api = gateway(&pool, GatewayConfig::default());

    api.handle(read_as(Some("token-bob")), &CancellationToken::new()).await;

    let id = pool.app_calls()[0].connection_id;
    let settings = pool.settings_of(id).unwrap();
    assert_eq!(settings.get(CLAIMS).map(String::as_str), Some(""));
    assert_eq!(settings.get("request.jwt.claim.role").map(String::as_str), Some(""));
    assert!(settings.get("statement_timeout").is_none());
    assert!(settings.get("role").is_none());
}

/// Without role switching the session role is never set or reset.
#[tokio::test]
async fn test_role_switch_disabled() {
    let pool = echo_claims_pool(1);
    let config = GatewayConfig {
        switch_role: false,
        ..GatewayConfig::default()
    };
    let api = gateway(&pool, config);

    api.handle(read_as(Some("token-bob")), &CancellationToken::new()).await;

    let calls = pool.all_calls();
    assert!(calls.iter().all(|c| c.sql != "RESET ROLE"));
    assert!(pool.app_calls()[0].settings.get("role").is_none());
}

// =============================================================================
// Concurrent Requests
// =============================================================================

/// Interleaved callers sharing a small pool each see only their own claims.
#[tokio::test]
async fn test_concurrent_requests_see_own_identity() {
    let pool = echo_claims_pool(2).with_delay(Duration::from_millis(5));
    let api = gateway(&pool, GatewayConfig::default());
    let cancel = CancellationToken::new();

    let subjects: Vec<String> = (0..24).map(|i| format!("user{}", i % 6)).collect();
    let responses = join_all(subjects.iter().map(|s| {
        let req = read_as(Some(&format!("token-{}", s)));
        api.handle(req, &cancel)
    }))
    .await;

    for (subject, response) in subjects.iter().zip(&responses) {
        let claims = seen_claims(response.data().unwrap());
        assert_eq!(claims["sub"].as_str(), Some(subject.as_str()));
    }

    let connections: std::collections::HashSet<u64> =
        pool.app_calls().iter().map(|c| c.connection_id).collect();
    assert!(connections.len() <= 2);
    assert_eq!(pool.released(), 24);
    assert_eq!(pool.discarded(), 0);
}

// =============================================================================
// Failed Reset
// =============================================================================

/// Claims still visible after reset: the connection is destroyed, not reused.
#[tokio::test]
async fn test_unverified_reset_discards_connection() {
    let pool = echo_claims_pool(1);
    pool.break_reset();
    let api = gateway(&pool, GatewayConfig::default());
    let cancel = CancellationToken::new();

    let first = api.handle(read_as(Some("token-alice")), &cancel).await;
    assert!(first.is_ok());
    assert_eq!(pool.discarded(), 1);
    assert_eq!(pool.released(), 0);

    let second = api.handle(read_as(None), &cancel).await;
    assert!(seen_claims(second.data().unwrap()).get("sub").is_none());

    let calls = pool.app_calls();
    assert_ne!(calls[0].connection_id, calls[1].connection_id);
}

/// A request dropped while its session is being reset never hands the
/// connection to the next borrower.
#[tokio::test]
async fn test_drop_during_reset_discards_connection() {
    let pool = echo_claims_pool(1).with_reset_delay(Duration::from_millis(300));
    pool.recycle_dropped();
    let api = gateway(&pool, GatewayConfig::default());
    let cancel = CancellationToken::new();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        api.handle(read_as(Some("token-alice")), &cancel),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(pool.discarded(), 1);
    assert_eq!(pool.released(), 0);

    let next = api.handle(read_as(None), &cancel).await;
    let claims = seen_claims(next.data().unwrap());
    assert_eq!(claims["role"], "anon");
    assert!(claims.get("sub").is_none());

    let calls = pool.app_calls();
    assert_ne!(calls[0].connection_id, calls[1].connection_id);
}

/// A failed statement still resets the session before reuse.
#[tokio::test]
async fn test_statement_failure_resets_session() {
    let pool = FakePool::with_responder(1, |call| {
        if call.claims().contains("\"sub\":\"mallory\"") {
            Err(aerogate::executor::DriverError::database("42501", "permission denied"))
        } else {
            Ok(vec![Row::new().with("seen", SqlValue::Text(call.claims().to_string()))])
        }
    });
    let api = gateway(&pool, GatewayConfig::default());
    let cancel = CancellationToken::new();

    let denied = api.handle(read_as(Some("token-mallory")), &cancel).await;
    assert_eq!(denied.error().unwrap().code, "PERMISSION_DENIED");

    let next = api.handle(read_as(None), &cancel).await;
    assert_eq!(seen_claims(next.data().unwrap())["role"], "anon");
    assert_eq!(pool.released(), 2);
}
