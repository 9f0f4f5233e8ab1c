//! Integration tests for the request/response correlator over an in-memory
//! backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use caption_client_core::environment::Clock;
use caption_client_testing::{FakeBackend, MemoryConnector, test_clock};
use caption_client_transport::{
    ChannelConfig, CorrelationId, Correlator, CorrelatorConfig, Frame, MessageType, Outcome,
    RequestError, TransportChannel, TransportError,
};
use futures::StreamExt;
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

async fn connected(timeout: Duration) -> (Arc<Correlator>, FakeBackend) {
    let (connector, backend) = MemoryConnector::pair();
    let channel = TransportChannel::new(Arc::new(connector), ChannelConfig::default());
    channel.connect().await.unwrap();
    let correlator = Correlator::with_clock(
        channel,
        CorrelatorConfig::default().with_request_timeout(timeout),
        Arc::new(test_clock()),
    );
    (Arc::new(correlator), backend)
}

/// Wait until `count` requests are registered.
async fn wait_for_pending(correlator: &Correlator, count: usize) {
    for _ in 0..200 {
        if correlator.pending_count() == count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {count} pending requests, found {}",
        correlator.pending_count()
    );
}

// ============================================================================
// Correlation
// ============================================================================

#[tokio::test]
async fn test_responses_in_reverse_order_reach_their_requests() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;

    let mut calls = Vec::new();
    for n in 0..5 {
        let correlator = Arc::clone(&correlator);
        calls.push(tokio::spawn(async move {
            let response = correlator
                .request(MessageType::GetBookings, json!({ "n": n }))
                .await
                .unwrap();
            (n, response)
        }));
    }

    let mut requests = Vec::new();
    for _ in 0..5 {
        requests.push(backend.expect_request(MessageType::GetBookings).await);
    }
    for request in requests.iter().rev() {
        backend.reply(request, 200, json!({ "echo": request.data["n"] }));
    }

    for call in calls {
        let (n, response) = call.await.unwrap();
        assert_eq!(response.data["echo"], json!(n));
    }
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_each_request_gets_a_unique_correlation_id() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;

    let first = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetUsers, json!({})).await }
    });
    let second = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetUsers, json!({})).await }
    });

    let a = backend.expect_request(MessageType::GetUsers).await;
    let b = backend.expect_request(MessageType::GetUsers).await;
    assert_ne!(a.correlation_id, b.correlation_id);

    backend.reply(&a, 200, json!({}));
    backend.reply(&b, 200, json!({}));
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_duplicate_response_settles_once() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetBillingList, json!({})).await }
    });
    let request = backend.expect_request(MessageType::GetBillingList).await;

    backend.reply(&request, 200, json!({ "first": true }));
    backend.reply(&request, 200, json!({ "first": false }));

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.data["first"], json!(true));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_unmatched_and_pushed_frames_are_ignored() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;
    let mut raw = correlator.channel().subscribe();

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetBookings, json!({})).await }
    });
    let request = backend.expect_request(MessageType::GetBookings).await;

    backend.push(Frame::push("sessionUpdated", json!({ "sessionId": 7 })));
    backend.push(Frame::response(
        "getBookings",
        CorrelationId::new(),
        200,
        json!({ "stray": true }),
    ));
    backend.reply(&request, 200, json!({ "bookings": [] }));

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.data, json!({ "bookings": [] }));

    // Other components still see the push on the raw channel
    let first = raw.next().await.unwrap();
    assert_eq!(first.message_type, "sessionUpdated");
    assert_eq!(first.correlation_id, None);
}

// ============================================================================
// Failure modes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out_and_is_evicted() {
    let (correlator, backend) = connected(Duration::from_millis(500)).await;
    let baseline = correlator.pending_count();

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetSessionsSummary, json!({})).await }
    });
    backend.expect_request(MessageType::GetSessionsSummary).await;
    assert_eq!(correlator.pending_count(), baseline + 1);

    let result = call.await.unwrap();

    assert!(matches!(
        result,
        Err(RequestError::Timeout { timeout_ms: 500, ref message_type }) if message_type == "getSessionsSummary"
    ));
    assert_eq!(correlator.pending_count(), baseline);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_after_timeout_is_ignored() {
    let (correlator, backend) = connected(Duration::from_millis(100)).await;

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetUsers, json!({})).await }
    });
    let request = backend.expect_request(MessageType::GetUsers).await;
    assert!(call.await.unwrap().is_err());

    backend.reply(&request, 200, json!({}));
    tokio::task::yield_now().await;
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_send_while_disconnected_fails_with_transport_error() {
    let (connector, _backend) = MemoryConnector::pair();
    let channel = TransportChannel::new(Arc::new(connector), ChannelConfig::default());
    let correlator = Correlator::new(channel, CorrelatorConfig::default());

    let result = correlator.request(MessageType::LogIn, json!({})).await;

    assert!(matches!(
        result,
        Err(RequestError::Transport(TransportError::NotConnected))
    ));
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn test_business_failure_resolves_ok_with_failure_outcome() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::LogIn, json!({ "email": "a@b.c" })).await }
    });
    let request = backend.expect_request(MessageType::LogIn).await;
    backend.reply_error(&request, 401, "invalid credentials");

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.code, 401);
    match response.outcome() {
        Outcome::Failure(error) => {
            assert_eq!(error.code, 401);
            assert_eq!(error.message, "invalid credentials");
        },
        Outcome::Success(_) => panic!("401 must not be a success"),
    }
}

#[tokio::test]
async fn test_cancelled_request_leaves_no_pending_entry() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::GetBookings, json!({})).await }
    });
    backend.expect_request(MessageType::GetBookings).await;
    wait_for_pending(&correlator, 1).await;

    call.abort();
    let _ = call.await;

    assert_eq!(correlator.pending_count(), 0);
}

// ============================================================================
// Inspection
// ============================================================================

#[tokio::test]
async fn test_pending_lists_in_flight_requests() {
    let (correlator, backend) = connected(Duration::from_secs(5)).await;

    let call = tokio::spawn({
        let c = Arc::clone(&correlator);
        async move { c.request(MessageType::ChangePassword, json!({})).await }
    });
    let request = backend.expect_request(MessageType::ChangePassword).await;

    let pending = correlator.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message_type, MessageType::ChangePassword);
    assert_eq!(Some(pending[0].correlation_id), request.correlation_id);
    assert_eq!(pending[0].created_at, test_clock().now());

    backend.reply(&request, 200, json!({}));
    call.await.unwrap().unwrap();
    assert!(correlator.pending().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_any_reply_order_matches_requests(order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let (correlator, backend) = connected(Duration::from_secs(5)).await;

            let calls: Vec<_> = (0..order.len())
                .map(|n| {
                    let c = Arc::clone(&correlator);
                    tokio::spawn(async move {
                        let response = c.request(MessageType::GetBookings, json!({ "n": n })).await.unwrap();
                        (n, response.data["n"].clone())
                    })
                })
                .collect();

            let mut requests = Vec::new();
            for _ in 0..order.len() {
                requests.push(backend.expect_request(MessageType::GetBookings).await);
            }
            for &i in &order {
                let request = &requests[i];
                backend.reply(request, 200, json!({ "n": request.data["n"] }));
            }

            for call in calls {
                let (n, echoed) = call.await.unwrap();
                assert_eq!(echoed, json!(n));
            }
            assert_eq!(correlator.pending_count(), 0);
        });
    }
}
