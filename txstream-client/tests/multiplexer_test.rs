//! Response correlation across concurrent callers, termination and drain.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use txstream_client::{
    Payload, Response, ResponseCollector, ResponseObserver, ResponseType, TransactionClient,
    TxStreamError,
};

/// Counts every response it receives, finishing after `parts` of them.
struct CountingCollector {
    seen: Arc<AtomicUsize>,
    types: Arc<std::sync::Mutex<Vec<ResponseType>>>,
    parts: usize,
}

impl ResponseCollector for CountingCollector {
    fn on_response(&mut self, response: Response) -> bool {
        self.types.lock().unwrap().push(response.response_type());
        let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        seen >= self.parts || !response.is_ok()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_receive_their_own_responses() {
    let client = client(2);
    let (client_io, server_io) = duplex();
    let server = spawn_server(server_io, echo);
    let tx = client.open_transaction(client_io).unwrap();

    let mut callers = Vec::new();
    for caller in 0..8 {
        let tx = tx.clone();
        callers.push(tokio::spawn(async move {
            for n in 0..50 {
                let sent = format!("caller-{caller}-request-{n}");
                let payload = tx.execute(request(sent.clone())).await.unwrap();
                assert_eq!(body(&payload), sent);
            }
        }));
    }
    for caller in callers {
        tokio::time::timeout(WAIT, caller).await.unwrap().unwrap();
    }

    tx.close();
    let served = tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(served, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pipelined_requests_resolve_in_order() {
    let client = client(1);
    let (client_io, server_io) = duplex();
    spawn_server(server_io, echo);
    let tx = client.open_transaction(client_io).unwrap();

    let pending: Vec<_> = (0..200)
        .map(|n| tx.single(request(format!("r{n}")), n % 7 != 0).unwrap())
        .collect();

    for (n, response) in pending.into_iter().enumerate() {
        let payload = tokio::time::timeout(WAIT, response.payload())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(body(&payload), format!("r{n}"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_multi_part_collector_finishes_on_done() {
    let client = client(1);
    let sink = RecordingSink::new();
    let (tx, listener) = client.open_with_sink(sink.clone()).unwrap();

    let parts = tx.parts(request("scan")).unwrap();
    let (after, after_rx) = txstream_client::SingleResponseCollector::new();
    listener.add_collector(after).unwrap();

    listener.on_next(Payload::new("part-1"));
    listener.on_next(Payload::new("part-2"));
    listener.on_next(Payload::new("part-3").with_done(true));
    listener.on_next(Payload::new("next-request"));

    let payloads = parts.collect().await.unwrap();
    let bodies: Vec<_> = payloads.iter().map(body).collect();
    assert_eq!(bodies, vec!["part-1", "part-2", "part-3"]);
    assert!(payloads[2].is_done());
    assert_eq!(body(&after_rx.payload().await.unwrap()), "next-request");
}

#[tokio::test(start_paused = true)]
async fn test_error_drains_active_and_queued_collectors() {
    let client = client(1);
    let (tx, listener) = client.open_with_sink(RecordingSink::new()).unwrap();

    let mut active = tx.parts(request("scan")).unwrap();
    let queued: Vec<_> = (0..4)
        .map(|n| tx.single(request(format!("q{n}")), true).unwrap())
        .collect();

    // One part makes the scan the active collector.
    listener.on_next(Payload::new("row"));
    listener.on_error(Arc::new(std::io::Error::other("connection reset")));

    assert!(active.next().await.unwrap().is_ok());
    let failed = active.next().await.unwrap();
    assert_eq!(failed.response_type(), ResponseType::Error);
    assert!(matches!(failed.ok(), Err(TxStreamError::Transport(_))));

    for response in queued {
        let err = response.payload().await.unwrap_err();
        match err {
            TxStreamError::Transport(cause) => assert_eq!(cause.to_string(), "connection reset"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(!tx.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_completion_is_delivered_once() {
    let client = client(1);
    let (_tx, listener) = client.open_with_sink(RecordingSink::new()).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let types = Arc::new(std::sync::Mutex::new(Vec::new()));
    for _ in 0..3 {
        listener
            .add_collector(CountingCollector {
                seen: Arc::clone(&seen),
                types: Arc::clone(&types),
                parts: 10,
            })
            .unwrap();
    }

    listener.on_completed();
    listener.on_completed();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert!(types
        .lock()
        .unwrap()
        .iter()
        .all(|t| *t == ResponseType::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_counting_collector_sees_parts_until_done() {
    let client = client(1);
    let (_tx, listener) = client.open_with_sink(RecordingSink::new()).unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let types = Arc::new(std::sync::Mutex::new(Vec::new()));
    listener
        .add_collector(CountingCollector {
            seen: Arc::clone(&seen),
            types: Arc::clone(&types),
            parts: 2,
        })
        .unwrap();
    let (next, next_rx) = txstream_client::SingleResponseCollector::new();
    listener.add_collector(next).unwrap();

    for part in ["a", "b", "c"] {
        listener.on_next(Payload::new(part));
    }

    assert_eq!(body(&next_rx.payload().await.unwrap()), "c");
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_response_terminates_stream() {
    let client = TransactionClient::new(
        txstream_client::ClientConfig::builder()
            .executor_count(1)
            .collector_wait_timeout(Duration::from_millis(50))
            .build()
            .unwrap(),
    );
    let (tx, listener) = client.open_with_sink(RecordingSink::new()).unwrap();

    listener.on_next(Payload::new("nobody asked"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(listener.is_terminated());
    assert!(!tx.is_open());
    assert!(matches!(
        tx.single(request("late"), true),
        Err(TxStreamError::ListenerTerminated)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_caller_does_not_shift_correlation() {
    let client = client(1);
    let (tx, listener) = client.open_with_sink(RecordingSink::new()).unwrap();

    let slow = tx.single(request("slow"), true).unwrap();
    let fast = tx.single(request("fast"), true).unwrap();

    let err = slow.get_timeout(Duration::from_millis(10)).await.unwrap_err();
    assert!(matches!(err, TxStreamError::Timeout(_)));

    // The abandoned collector still consumes the first response.
    listener.on_next(Payload::new("for-slow"));
    listener.on_next(Payload::new("for-fast"));
    assert_eq!(body(&fast.payload().await.unwrap()), "for-fast");
}

#[tokio::test(start_paused = true)]
async fn test_failed_immediate_write_fails_waiting_callers() {
    let client = client(1);
    let sink = FailingSink::failing_once();
    let (tx, listener) = client.open_with_sink(sink.clone()).unwrap();

    let queued = tx.single(request("queued"), true).unwrap();
    let err = tx.single(request("urgent"), false).unwrap_err();
    assert!(matches!(err, TxStreamError::Transport(_)));

    // Both requests were in the rejected batch.
    match queued.payload().await.unwrap_err() {
        TxStreamError::Transport(cause) => assert!(cause.to_string().contains("broken pipe")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(listener.is_terminated());
    assert!(!tx.is_open());
    assert!(matches!(
        tx.single(request("next"), false),
        Err(TxStreamError::ListenerTerminated)
    ));
    assert!(sink.requests().is_empty());
    assert!(sink.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_failed_batched_write_does_not_shift_correlation() {
    let client = client(1);
    let sink = FailingSink::failing_once();
    let (tx, listener) = client.open_with_sink(sink.clone()).unwrap();

    let first = tx.single(request("first"), true).unwrap();
    let second = tx.single(request("second"), true).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A response arriving now must not reach either caller.
    listener.on_next(Payload::new("stray"));
    for response in [first, second] {
        assert!(matches!(
            response.payload().await,
            Err(TxStreamError::Transport(_))
        ));
    }
    assert!(matches!(
        tx.single(request("third"), true),
        Err(TxStreamError::ListenerTerminated)
    ));
    assert!(sink.requests().is_empty());
}
