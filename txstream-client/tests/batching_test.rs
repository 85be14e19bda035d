//! Request batching: coalescing, bypass, ordering and close semantics.

mod common;

use std::time::Duration;

use common::*;
use txstream_client::{BatchConfigBuilder, ClientConfig, RequestBatcher, TxStreamError};

fn batcher(configure: impl FnOnce(BatchConfigBuilder) -> BatchConfigBuilder) -> RequestBatcher {
    let config = configure(BatchConfigBuilder::new().executor_count(1))
        .build()
        .unwrap();
    RequestBatcher::new(&config)
}

#[tokio::test(start_paused = true)]
async fn test_requests_within_one_window_share_one_send() {
    let client = client(1);
    let sink = RecordingSink::new();
    let (tx, _listener) = client.open_with_sink(sink.clone()).unwrap();

    for n in 0..100 {
        tx.single(request(format!("r{n}")), true).unwrap();
    }
    assert_eq!(sink.sends(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.sends(), 1);
    assert_eq!(sink.batch_sizes(), vec![100]);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_now_bypasses_batch_window() {
    let client = client(1);
    let sink = RecordingSink::new();
    let (tx, _listener) = client.open_with_sink(sink.clone()).unwrap();

    tx.single(request("urgent"), false).unwrap();
    assert_eq!(sink.sends(), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.sends(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transmission_follows_dispatch_order() {
    let batcher = batcher(|b| b);
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();

    dispatcher.dispatch(request("a")).unwrap();
    dispatcher.dispatch(request("b")).unwrap();
    dispatcher.dispatch_now(request("c")).unwrap();
    dispatcher.dispatch(request("d")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    dispatcher.dispatch_now(request("e")).unwrap();

    let sent: Vec<_> = sink
        .requests()
        .iter()
        .map(|r| String::from_utf8(r.body().to_vec()).unwrap())
        .collect();
    assert_eq!(sent, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(sink.batch_sizes(), vec![3, 1, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_after_close_is_rejected() {
    let batcher = batcher(|b| b);
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();

    batcher.close();
    assert!(sink.is_completed());

    let err = dispatcher.dispatch(request("too late")).unwrap_err();
    assert!(matches!(err, TxStreamError::ClientClosed));
    assert!(matches!(
        dispatcher.dispatch_now(request("too late")),
        Err(TxStreamError::ClientClosed)
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.sends(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_close_clears_pending_requests() {
    let batcher = batcher(|b| b);
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();

    dispatcher.dispatch(request("queued")).unwrap();
    batcher.close();
    batcher.close();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.sends(), 0);
    assert!(sink.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_client_shutdown_rejects_transactions() {
    let client = client(2);
    let sink = RecordingSink::new();
    let (tx, _listener) = client.open_with_sink(sink.clone()).unwrap();

    client.shutdown();
    assert!(!client.is_running());
    assert!(matches!(
        tx.single(request("x"), true),
        Err(TxStreamError::ClientClosed)
    ));
    assert!(matches!(
        client.open_with_sink(RecordingSink::new()),
        Err(TxStreamError::ClientClosed)
    ));
    assert_eq!(sink.sends(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_flush_respects_max_batch_size() {
    let batcher = batcher(|b| b.max_batch_size(10));
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();

    for n in 0..25 {
        dispatcher.dispatch(request(format!("r{n}"))).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sink.batch_sizes(), vec![10, 10, 5]);
    assert_eq!(sink.requests().len(), 25);
}

#[tokio::test(start_paused = true)]
async fn test_one_write_per_dispatcher_per_flush() {
    let batcher = batcher(|b| b);
    let first = RecordingSink::new();
    let second = RecordingSink::new();
    let a = batcher.dispatcher(first.clone()).unwrap();
    let b = batcher.dispatcher(second.clone()).unwrap();

    for n in 0..10 {
        a.dispatch(request(format!("a{n}"))).unwrap();
        b.dispatch(request(format!("b{n}"))).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(first.batch_sizes(), vec![10]);
    assert_eq!(second.batch_sizes(), vec![10]);
}

#[tokio::test(start_paused = true)]
async fn test_busy_executor_keeps_flushing() {
    let batcher = batcher(|b| {
        b.batch_window(Duration::from_millis(1))
            .sustained_batch_window(Duration::from_millis(3))
    });
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();

    for n in 0..5 {
        dispatcher.dispatch(request(format!("r{n}"))).unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sink.requests().len(), 5);
    assert!(sink.sends() < 5, "expected coalescing, got {:?}", sink.batch_sizes());
}

#[tokio::test]
async fn test_dispatchers_assigned_round_robin() {
    let config = ClientConfig::builder().executor_count(4).build().unwrap();
    let batcher = RequestBatcher::new(config.batch());

    let dispatchers: Vec<_> = (0..10)
        .map(|_| batcher.dispatcher(RecordingSink::new()).unwrap())
        .collect();
    assert_eq!(batcher.dispatcher_counts(), vec![3, 3, 2, 2]);

    dispatchers[0].close();
    assert_eq!(batcher.dispatcher_counts(), vec![2, 3, 2, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_closing_dispatcher_sends_queued_requests() {
    let batcher = batcher(|b| b);
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();

    dispatcher.dispatch(request("last words")).unwrap();
    dispatcher.close();

    assert_eq!(sink.sends(), 1);
    assert!(sink.is_completed());
    assert!(batcher.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_transaction_releases_its_dispatcher() {
    let batcher = batcher(|b| b);
    let sink = RecordingSink::new();
    let dispatcher = batcher.dispatcher(sink.clone()).unwrap();
    let other = batcher.dispatcher(RecordingSink::new()).unwrap();
    assert_eq!(batcher.dispatcher_counts(), vec![2]);

    dispatcher.dispatch(request("in flight")).unwrap();
    drop(dispatcher);

    assert_eq!(batcher.dispatcher_counts(), vec![1]);
    assert_eq!(sink.sends(), 1);
    assert!(sink.is_completed());
    assert_eq!(std::sync::Arc::strong_count(&sink), 1);
    assert!(!other.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_stream_completes_its_sink() {
    let client = client(1);
    let sink = RecordingSink::new();
    let (tx, listener) = client.open_with_sink(sink.clone()).unwrap();

    tx.single(request("last"), true).unwrap();
    drop(tx);
    drop(listener);

    assert_eq!(sink.sends(), 1);
    assert!(sink.is_completed());
    assert_eq!(std::sync::Arc::strong_count(&sink), 1);
}
