mod helpers;

use helpers::{collector, receive, setup_queue, FaultyStore, DEFAULT_DB, ONE_SECOND, QUEUE};
use relq_store::{ListStore, MemoryListStore, StoreError};
use relq_worker::{ConsumerError, InstanceIdentity, ReliableQueue};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn backup_list_is_emptied_after_success() {
    let t = setup_queue();
    t.queue.push_text(DEFAULT_DB, QUEUE, "test-value1").await.unwrap();
    t.queue.push_text(DEFAULT_DB, QUEUE, "test-value2").await.unwrap();

    let (callback, mut rx) = collector::<String>();
    t.queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, callback)
        .unwrap();
    assert_eq!(receive(&mut rx, 2, WAIT).await.len(), 2);

    let outcome = t.queue.stop(DEFAULT_DB, QUEUE).unwrap().await;

    assert!(outcome.is_stopped());
    assert!(t.backup_contents(QUEUE).await.is_empty());
    assert!(t.queue.backup_items(DEFAULT_DB, QUEUE).await.unwrap().is_empty());
    assert_eq!(t.store.len(DEFAULT_DB, QUEUE), 0);
}

/// A failing callback leaves exactly the failing item in the backup list; later items
/// stay in the source queue.
#[tokio::test]
async fn failed_item_is_retained_in_backup_list() {
    let t = setup_queue();
    t.queue.push_text(DEFAULT_DB, QUEUE, "test-value1").await.unwrap();
    t.queue.push_text(DEFAULT_DB, QUEUE, "test-value2").await.unwrap();

    let completion = t
        .queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |_| {
            Err(anyhow::anyhow!("processing failed"))
        })
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    assert!(matches!(outcome.error(), Some(ConsumerError::Callback { .. })));
    assert_eq!(t.backup_contents(QUEUE).await, vec!["test-value1"]);
    assert_eq!(
        t.queue.backup_items_text(DEFAULT_DB, QUEUE).await.unwrap(),
        vec!["test-value1"]
    );
    assert_eq!(t.store.len(DEFAULT_DB, QUEUE), 1);
}

/// Items that succeed before a failure are acknowledged; only the failing one is kept.
#[tokio::test]
async fn only_the_failing_item_is_retained() {
    let t = setup_queue();
    for value in ["ok-1", "ok-2", "bad", "after"] {
        t.queue.push_text(DEFAULT_DB, QUEUE, value).await.unwrap();
    }

    let completion = t
        .queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |value| {
            if value == "bad" {
                anyhow::bail!("cannot handle {value}");
            }
            Ok(())
        })
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    let err = outcome.error().unwrap();
    assert!(err.to_string().contains("cannot handle bad"));
    assert_eq!(t.backup_contents(QUEUE).await, vec!["bad"]);
    assert_eq!(
        t.queue.pop_text(DEFAULT_DB, QUEUE, ONE_SECOND).await.unwrap(),
        Some("after".to_string())
    );
}

#[tokio::test]
async fn panicking_callback_is_a_failure_and_keeps_the_item() {
    let t = setup_queue();
    t.queue.push_text(DEFAULT_DB, QUEUE, "explosive").await.unwrap();

    let completion = t
        .queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |value| {
            panic!("callback blew up on {value}")
        })
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    match outcome.error() {
        Some(ConsumerError::CallbackPanicked { message, .. }) => {
            assert_eq!(message, "callback blew up on explosive");
        }
        other => panic!("expected a panic failure, got {other:?}"),
    }
    assert_eq!(t.backup_contents(QUEUE).await, vec!["explosive"]);
}

#[tokio::test]
async fn invalid_utf8_on_text_consumer_keeps_the_item() {
    let t = setup_queue();
    t.queue.push(DEFAULT_DB, QUEUE, &[0xc3, 0x28]).await.unwrap();

    let completion = t
        .queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |_| Ok(()))
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    assert!(matches!(outcome.error(), Some(ConsumerError::Decode { .. })));
    assert_eq!(
        t.queue.backup_items(DEFAULT_DB, QUEUE).await.unwrap(),
        vec![vec![0xc3, 0x28]]
    );
}

/// Closing the store while the consumer waits on an empty queue cancels the loop.
#[tokio::test]
async fn closed_store_cancels_consumer() {
    let t = setup_queue();
    let completion = t
        .queue
        .start(DEFAULT_DB, QUEUE, 0, |_| Ok(()))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    t.store.close();

    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();
    assert!(outcome.is_cancelled());
    assert!(outcome.into_result().is_ok());
}

#[tokio::test]
async fn failed_acknowledgement_keeps_item_in_backup_list() {
    let store = Arc::new(FaultyStore::new());
    let queue = ReliableQueue::with_identity(store.clone(), InstanceIdentity::new("test-host", "1"));
    store.fail_acks();
    queue.push_text(DEFAULT_DB, QUEUE, "processed").await.unwrap();

    let (callback, mut rx) = collector::<String>();
    let completion = queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, callback)
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    // The callback saw the item, but the acknowledgement never happened.
    assert_eq!(receive(&mut rx, 1, WAIT).await, vec!["processed"]);
    match outcome.error() {
        Some(ConsumerError::Store {
            operation, source, ..
        }) => {
            assert_eq!(*operation, "pop_tail");
            assert!(matches!(source, StoreError::Connection(_)));
        }
        other => panic!("expected a store failure, got {other:?}"),
    }
    assert_eq!(
        store
            .inner()
            .range(DEFAULT_DB, "test-host:1:test:queue", 0, -1)
            .await
            .unwrap(),
        vec![b"processed".to_vec()]
    );
}

/// Two instances sharing a store each get their own backup list.
#[tokio::test]
async fn identities_on_a_shared_store_use_separate_backup_lists() {
    let store = Arc::new(MemoryListStore::new());
    let first = ReliableQueue::with_identity(store.clone(), InstanceIdentity::new("host-a", "1"));
    let second = ReliableQueue::with_identity(store.clone(), InstanceIdentity::new("host-b", "1"));

    first.push_text(DEFAULT_DB, QUEUE, "one").await.unwrap();
    let completion = first
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |_| anyhow::bail!("keep it"))
        .unwrap();
    tokio::time::timeout(WAIT, completion).await.unwrap();

    second.push_text(DEFAULT_DB, QUEUE, "two").await.unwrap();
    let completion = second
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |_| anyhow::bail!("keep it too"))
        .unwrap();
    tokio::time::timeout(WAIT, completion).await.unwrap();

    assert_eq!(
        first.backup_items_text(DEFAULT_DB, QUEUE).await.unwrap(),
        vec!["one"]
    );
    assert_eq!(
        second.backup_items_text(DEFAULT_DB, QUEUE).await.unwrap(),
        vec!["two"]
    );
    assert_eq!(store.len(DEFAULT_DB, "host-a:1:test:queue"), 1);
    assert_eq!(store.len(DEFAULT_DB, "host-b:1:test:queue"), 1);
}

#[tokio::test]
async fn backup_items_without_consumer_is_rejected() {
    let t = setup_queue();
    assert!(t.queue.backup_items(DEFAULT_DB, QUEUE).await.is_err());
}

#[tokio::test]
async fn failed_move_faults_without_touching_the_queue() {
    let store = Arc::new(FaultyStore::new());
    let queue = ReliableQueue::with_identity(store.clone(), InstanceIdentity::new("test-host", "1"));
    queue.push_text(DEFAULT_DB, QUEUE, "waiting").await.unwrap();
    store.fail_moves();

    let (callback, mut rx) = collector::<String>();
    let completion = queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, callback)
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    match outcome.error() {
        Some(ConsumerError::Store {
            operation, source, ..
        }) => {
            assert_eq!(*operation, "blocking_move_tail_to_head");
            assert!(matches!(source, StoreError::Connection(_)));
        }
        other => panic!("expected a store failure, got {other:?}"),
    }
    assert!(rx.try_recv().is_err());
    assert_eq!(store.inner().len(DEFAULT_DB, QUEUE), 1);
    assert_eq!(store.inner().len(DEFAULT_DB, "test-host:1:test:queue"), 0);
}

/// A cancelled acknowledgement is reported as cancellation; the item stays recoverable.
#[tokio::test]
async fn cancelled_acknowledgement_resolves_cancelled() {
    let store = Arc::new(FaultyStore::new());
    let queue = ReliableQueue::with_identity(store.clone(), InstanceIdentity::new("test-host", "1"));
    store.cancel_acks();
    queue.push_text(DEFAULT_DB, QUEUE, "processed").await.unwrap();

    let completion = queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, |_| Ok(()))
        .unwrap();
    let outcome = tokio::time::timeout(WAIT, completion).await.unwrap();

    assert!(outcome.is_cancelled());
    assert!(outcome.error().is_none());
    assert_eq!(store.inner().len(DEFAULT_DB, "test-host:1:test:queue"), 1);
}

/// A stop requested while the callback runs lets that item finish and be acknowledged,
/// then ends the loop without popping the next item.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_processing_finishes_the_current_item() {
    let t = setup_queue();
    t.queue.push_text(DEFAULT_DB, QUEUE, "first").await.unwrap();
    t.queue.push_text(DEFAULT_DB, QUEUE, "second").await.unwrap();

    let (entered_tx, entered_rx) = std::sync::mpsc::channel::<String>();
    let (resume_tx, resume_rx) = std::sync::mpsc::channel::<()>();
    let completion = t
        .queue
        .start_text(DEFAULT_DB, QUEUE, ONE_SECOND, move |item| {
            let _ = entered_tx.send(item);
            resume_rx.recv_timeout(WAIT)?;
            Ok(())
        })
        .unwrap();

    let item = tokio::task::spawn_blocking(move || entered_rx.recv_timeout(WAIT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item, "first");

    let stopping = t.queue.stop(DEFAULT_DB, QUEUE).unwrap();
    resume_tx.send(()).unwrap();
    let outcome = tokio::time::timeout(WAIT, stopping).await.unwrap();

    assert!(outcome.is_stopped());
    assert!(completion.await.is_stopped());
    assert!(t.backup_contents(QUEUE).await.is_empty());
    assert_eq!(t.store.len(DEFAULT_DB, QUEUE), 1);
    assert_eq!(
        t.queue.pop_text(DEFAULT_DB, QUEUE, ONE_SECOND).await.unwrap(),
        Some("second".to_string())
    );
}
