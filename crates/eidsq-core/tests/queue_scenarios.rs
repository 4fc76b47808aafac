//! End-to-end producer/consumer scenarios over a shared directory

use eidsq_core::io::{AtomicWriter, Clock, DropReason, MAX_DISAMBIGUATOR};
use eidsq_core::{
    DirectoryWatcher, Drainer, JsonCodec, Lifecycle, NotificationSource, NotificationWriter,
    QueueConfig, RawCodec, RawNotification, SinkError, UrlNotification, WatcherStatus,
    WriteOutcome,
};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

struct FixedClock(i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_single_notification_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let config = QueueConfig::new(temp_dir.path());

    let writer = NotificationWriter::new("producer", &config, RawCodec);
    writer.startup().unwrap();
    let outcome = writer.supply_encoded(&RawNotification::from("x"));
    assert!(outcome.is_written());

    let received = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&received);
    let drainer = Drainer::new("consumer", &config, RawCodec, move |n: RawNotification| {
        recorded.lock().unwrap().push(n.to_text());
        Ok::<(), SinkError>(())
    });

    assert_eq!(drainer.drain_once().unwrap(), 1);
    assert_eq!(*received.lock().unwrap(), vec!["x"]);
    assert!(entries(temp_dir.path()).is_empty());
}

#[test]
fn test_json_payload_round_trips_through_directory() {
    let temp_dir = TempDir::new().unwrap();
    let config = QueueConfig::new(temp_dir.path().join("queue"));
    config.prepare().unwrap();

    let notification: UrlNotification = serde_json::from_str(
        r#"{
            "id": {"source": "us", "type": "origin", "code": "us7000abcd", "updateTime": "2026-02-11T14:30:00Z"},
            "expirationDate": "2026-03-11T14:30:00Z",
            "trackerURL": "https://tracker.example.org/",
            "productURL": "https://example.org/product/us7000abcd",
            "signature": "abc"
        }"#,
    )
    .unwrap();

    let writer = NotificationWriter::new("producer", &config, JsonCodec::<UrlNotification>::new());
    assert!(writer.publish(&notification).is_written());

    let received = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&received);
    let drainer = Drainer::new(
        "consumer",
        &config,
        JsonCodec::<UrlNotification>::new(),
        move |n: UrlNotification| {
            recorded.lock().unwrap().push(n);
            Ok::<(), SinkError>(())
        },
    );
    assert_eq!(drainer.drain_once().unwrap(), 1);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].id, notification.id);
    assert_eq!(received[0].product_url, notification.product_url);
    assert_eq!(received[0].tracker_url, notification.tracker_url);
    assert_eq!(received[0].unknown_fields["signature"], "abc");
}

#[test]
fn test_exhausted_millisecond_drops_write() {
    let temp_dir = TempDir::new().unwrap();
    let config = QueueConfig::new(temp_dir.path());
    for n in 0..MAX_DISAMBIGUATOR {
        fs::write(temp_dir.path().join(format!("eids_7_{n}.xml")), "taken").unwrap();
    }

    let writer = AtomicWriter::new("producer", &config).with_clock(FixedClock(7));
    let outcome = writer.write(b"one too many");

    assert_eq!(
        outcome,
        WriteOutcome::Dropped {
            reason: DropReason::NoFreeName
        }
    );
    assert_eq!(entries(temp_dir.path()).len(), MAX_DISAMBIGUATOR as usize);
}

#[test]
fn test_burst_on_one_millisecond_drains_in_numeric_order() {
    let temp_dir = TempDir::new().unwrap();
    let config = QueueConfig::new(temp_dir.path());
    let writer = AtomicWriter::new("producer", &config).with_clock(FixedClock(42));

    for n in 0..12 {
        assert!(writer.write(format!("{n}").as_bytes()).is_written());
    }

    let received = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&received);
    let drainer = Drainer::new("consumer", &config, RawCodec, move |n: RawNotification| {
        recorded.lock().unwrap().push(n.to_text());
        Ok::<(), SinkError>(())
    });
    assert_eq!(drainer.drain_once().unwrap(), 12);

    let expected: Vec<String> = (0..12).map(|n| n.to_string()).collect();
    assert_eq!(*received.lock().unwrap(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watcher_delivers_concurrent_producers_exactly_once() {
    let temp_dir = TempDir::new().unwrap();
    let queue = temp_dir.path().join("queue");
    let done = temp_dir.path().join("done");
    let config = QueueConfig::new(&queue).with_processed_dir(&done);

    let received = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&received);
    let watcher = DirectoryWatcher::new(Drainer::new(
        "consumer",
        &config,
        RawCodec,
        move |n: RawNotification| {
            recorded.lock().unwrap().push(n.to_text());
            Ok::<(), SinkError>(())
        },
    ));
    watcher.startup().unwrap();

    let producers: Vec<_> = (0..4)
        .map(|p| {
            let config = config.clone();
            std::thread::spawn(move || {
                let writer = AtomicWriter::new(format!("producer-{p}"), &config);
                for n in 0..25 {
                    assert!(writer.write(format!("{p}-{n}").as_bytes()).is_written());
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut delivered = false;
    for _ in 0..200 {
        if received.lock().unwrap().len() >= 100 && entries(&done).len() == 100 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered, "only {} delivered", received.lock().unwrap().len());

    let handle = watcher.shutdown().unwrap();
    handle.await.unwrap();
    assert_eq!(watcher.status(), WatcherStatus::Stopped);

    let mut payloads = received.lock().unwrap().clone();
    payloads.sort();
    payloads.dedup();
    assert_eq!(payloads.len(), 100);
    assert_eq!(received.lock().unwrap().len(), 100);
    assert!(entries(&queue).is_empty());
}
