// SPDX-License-Identifier: Apache-2.0

//! Persistence tests for the filesystem swap manager.

use std::fs;

use ffq_queue::SwapError;
use ffq_queue::flowfile::FlowFileRecord;
use ffq_queue::swap::SwapManager;
use ffq_queue::testing::TestRecord;
use ffq_swap_file::FileSwapManager;

fn manager(dir: &tempfile::TempDir) -> FileSwapManager<TestRecord> {
    FileSwapManager::new(dir.path()).expect("swap directory should be created")
}

fn batch(ids: std::ops::RangeInclusive<u64>) -> Vec<TestRecord> {
    ids.map(|id| {
        TestRecord::new(id, 10)
            .with_claim("default", "1", format!("res-{id}"), id * 10)
            .with_attribute("filename", format!("file-{id}"))
    })
    .collect()
}

#[test]
fn roundtrip_restores_identical_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let records = batch(1..=25);
    let location = swap.swap_out(&records, "q-a").expect("swap out");

    let summary = swap.swap_summary(&location).expect("summary");
    assert_eq!(summary.record_count, 25);
    assert_eq!(summary.record_bytes, 250);
    assert_eq!(summary.max_record_id, Some(25));

    // Reading the summary must not consume the batch.
    let restored = swap.swap_in(&location, "q-a").expect("swap in");
    assert_eq!(restored, records);

    // A consumed location is gone, file and all.
    assert!(matches!(
        swap.swap_in(&location, "q-a"),
        Err(SwapError::NotFound { .. })
    ));
}

#[test]
fn recovery_lists_batches_in_persistence_order_per_queue() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let l1 = swap.swap_out(&batch(1..=5), "q-a").expect("first batch");
    let l2 = swap.swap_out(&batch(6..=10), "q-a").expect("second batch");
    let _other = swap.swap_out(&batch(11..=15), "q-b").expect("other queue");

    let recovered = swap.recover_swap_locations("q-a").expect("recover");
    assert_eq!(recovered, vec![l1, l2]);

    let other = swap.recover_swap_locations("q-b").expect("recover other");
    assert_eq!(other.len(), 1);
}

#[test]
fn recovery_survives_process_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let locations = {
        let swap = manager(&dir);
        let l1 = swap.swap_out(&batch(1..=5), "q-a").expect("first batch");
        let l2 = swap.swap_out(&batch(6..=10), "q-a").expect("second batch");
        vec![l1, l2]
    };

    // A fresh manager over the same directory sees the same batches in the
    // same order.
    let swap = manager(&dir);
    let recovered = swap.recover_swap_locations("q-a").expect("recover");
    assert_eq!(recovered, locations);

    let restored = swap.swap_in(&recovered[0], "q-a").expect("swap in");
    assert_eq!(
        restored.iter().map(FlowFileRecord::id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
}

#[test]
fn flipped_byte_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let location = swap.swap_out(&batch(1..=5), "q-a").expect("swap out");
    let mut bytes = fs::read(location.as_str()).expect("read swap file");
    let index = bytes.len() / 2;
    bytes[index] ^= 0xFF;
    fs::write(location.as_str(), &bytes).expect("rewrite swap file");

    assert!(matches!(
        swap.swap_in(&location, "q-a"),
        Err(SwapError::Corrupt { .. })
    ));
}

#[test]
fn truncated_file_is_reported_as_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let location = swap.swap_out(&batch(1..=5), "q-a").expect("swap out");
    let bytes = fs::read(location.as_str()).expect("read swap file");
    fs::write(location.as_str(), &bytes[..bytes.len() / 3]).expect("truncate swap file");

    assert!(matches!(
        swap.swap_in(&location, "q-a"),
        Err(SwapError::Corrupt { .. })
    ));
}

#[test]
fn batch_for_another_queue_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let location = swap.swap_out(&batch(1..=5), "q-a").expect("swap out");
    assert!(matches!(
        swap.swap_in(&location, "q-b"),
        Err(SwapError::Corrupt { .. })
    ));
}

#[test]
fn recovery_removes_leftover_partial_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let _location = swap.swap_out(&batch(1..=5), "q-a").expect("swap out");
    let stray = dir.path().join("00000000000000000001-00000000-deadbeef-x.swap.part");
    fs::write(&stray, b"torn write").expect("create stray partial file");

    let recovered = swap.recover_swap_locations("q-a").expect("recover");
    assert_eq!(recovered.len(), 1);
    assert!(!stray.exists());
}

#[test]
fn purge_removes_all_swap_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let swap = manager(&dir);

    let _a = swap.swap_out(&batch(1..=5), "q-a").expect("swap out a");
    let _b = swap.swap_out(&batch(6..=10), "q-b").expect("swap out b");
    swap.purge();

    assert!(swap.recover_swap_locations("q-a").expect("recover a").is_empty());
    assert!(swap.recover_swap_locations("q-b").expect("recover b").is_empty());
    let remaining: Vec<_> = fs::read_dir(dir.path())
        .expect("list dir")
        .flatten()
        .collect();
    assert!(remaining.is_empty());
}
