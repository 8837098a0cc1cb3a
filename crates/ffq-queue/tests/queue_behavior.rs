// SPDX-License-Identifier: Apache-2.0

//! End-to-end behavior tests for the flow file queue, driven through the
//! in-memory collaborator doubles.

use std::cmp::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ffq_config::{QueueSettings, SwapCorruptionPolicy};
use ffq_queue::drop_request::{DropRequest, DropRequestState};
use ffq_queue::flowfile::now_millis;
use ffq_queue::prioritizer::FlowFilePrioritizer;
use ffq_queue::queue::{FilterDecision, FlowFileQueue};
use ffq_queue::reporting::Severity;
use ffq_queue::swap::SwapManager;
use ffq_queue::testing::{TestRecord, TestServices};
use ffq_queue::FlowFileRecord;

const SOURCE: &str = "source-1";
const DESTINATION: &str = "dest-1";

fn make_queue(settings: QueueSettings) -> (Arc<FlowFileQueue<TestRecord>>, TestServices) {
    let services = TestServices::new();
    let queue = Arc::new(FlowFileQueue::new(
        settings,
        SOURCE,
        DESTINATION,
        services.services(),
    ));
    (queue, services)
}

fn await_terminal(request: &DropRequest) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !request.state().is_terminal() {
        assert!(
            Instant::now() < deadline,
            "drop request did not reach a terminal state"
        );
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn basic_fifo_with_single_priority() {
    let (queue, _services) = make_queue(QueueSettings::new("q-fifo"));
    for (id, size) in [(1u64, 10u64), (2, 20), (3, 30)] {
        queue.put(TestRecord::new(id, size));
    }
    assert_eq!(queue.size().object_count(), 3);
    assert_eq!(queue.size().byte_count(), 60);

    let mut expired = Vec::new();
    let expected = [(1u64, (2u64, 50u64)), (2, (1, 30)), (3, (0, 0))];
    for (expected_id, (count_after, bytes_after)) in expected {
        let record = queue.poll(&mut expired).expect("queue should serve a record");
        assert_eq!(record.id(), expected_id);
        queue.acknowledge(&record);
        assert_eq!(queue.size().object_count(), count_after);
        assert_eq!(queue.size().byte_count(), bytes_after);
    }
    assert!(expired.is_empty());
    assert!(queue.is_empty());
}

#[test]
fn backpressure_toggles_and_wakes_upstream_once() {
    let settings = QueueSettings::new("q-bp").with_max_object_count(2);
    let (queue, services) = make_queue(settings);

    queue.put(TestRecord::new(1, 10));
    queue.put(TestRecord::new(2, 10));
    assert!(queue.is_full());

    // A full queue still accepts; backpressure is advisory to the upstream.
    queue.put(TestRecord::new(3, 10));
    assert!(queue.is_full());
    assert_eq!(queue.size().object_count(), 3);

    let mut expired = Vec::new();
    let first = queue.poll(&mut expired).expect("first record");
    queue.acknowledge(&first);
    // Two records remain visible, which still meets the threshold of 2.
    assert!(queue.is_full());
    assert_eq!(services.scheduler.events_for(SOURCE), 0);

    let second = queue.poll(&mut expired).expect("second record");
    queue.acknowledge(&second);
    assert!(!queue.is_full());
    assert_eq!(services.scheduler.events_for(SOURCE), 1);
}

#[test]
fn byte_threshold_also_drives_backpressure() {
    let settings = QueueSettings::new("q-bytes").with_max_byte_count(100);
    let (queue, _services) = make_queue(settings);

    queue.put(TestRecord::new(1, 60));
    assert!(!queue.is_full());
    queue.put(TestRecord::new(2, 40));
    assert!(queue.is_full());
}

#[test]
fn swap_out_fires_exactly_once_at_the_batch_boundary() {
    let settings = QueueSettings::new("q-swap")
        .with_swap_threshold(10_000)
        .expect("threshold");
    let (queue, services) = make_queue(settings);

    for id in 0..10_005u64 {
        queue.put(TestRecord::new(id, 1));
    }
    assert_eq!(services.swap_manager.swap_out_calls(), 0);
    assert_eq!(queue.size().active_count, 10_000);
    assert_eq!(queue.size().swapped_count, 5);

    let bytes_before = queue.size().byte_count();
    for id in 10_005..20_005u64 {
        queue.put(TestRecord::new(id, 1));
    }

    assert_eq!(services.swap_manager.swap_out_calls(), 1);
    assert_eq!(services.swap_manager.stored_batch_count(), 1);
    assert_eq!(queue.size().object_count(), 20_005);
    assert_eq!(queue.size().byte_count(), bytes_before + 10_000);
    assert_eq!(queue.size().active_count, 10_000);
    assert_eq!(queue.size().swapped_count, 10_005);
}

#[test]
fn persisted_batches_swap_in_fifo_order() {
    let (queue, services) = make_queue(QueueSettings::new("q-replay"));

    let first: Vec<TestRecord> = (1..=10u64).map(|id| TestRecord::new(id, 1)).collect();
    let second: Vec<TestRecord> = (11..=20u64).map(|id| TestRecord::new(id, 1)).collect();
    let l1 = services
        .swap_manager
        .swap_out(&first, "q-replay")
        .expect("persist first batch");
    let l2 = services
        .swap_manager
        .swap_out(&second, "q-replay")
        .expect("persist second batch");

    assert_eq!(queue.recover_swapped_files(), Some(20));
    assert_eq!(queue.size().object_count(), 20);
    assert_eq!(queue.size().swapped_count, 20);

    let mut expired = Vec::new();
    let mut polled = Vec::new();
    while let Some(record) = queue.poll(&mut expired) {
        polled.push(record.id());
        queue.acknowledge(&record);
    }

    assert_eq!(polled, (1..=20u64).collect::<Vec<_>>());
    assert_eq!(
        services.swap_manager.swap_in_order(),
        vec![l1.as_str().to_string(), l2.as_str().to_string()]
    );
    assert!(queue.is_empty());
}

#[test]
fn expired_records_divert_to_the_caller() {
    let settings = QueueSettings::new("q-expire").with_expiration(Duration::from_millis(100));
    let (queue, _services) = make_queue(settings);

    queue.put(TestRecord::new(1, 10));
    thread::sleep(Duration::from_millis(150));

    let mut expired = Vec::new();
    assert!(queue.poll(&mut expired).is_none());
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id(), 1);
    assert_eq!(queue.size().object_count(), 0);
    assert_eq!(queue.size().byte_count(), 0);
}

#[test]
fn expiration_clears_backpressure() {
    let settings = QueueSettings::new("q-expire-full")
        .with_expiration(Duration::from_millis(50))
        .with_max_object_count(1);
    let (queue, _services) = make_queue(settings);

    queue.put(TestRecord::new(1, 10));
    assert!(queue.is_full());
    thread::sleep(Duration::from_millis(80));

    let mut expired = Vec::new();
    assert!(queue.poll(&mut expired).is_none());
    assert_eq!(expired.len(), 1);
    assert!(!queue.is_full());
}

#[test]
fn penalized_head_short_circuits_poll() {
    let (queue, _services) = make_queue(QueueSettings::new("q-penalty"));
    queue.put(TestRecord::new(1, 10).penalized_until(now_millis() + 60_000));
    queue.put(TestRecord::new(2, 10));

    let mut expired = Vec::new();
    // The non-penalized record sorts ahead of the penalized one.
    let record = queue.poll(&mut expired).expect("non-penalized record");
    assert_eq!(record.id(), 2);
    queue.acknowledge(&record);

    // Now the penalized record is at the head: poll returns nothing and the
    // record stays queued.
    assert!(queue.poll(&mut expired).is_none());
    assert_eq!(queue.size().object_count(), 1);
    assert!(queue.poll(&mut expired).is_none());
}

#[test]
fn poll_batch_stops_at_penalized_head() {
    let (queue, _services) = make_queue(QueueSettings::new("q-batch"));
    for id in 1..=5u64 {
        queue.put(TestRecord::new(id, 10));
    }
    queue.put(TestRecord::new(6, 10).penalized_until(now_millis() + 60_000));

    let mut expired = Vec::new();
    let batch = queue.poll_batch(10, &mut expired);
    assert_eq!(
        batch.iter().map(FlowFileRecord::id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(queue.size().unacknowledged_count, 5);
    assert_eq!(queue.size().object_count(), 6);

    queue.acknowledge_batch(&batch);
    assert_eq!(queue.size().object_count(), 1);
}

#[test]
fn poll_filter_reinserts_rejected_records() {
    let (queue, _services) = make_queue(QueueSettings::new("q-filter"));
    for id in 1..=5u64 {
        queue.put(TestRecord::new(id, 10));
    }

    let mut expired = Vec::new();
    let selected = queue.poll_filter(
        |record| {
            if record.id() == 4 {
                FilterDecision::AcceptTerminate
            } else if record.id() % 2 == 0 {
                FilterDecision::AcceptContinue
            } else {
                FilterDecision::RejectContinue
            }
        },
        &mut expired,
    );

    assert_eq!(
        selected.iter().map(FlowFileRecord::id).collect::<Vec<_>>(),
        vec![2, 4]
    );
    assert_eq!(queue.size().unacknowledged_count, 2);

    // Rejected and unvisited records are still served, priorities intact.
    let rest = queue.poll_batch(10, &mut expired);
    assert_eq!(
        rest.iter().map(FlowFileRecord::id).collect::<Vec<_>>(),
        vec![1, 3, 5]
    );
}

#[test]
fn put_all_accounts_the_whole_batch() {
    let (queue, _services) = make_queue(QueueSettings::new("q-put-all"));
    queue.put_all((1..=4u64).map(|id| TestRecord::new(id, 5)).collect());
    assert_eq!(queue.size().object_count(), 4);
    assert_eq!(queue.size().byte_count(), 20);
}

#[test]
fn over_acknowledgement_clamps_and_warns() {
    let (queue, services) = make_queue(QueueSettings::new("q-clamp"));
    queue.acknowledge(&TestRecord::new(99, 10));

    assert_eq!(queue.size().object_count(), 0);
    assert_eq!(services.event_reporter.count(Severity::Warning), 1);
}

#[test]
fn swap_out_failure_keeps_records_in_memory_and_retries() {
    let settings = QueueSettings::new("q-swap-fail")
        .with_swap_threshold(1)
        .expect("threshold");
    let (queue, services) = make_queue(settings);
    services.swap_manager.set_fail_swap_out(true);

    for id in 0..10_001u64 {
        queue.put(TestRecord::new(id, 1));
    }

    // The flush was attempted and failed; nothing was lost.
    assert_eq!(services.swap_manager.swap_out_calls(), 1);
    assert_eq!(services.swap_manager.stored_batch_count(), 0);
    assert_eq!(queue.size().object_count(), 10_001);
    assert!(services.event_reporter.count(Severity::Error) >= 1);

    // The next batch boundary retries and succeeds.
    services.swap_manager.set_fail_swap_out(false);
    queue.put(TestRecord::new(10_001, 1));
    assert_eq!(services.swap_manager.swap_out_calls(), 2);
    assert_eq!(services.swap_manager.stored_batch_count(), 1);
    assert_eq!(queue.size().object_count(), 10_002);
}

#[test]
fn recovery_skips_unreadable_batches() {
    let (queue, services) = make_queue(QueueSettings::new("q-recover"));

    let lost: Vec<TestRecord> = (1..=5u64).map(|id| TestRecord::new(id, 1)).collect();
    let kept: Vec<TestRecord> = (6..=10u64).map(|id| TestRecord::new(id, 1)).collect();
    let l1 = services
        .swap_manager
        .swap_out(&lost, "q-recover")
        .expect("persist first batch");
    let _l2 = services
        .swap_manager
        .swap_out(&kept, "q-recover")
        .expect("persist second batch");
    services.swap_manager.vanish(&l1);

    assert_eq!(queue.recover_swapped_files(), Some(10));
    assert_eq!(queue.size().object_count(), 5);
    assert_eq!(services.event_reporter.count(Severity::Error), 1);

    let mut expired = Vec::new();
    let polled: Vec<u64> = queue
        .poll_batch(10, &mut expired)
        .iter()
        .map(FlowFileRecord::id)
        .collect();
    assert_eq!(polled, vec![6, 7, 8, 9, 10]);
}

#[test]
fn corrupt_batch_is_dropped_under_the_default_policy() {
    let (queue, services) = make_queue(QueueSettings::new("q-corrupt"));

    let doomed: Vec<TestRecord> = (1..=5u64).map(|id| TestRecord::new(id, 1)).collect();
    let healthy: Vec<TestRecord> = (6..=10u64).map(|id| TestRecord::new(id, 1)).collect();
    let l1 = services
        .swap_manager
        .swap_out(&doomed, "q-corrupt")
        .expect("persist first batch");
    let _l2 = services
        .swap_manager
        .swap_out(&healthy, "q-corrupt")
        .expect("persist second batch");

    assert_eq!(queue.recover_swapped_files(), Some(10));
    services.swap_manager.mark_corrupt(&l1);

    let mut expired = Vec::new();
    // First poll hits the corrupt batch: it is reported, dropped from the
    // replay list and its records are written off.
    assert!(queue.poll(&mut expired).is_none());
    assert_eq!(services.event_reporter.count(Severity::Error), 1);
    assert_eq!(queue.size().object_count(), 5);

    // The next poll replays the healthy batch.
    let record = queue.poll(&mut expired).expect("healthy batch should load");
    assert_eq!(record.id(), 6);
}

#[test]
fn corrupt_batch_is_retained_under_the_fail_policy() {
    let settings =
        QueueSettings::new("q-corrupt-fail").with_swap_corruption_policy(SwapCorruptionPolicy::Fail);
    let (queue, services) = make_queue(settings);

    let records: Vec<TestRecord> = (1..=5u64).map(|id| TestRecord::new(id, 1)).collect();
    let l1 = services
        .swap_manager
        .swap_out(&records, "q-corrupt-fail")
        .expect("persist batch");

    assert_eq!(queue.recover_swapped_files(), Some(5));
    services.swap_manager.mark_corrupt(&l1);

    let mut expired = Vec::new();
    assert!(queue.poll(&mut expired).is_none());
    assert!(queue.poll(&mut expired).is_none());
    // The batch stays on the books and every attempt is surfaced.
    assert_eq!(queue.size().object_count(), 5);
    assert_eq!(services.event_reporter.count(Severity::Error), 2);
}

#[test]
fn purge_discards_persisted_state_only() {
    let settings = QueueSettings::new("q-purge")
        .with_swap_threshold(1)
        .expect("threshold");
    let (queue, services) = make_queue(settings);

    let persisted: Vec<TestRecord> = (1..=5u64).map(|id| TestRecord::new(id, 1)).collect();
    let _location = services
        .swap_manager
        .swap_out(&persisted, "q-purge")
        .expect("persist batch");
    assert_eq!(queue.recover_swapped_files(), Some(5));

    // The queue is in swap mode, so both land in the in-memory buffer.
    queue.put(TestRecord::new(6, 1));
    queue.put(TestRecord::new(7, 1));
    assert_eq!(queue.size().object_count(), 7);

    queue.purge_swap_files();
    assert_eq!(queue.size().object_count(), 2);
    assert_eq!(services.swap_manager.stored_batch_count(), 0);
}

#[test]
fn set_priorities_reorders_the_heap() {
    struct SmallestFirst;
    impl FlowFilePrioritizer<TestRecord> for SmallestFirst {
        fn compare(&self, a: &TestRecord, b: &TestRecord) -> Ordering {
            a.size().cmp(&b.size())
        }
    }

    let (queue, _services) = make_queue(QueueSettings::new("q-priorities"));
    queue.put(TestRecord::new(1, 30));
    queue.put(TestRecord::new(2, 20));
    queue.put(TestRecord::new(3, 10));

    queue.set_priorities(vec![Arc::new(SmallestFirst)]);
    assert_eq!(queue.get_priorities().len(), 1);

    let mut expired = Vec::new();
    let polled: Vec<u64> = queue
        .poll_batch(10, &mut expired)
        .iter()
        .map(FlowFileRecord::id)
        .collect();
    assert_eq!(polled, vec![3, 2, 1]);
}

#[test]
fn event_driven_destination_is_woken_on_put() {
    let (queue, services) = make_queue(QueueSettings::new("q-wake"));
    queue.set_destination_event_driven(true);
    queue.put(TestRecord::new(1, 10));
    queue.put(TestRecord::new(2, 10));
    assert_eq!(services.scheduler.events_for(DESTINATION), 2);
}

#[test]
fn drop_empties_queue_and_emits_provenance() {
    let (queue, services) = make_queue(QueueSettings::new("q-drop"));
    for id in 1..=3u64 {
        queue.put(TestRecord::new(id, 10).with_claim("default", "1", format!("res-{id}"), 0));
    }

    let request = queue.drop_flow_files("req-1", "admin");
    await_terminal(&request);

    assert_eq!(request.state(), DropRequestState::Complete);
    assert_eq!(request.original_size().count, 3);
    assert_eq!(request.dropped_size().count, 3);
    assert_eq!(request.dropped_size().bytes, 30);
    assert_eq!(request.current_size().count, 0);
    assert!(queue.is_empty());

    assert_eq!(services.flow_file_repository.records().len(), 3);
    assert_eq!(services.claim_manager.decrements().len(), 3);

    let events = services.provenance_repository.events();
    assert_eq!(events.len(), 3);
    assert!(
        events
            .iter()
            .all(|event| event.details == "FlowFile Queue emptied by admin")
    );
    assert!(events.iter().all(|event| event.content_claim.is_some()));
}

#[test]
fn drop_covers_buffered_and_persisted_records() {
    let settings = QueueSettings::new("q-drop-swap")
        .with_swap_threshold(1)
        .expect("threshold");
    let (queue, services) = make_queue(settings);

    let persisted: Vec<TestRecord> = (1..=5u64).map(|id| TestRecord::new(id, 1)).collect();
    let _location = services
        .swap_manager
        .swap_out(&persisted, "q-drop-swap")
        .expect("persist batch");
    assert_eq!(queue.recover_swapped_files(), Some(5));

    queue.put(TestRecord::new(6, 1));
    queue.put(TestRecord::new(7, 1));
    assert_eq!(queue.size().object_count(), 7);

    let request = queue.drop_flow_files("req-2", "admin");
    await_terminal(&request);

    assert_eq!(request.state(), DropRequestState::Complete);
    assert_eq!(request.dropped_size().count, 7);
    assert!(queue.is_empty());
    assert_eq!(services.swap_manager.stored_batch_count(), 0);
}

#[test]
fn drop_cancel_midway_through_persisted_batches() {
    let settings = QueueSettings::new("q-drop-cancel")
        .with_swap_threshold(1_000)
        .expect("threshold");
    let (queue, services) = make_queue(settings);

    let mut next_id = 0u64;
    for _ in 0..10 {
        let batch: Vec<TestRecord> = (0..1_000)
            .map(|_| {
                next_id += 1;
                TestRecord::new(next_id, 1)
            })
            .collect();
        let _ = services
            .swap_manager
            .swap_out(&batch, "q-drop-cancel")
            .expect("persist batch");
    }
    assert_eq!(queue.recover_swapped_files(), Some(10_000));
    assert_eq!(queue.size().object_count(), 10_000);

    // Cancel from inside the third swap-in; the worker notices the flag before
    // starting the fourth batch, so exactly three batches are dropped.
    let cancel_queue = Arc::clone(&queue);
    services.swap_manager.set_swap_in_hook(move |call| {
        if call == 3 {
            let _ = cancel_queue.cancel_drop("req-3");
        }
    });

    let request = queue.drop_flow_files("req-3", "admin");
    await_terminal(&request);

    assert_eq!(request.state(), DropRequestState::Canceled);
    assert_eq!(request.dropped_size().count, 3_000);
    assert_eq!(
        queue.size().object_count(),
        request.original_size().count - request.dropped_size().count
    );
}

#[test]
fn drop_fails_cleanly_when_the_repository_does() {
    let (queue, services) = make_queue(QueueSettings::new("q-drop-fail"));
    for id in 1..=3u64 {
        queue.put(TestRecord::new(id, 10));
    }
    services.flow_file_repository.set_fail(true);

    let request = queue.drop_flow_files("req-4", "admin");
    await_terminal(&request);

    assert_eq!(request.state(), DropRequestState::Failure);
    assert!(
        request
            .failure_reason()
            .expect("failure reason")
            .contains("record deletions")
    );
    // Nothing was lost: the records are still in the queue.
    assert_eq!(queue.size().object_count(), 3);
    assert!(services.claim_manager.decrements().is_empty());

    services.flow_file_repository.set_fail(false);
    let mut expired = Vec::new();
    assert!(queue.poll(&mut expired).is_some());
}

#[test]
fn cancel_of_unknown_request_returns_none() {
    let (queue, _services) = make_queue(QueueSettings::new("q-cancel-none"));
    assert!(queue.cancel_drop("missing").is_none());
}
