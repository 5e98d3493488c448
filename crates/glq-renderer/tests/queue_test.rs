//! Integration test: CommandQueue
//!
//! Exercises the control-plane queue on its own: growth, the hard maximum,
//! the queue-full listener and payload ownership.
//!
//! Run with: cargo test --test queue_test -- --nocapture

use std::sync::Arc;

use glq_core::config::QueueConfig;
use glq_core::ResourceHandleTable;
use glq_protocol::command::Slot;
use glq_protocol::handle::ResourceKind;
use glq_protocol::opcode::Opcode;
use glq_renderer::{CommandQueue, RendererStats, TransferBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn make_queue(initial: usize, max: usize) -> (CommandQueue, Arc<RendererStats>) {
    glq_common::init_test_logging();
    let stats = Arc::new(RendererStats::new());
    let config = QueueConfig {
        initial_capacity: initial,
        max_capacity: max,
        max_frames_in_flight: 2,
    };
    let queue = CommandQueue::new(Arc::new(ResourceHandleTable::new()), &config, stats.clone());
    (queue, stats)
}

#[test]
fn test_capacity_grows_by_half() {
    let (mut queue, _) = make_queue(2, 10);
    assert_eq!(queue.capacity(), 2);

    for _ in 0..3 {
        queue.enqueue(Opcode::Flush, &[]);
    }
    assert_eq!(queue.capacity(), 3);

    queue.enqueue(Opcode::Flush, &[]);
    queue.enqueue(Opcode::Flush, &[]);
    assert_eq!(queue.capacity(), 6);
    assert_eq!(queue.queued_count(), 5);
}

#[test]
fn test_full_queue_without_listener_discards_everything() {
    let (mut queue, stats) = make_queue(4, 4);

    for i in 0..4 {
        let payload = queue.payload(vec![i as u8; 16]);
        let record = queue
            .enqueue(Opcode::BufferData, &[Slot::uint(0x8892), Slot::int(16), Slot::int(0)])
            .expect("queue has room");
        record.set_payload(payload);
    }
    assert_eq!(queue.queued_count(), 4);

    let fifth = queue.enqueue(Opcode::Flush, &[]);
    assert!(fifth.is_none());
    assert_eq!(queue.queued_count(), 0);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.queue_full_signals, 1);
    assert_eq!(snapshot.records_dropped, 5);
    assert_eq!(snapshot.records_dispatched, 0);
    assert_eq!(snapshot.payloads_outstanding, 0);
}

#[test]
fn test_listener_drains_once_and_append_succeeds() {
    let (mut queue, stats) = make_queue(2, 4);
    let mut flushed: Vec<TransferBatch> = Vec::new();

    for _ in 0..5 {
        let mut listener = |q: &mut CommandQueue| flushed.push(q.take_batch());
        let record = queue.enqueue_with(Opcode::Flush, &[], Some(&mut listener));
        assert!(record.is_some());
    }

    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].len(), 4);
    assert_eq!(queue.queued_count(), 1);
    assert_eq!(stats.snapshot().queue_full_signals, 1);
    assert_eq!(stats.snapshot().records_dropped, 0);
}

#[test]
fn test_take_batch_moves_records_and_host_requests() {
    let (mut queue, _) = make_queue(8, 64);
    queue.enqueue(Opcode::ClearColor, &[Slot::float(1.0); 4]);
    queue.enqueue(Opcode::Clear, &[Slot::uint(0x4000)]);

    let batch = queue.take_batch();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.records[0].opcode, Opcode::ClearColor);
    assert_eq!(batch.records[1].opcode, Opcode::Clear);
    assert!(batch.host_textures.is_empty());
    assert_eq!(queue.queued_count(), 0);
    assert!(queue.take_batch().is_empty());
}

#[test]
fn test_reset_clears_handles_and_pending_records() {
    let (mut queue, stats) = make_queue(8, 64);
    let handle = queue.allocate_handle(ResourceKind::Buffer).expect("allocate");
    queue.enqueue(Opcode::CreateBuffer, &[Slot::handle(handle)]);
    assert!(queue.table().contains(handle));

    queue.reset(1_000_000);
    assert_eq!(queue.queued_count(), 0);
    assert!(queue.table().is_empty());
    assert_eq!(queue.capacity(), 64);
    assert_eq!(stats.snapshot().records_dropped, 1);
}

#[test]
fn test_every_payload_is_freed_exactly_once() {
    let (mut queue, stats) = make_queue(4, 16);
    let mut rng = StdRng::seed_from_u64(5);
    let mut in_flight: Vec<TransferBatch> = Vec::new();

    for _ in 0..1000 {
        match rng.gen_range(0..10) {
            0 => {
                queue.discard_pending();
            }
            1 => queue.reset(rng.gen_range(1..16)),
            2 => in_flight.push(queue.take_batch()),
            3 if !in_flight.is_empty() => {
                // Dispatch: each record gives up its payload as it runs
                let index = rng.gen_range(0..in_flight.len());
                let mut batch = in_flight.swap_remove(index);
                for record in &mut batch.records {
                    drop(record.take_payload());
                }
            }
            _ => {
                let len = rng.gen_range(1..32);
                let payload = queue.payload(vec![1; len]);
                if let Some(record) = queue.enqueue(
                    Opcode::BufferData,
                    &[Slot::uint(0x8892), Slot::int(len as i32), Slot::int(0)],
                ) {
                    record.set_payload(payload);
                }
            }
        }
        let payloads = &stats.payloads;
        assert!(payloads.freed() <= payloads.allocated());
    }

    drop(in_flight);
    queue.discard_pending();
    let payloads = &stats.payloads;
    assert!(payloads.allocated() > 0);
    assert_eq!(payloads.allocated(), payloads.freed());
    assert_eq!(stats.snapshot().payloads_outstanding, 0);
}
