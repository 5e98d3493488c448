//! Integration test: ResourceHandleTable
//!
//! Allocation, binding, resolution, release and teardown of virtual handles,
//! including wraparound and concurrent use from two threads.
//!
//! Run with: cargo test --test handle_table_test -- --nocapture

use std::sync::Arc;

use glq_core::{CoreError, ResourceHandleTable};
use glq_protocol::handle::{NativeHandle, ResourceKind, VirtualHandle};
use rand::Rng;

#[test]
fn test_allocate_never_returns_null() {
    let table = ResourceHandleTable::new();
    for _ in 0..1000 {
        let handle = table.allocate(ResourceKind::Buffer).expect("allocate");
        assert!(!handle.is_null());
    }
    assert_eq!(table.len(), 1000);
}

#[test]
fn test_resolve_follows_bind_and_release() {
    let table = ResourceHandleTable::new();
    let handle = table.allocate(ResourceKind::Texture).expect("allocate");

    assert_eq!(table.resolve(handle), NativeHandle::NULL);
    assert!(!table.is_bound(handle));

    table
        .bind(handle, NativeHandle(77), ResourceKind::Texture)
        .expect("bind");
    assert_eq!(table.resolve(handle), NativeHandle(77));
    assert_eq!(table.reverse(NativeHandle(77), ResourceKind::Texture), handle);

    assert_eq!(
        table.release(handle),
        Some((NativeHandle(77), ResourceKind::Texture))
    );
    assert_eq!(table.resolve(handle), NativeHandle::NULL);
    assert_eq!(
        table.reverse(NativeHandle(77), ResourceKind::Texture),
        VirtualHandle::NULL
    );

    // Idempotent
    assert_eq!(table.release(handle), None);
}

#[test]
fn test_null_and_unknown_handles() {
    let table = ResourceHandleTable::new();
    assert_eq!(table.resolve(VirtualHandle::NULL), NativeHandle::NULL);
    assert_eq!(table.resolve(VirtualHandle(42)), NativeHandle::NULL);

    match table.lookup(VirtualHandle(42), ResourceKind::Buffer) {
        Err(CoreError::UnknownHandle(h)) => assert_eq!(h, VirtualHandle(42)),
        other => panic!("expected UnknownHandle, got {:?}", other),
    }
    match table.lookup(VirtualHandle::NULL, ResourceKind::Buffer) {
        Ok(native) => assert!(native.is_null()),
        other => panic!("expected null native, got {:?}", other),
    }
    match table.bind(VirtualHandle::NULL, NativeHandle(1), ResourceKind::Buffer) {
        Err(CoreError::NullHandle) => {}
        other => panic!("expected NullHandle, got {:?}", other),
    }
}

#[test]
fn test_lookup_rejects_kind_mismatch() {
    let table = ResourceHandleTable::new();
    let shader = table.allocate(ResourceKind::Shader).expect("allocate");
    table
        .bind(shader, NativeHandle(5), ResourceKind::Shader)
        .expect("bind");

    match table.lookup(shader, ResourceKind::Program) {
        Err(CoreError::KindMismatch { expected, actual, .. }) => {
            assert_eq!(expected, ResourceKind::Program);
            assert_eq!(actual, ResourceKind::Shader);
        }
        other => panic!("expected KindMismatch, got {:?}", other),
    }
    assert_eq!(table.kind_of(shader), Some(ResourceKind::Shader));
}

#[test]
fn test_allocation_wraps_past_zero() {
    let table = ResourceHandleTable::starting_at(u32::MAX - 1);

    let a = table.allocate(ResourceKind::Buffer).expect("allocate");
    let b = table.allocate(ResourceKind::Buffer).expect("allocate");
    let c = table.allocate(ResourceKind::Buffer).expect("allocate");
    assert_eq!(a, VirtualHandle(u32::MAX - 1));
    assert_eq!(b, VirtualHandle(u32::MAX));
    assert_eq!(c, VirtualHandle(1));
}

#[test]
fn test_rebind_replaces_reverse_mapping() {
    let table = ResourceHandleTable::new();
    let host = table.allocate(ResourceKind::HostTexture).expect("allocate");
    table
        .bind(host, NativeHandle(10), ResourceKind::HostTexture)
        .expect("bind");
    table
        .bind(host, NativeHandle(11), ResourceKind::HostTexture)
        .expect("rebind");

    assert_eq!(table.resolve(host), NativeHandle(11));
    assert_eq!(
        table.reverse(NativeHandle(10), ResourceKind::HostTexture),
        VirtualHandle::NULL
    );
    assert_eq!(table.reverse(NativeHandle(11), ResourceKind::HostTexture), host);
}

#[test]
fn test_drain_returns_every_entry_sorted() {
    let table = ResourceHandleTable::new();
    let buffer = table.allocate(ResourceKind::Buffer).expect("allocate");
    let program = table.allocate(ResourceKind::Program).expect("allocate");
    table
        .bind(buffer, NativeHandle(3), ResourceKind::Buffer)
        .expect("bind");

    let drained = table.drain();
    assert_eq!(
        drained,
        vec![
            (buffer, NativeHandle(3), ResourceKind::Buffer),
            (program, NativeHandle::NULL, ResourceKind::Program),
        ]
    );
    assert!(table.is_empty());
    assert_eq!(table.resolve(buffer), NativeHandle::NULL);
}

#[test]
fn test_concurrent_allocate_and_bind() {
    let table = Arc::new(ResourceHandleTable::new());
    let (tx, rx) = std::sync::mpsc::channel::<VirtualHandle>();

    let binder = {
        let table = table.clone();
        std::thread::spawn(move || {
            let mut bound = 0;
            for handle in rx {
                table
                    .bind(handle, NativeHandle(handle.raw() + 1000), ResourceKind::Buffer)
                    .expect("bind");
                bound += 1;
            }
            bound
        })
    };

    let mut rng = rand::thread_rng();
    let mut handles = Vec::new();
    for _ in 0..500 {
        let handle = table.allocate(ResourceKind::Buffer).expect("allocate");
        handles.push(handle);
        if rng.gen_bool(0.9) {
            tx.send(handle).expect("send");
        }
    }
    drop(tx);
    let bound = binder.join().expect("binder thread");

    let resolved = handles
        .iter()
        .filter(|h| table.resolve(**h) == NativeHandle(h.raw() + 1000))
        .count();
    assert_eq!(resolved, bound);
}
