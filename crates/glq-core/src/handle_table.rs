use std::collections::HashMap;

use glq_protocol::handle::{NativeHandle, ResourceKind, VirtualHandle};
use parking_lot::Mutex;
use tracing::trace;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy)]
struct Entry {
    native: NativeHandle,
    kind: ResourceKind,
}

struct Inner {
    entries: HashMap<VirtualHandle, Entry>,
    reverse: HashMap<(NativeHandle, ResourceKind), VirtualHandle>,
    next: u32,
}

/// Virtual-to-native handle mapping shared by the control plane (which
/// allocates) and the execution plane (which binds, resolves and releases).
/// Every operation runs under a single lock.
pub struct ResourceHandleTable {
    inner: Mutex<Inner>,
}

impl ResourceHandleTable {
    pub fn new() -> Self {
        // Start from 1: zero is the null handle
        Self::starting_at(1)
    }

    /// A table whose next allocation tries `next` first.
    pub fn starting_at(next: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                reverse: HashMap::new(),
                next: next.max(1),
            }),
        }
    }

    /// Allocate an unbound handle for a resource of `kind`.
    /// Never returns the null handle; after wrapping, live values are skipped.
    pub fn allocate(&self, kind: ResourceKind) -> Result<VirtualHandle, CoreError> {
        let mut inner = self.inner.lock();
        if inner.entries.len() >= (u32::MAX - 1) as usize {
            return Err(CoreError::Exhausted);
        }

        loop {
            let candidate = VirtualHandle(inner.next);
            inner.next = inner.next.wrapping_add(1).max(1);
            if !candidate.is_null() && !inner.entries.contains_key(&candidate) {
                inner.entries.insert(
                    candidate,
                    Entry {
                        native: NativeHandle::NULL,
                        kind,
                    },
                );
                trace!("allocated {} handle {:?}", kind, candidate);
                return Ok(candidate);
            }
        }
    }

    /// Attach the native object created for `handle`. Rebinding replaces the
    /// previous native handle.
    pub fn bind(
        &self,
        handle: VirtualHandle,
        native: NativeHandle,
        kind: ResourceKind,
    ) -> Result<(), CoreError> {
        if handle.is_null() {
            return Err(CoreError::NullHandle);
        }

        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .get_mut(&handle)
            .ok_or(CoreError::UnknownHandle(handle))?;
        if entry.kind != kind {
            return Err(CoreError::KindMismatch {
                handle,
                expected: entry.kind,
                actual: kind,
            });
        }

        let previous = std::mem::replace(&mut entry.native, native);
        if !previous.is_null() {
            inner.reverse.remove(&(previous, kind));
        }
        if !native.is_null() {
            inner.reverse.insert((native, kind), handle);
        }
        Ok(())
    }

    /// The native handle behind `handle`, or the null handle when `handle`
    /// is null, unbound or unknown.
    pub fn resolve(&self, handle: VirtualHandle) -> NativeHandle {
        if handle.is_null() {
            return NativeHandle::NULL;
        }
        self.inner
            .lock()
            .entries
            .get(&handle)
            .map(|e| e.native)
            .unwrap_or(NativeHandle::NULL)
    }

    /// Strict variant of [`resolve`](Self::resolve): unknown handles and
    /// kind mismatches are errors. The null handle resolves to the null handle.
    pub fn lookup(
        &self,
        handle: VirtualHandle,
        kind: ResourceKind,
    ) -> Result<NativeHandle, CoreError> {
        if handle.is_null() {
            return Ok(NativeHandle::NULL);
        }
        let inner = self.inner.lock();
        let entry = inner
            .entries
            .get(&handle)
            .ok_or(CoreError::UnknownHandle(handle))?;
        if entry.kind != kind {
            return Err(CoreError::KindMismatch {
                handle,
                expected: kind,
                actual: entry.kind,
            });
        }
        Ok(entry.native)
    }

    /// Map a native handle discovered on the execution plane back to its
    /// virtual handle, or the null handle if there is none.
    pub fn reverse(&self, native: NativeHandle, kind: ResourceKind) -> VirtualHandle {
        self.inner
            .lock()
            .reverse
            .get(&(native, kind))
            .copied()
            .unwrap_or(VirtualHandle::NULL)
    }

    pub fn kind_of(&self, handle: VirtualHandle) -> Option<ResourceKind> {
        self.inner.lock().entries.get(&handle).map(|e| e.kind)
    }

    pub fn contains(&self, handle: VirtualHandle) -> bool {
        self.inner.lock().entries.contains_key(&handle)
    }

    /// True once a native object has been bound to `handle`.
    pub fn is_bound(&self, handle: VirtualHandle) -> bool {
        self.inner
            .lock()
            .entries
            .get(&handle)
            .is_some_and(|e| !e.native.is_null())
    }

    /// Remove the entry for `handle`, returning what it mapped to.
    /// Releasing an unknown handle is a no-op.
    pub fn release(&self, handle: VirtualHandle) -> Option<(NativeHandle, ResourceKind)> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(&handle)?;
        if !entry.native.is_null() {
            inner.reverse.remove(&(entry.native, entry.kind));
        }
        Some((entry.native, entry.kind))
    }

    /// Remove every entry, returning them for teardown.
    pub fn drain(&self) -> Vec<(VirtualHandle, NativeHandle, ResourceKind)> {
        let mut inner = self.inner.lock();
        inner.reverse.clear();
        let mut drained: Vec<_> = inner
            .entries
            .drain()
            .map(|(handle, e)| (handle, e.native, e.kind))
            .collect();
        drained.sort_by_key(|(handle, _, _)| *handle);
        drained
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.reverse.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl Default for ResourceHandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_counter_skips_live_handles() {
        let table = ResourceHandleTable::new();
        let one = table.allocate(ResourceKind::Buffer).expect("allocate");
        let two = table.allocate(ResourceKind::Buffer).expect("allocate");
        let three = table.allocate(ResourceKind::Buffer).expect("allocate");
        table.release(two);

        table.inner.lock().next = one.raw();
        assert_eq!(table.allocate(ResourceKind::Buffer).expect("allocate"), two);
        let four = table.allocate(ResourceKind::Buffer).expect("allocate");
        assert_ne!(four, three);
        assert_eq!(four, VirtualHandle(4));
    }
}
