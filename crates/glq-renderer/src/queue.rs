use std::fmt;
use std::sync::Arc;

use glq_core::config::QueueConfig;
use glq_core::{CoreError, ResourceHandleTable};
use glq_protocol::command::{CommandRecord, Payload, Slot};
use glq_protocol::handle::{ResourceKind, VirtualHandle};
use glq_protocol::opcode::Opcode;
use tracing::{debug, warn};

use crate::host::{HostTextureProvider, HostTextureRequest};
use crate::stats::{bump, RendererStats};

/// Called synchronously when an append would exceed the hard maximum.
/// The listener is expected to force a transfer+dispatch cycle, leaving the
/// queue empty.
pub trait QueueFullListener {
    fn on_queue_full(&mut self, queue: &mut CommandQueue);
}

impl<F: FnMut(&mut CommandQueue)> QueueFullListener for F {
    fn on_queue_full(&mut self, queue: &mut CommandQueue) {
        self(queue)
    }
}

/// Everything moved from the queue to the execution plane in one transfer.
#[derive(Default)]
pub struct TransferBatch {
    pub records: Vec<CommandRecord>,
    pub host_textures: Vec<HostTextureRequest>,
}

impl TransferBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.host_textures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl fmt::Debug for TransferBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBatch")
            .field("records", &self.records.len())
            .field("host_textures", &self.host_textures.len())
            .finish()
    }
}

/// Append-only command buffer owned by the control plane. Records are moved
/// out wholesale at each transfer; nothing else touches the backing storage.
pub struct CommandQueue {
    records: Vec<CommandRecord>,
    capacity: usize,
    max_capacity: usize,
    host_textures: Vec<HostTextureRequest>,
    table: Arc<ResourceHandleTable>,
    stats: Arc<RendererStats>,
}

impl CommandQueue {
    pub fn new(
        table: Arc<ResourceHandleTable>,
        config: &QueueConfig,
        stats: Arc<RendererStats>,
    ) -> Self {
        let max_capacity = config.max_capacity.max(1);
        let capacity = config.initial_capacity.clamp(1, max_capacity);
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
            max_capacity,
            host_textures: Vec::new(),
            table,
            stats,
        }
    }

    pub fn table(&self) -> &Arc<ResourceHandleTable> {
        &self.table
    }

    /// Records queued since the last transfer or reset.
    pub fn queued_count(&self) -> usize {
        self.records.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn allocate_handle(&self, kind: ResourceKind) -> Result<VirtualHandle, CoreError> {
        self.table.allocate(kind)
    }

    /// Wrap `bytes` in a payload counted by the shared payload stats.
    pub fn payload(&self, bytes: Vec<u8>) -> Payload {
        Payload::new(bytes).tracked(&self.stats.payloads)
    }

    /// Append without a queue-full listener.
    pub fn enqueue(&mut self, opcode: Opcode, slots: &[Slot]) -> Option<&mut CommandRecord> {
        self.enqueue_with(opcode, slots, None)
    }

    /// Append a record and return it so the caller can attach a payload.
    ///
    /// Returns `None` when the queue was full, no listener drained it, and
    /// every pending record (this one included) was discarded.
    pub fn enqueue_with(
        &mut self,
        opcode: Opcode,
        slots: &[Slot],
        listener: Option<&mut dyn QueueFullListener>,
    ) -> Option<&mut CommandRecord> {
        if self.records.len() >= self.max_capacity {
            bump(&self.stats.queue_full_signals, 1);
            debug!(
                queued = self.records.len(),
                max = self.max_capacity,
                "command queue full"
            );
            if let Some(listener) = listener {
                listener.on_queue_full(self);
            }
            if self.records.len() >= self.max_capacity {
                let dropped = self.discard_pending() + 1;
                warn!(
                    dropped,
                    "command queue still full after flush request; pending commands discarded"
                );
                bump(&self.stats.records_dropped, 1);
                return None;
            }
        }

        if self.records.len() >= self.capacity {
            self.grow();
        }

        bump(&self.stats.records_enqueued, 1);
        self.records.push(CommandRecord::new(opcode, slots));
        self.records.last_mut()
    }

    fn grow(&mut self) {
        let grown = (self.capacity + self.capacity / 2)
            .max(self.capacity + 1)
            .min(self.max_capacity);
        self.records.reserve_exact(grown - self.records.len());
        debug!("command queue grown {} -> {}", self.capacity, grown);
        self.capacity = grown;
    }

    /// Record a deferred request to sample a host-owned texture through `handle`.
    pub fn bind_host_texture(
        &mut self,
        handle: VirtualHandle,
        provider: &Arc<dyn HostTextureProvider>,
    ) {
        self.host_textures
            .push(HostTextureRequest::new(handle, provider));
    }

    /// Move everything queued since the last transfer into a batch.
    pub fn take_batch(&mut self) -> TransferBatch {
        TransferBatch {
            records: std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity)),
            host_textures: std::mem::take(&mut self.host_textures),
        }
    }

    /// Drop all untransferred records, freeing their payloads.
    pub fn discard_pending(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        self.host_textures.clear();
        if count > 0 {
            bump(&self.stats.records_dropped, count as u64);
        }
        count
    }

    /// Reallocate to `size` records (clamped to the maximum), dropping
    /// pending records and clearing the handle table.
    ///
    /// Only valid while no context exists: pending deletions are never
    /// dispatched, so any live native resources would leak.
    pub fn reset(&mut self, size: usize) {
        let discarded = self.discard_pending();
        self.table.clear();
        self.capacity = size.clamp(1, self.max_capacity);
        self.records = Vec::with_capacity(self.capacity);
        debug!(discarded, capacity = self.capacity, "command queue reset");
    }
}
