use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::handle::VirtualHandle;
use crate::opcode::Opcode;

/// Number of scalar slots in every command record.
pub const MAX_SLOTS: usize = 8;

/// An untyped 32-bit scalar. The opcode schema says whether it holds an
/// integer, a float, or a virtual handle.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Slot(u32);

impl Slot {
    pub fn int(value: i32) -> Self {
        Slot(value as u32)
    }

    pub fn uint(value: u32) -> Self {
        Slot(value)
    }

    pub fn float(value: f32) -> Self {
        Slot(value.to_bits())
    }

    pub fn handle(handle: VirtualHandle) -> Self {
        Slot(handle.raw())
    }

    pub fn as_int(self) -> i32 {
        self.0 as i32
    }

    pub fn as_uint(self) -> u32 {
        self.0
    }

    pub fn as_float(self) -> f32 {
        f32::from_bits(self.0)
    }

    pub fn as_handle(self) -> VirtualHandle {
        VirtualHandle(self.0)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Allocation accounting for payloads created through a queue.
#[derive(Debug, Default)]
pub struct PayloadStats {
    allocated: AtomicU64,
    freed: AtomicU64,
}

impl PayloadStats {
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Relaxed)
    }

    /// Payloads allocated but not yet dropped.
    pub fn outstanding(&self) -> u64 {
        self.allocated().saturating_sub(self.freed())
    }
}

/// Variable-length data attached to a command record. Exclusively owned:
/// it moves from the queue to the execute buffer and is freed exactly once.
pub struct Payload {
    bytes: Vec<u8>,
    stats: Option<Arc<PayloadStats>>,
}

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, stats: None }
    }

    /// Count this payload in `stats`; the matching free is counted on drop.
    pub fn tracked(mut self, stats: &Arc<PayloadStats>) -> Self {
        if self.stats.is_none() {
            stats.allocated.fetch_add(1, Ordering::Relaxed);
            self.stats = Some(stats.clone());
        }
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        if let Some(stats) = &self.stats {
            stats.freed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.bytes.len())
    }
}

/// One queued unit of work.
#[derive(Debug)]
pub struct CommandRecord {
    pub opcode: Opcode,
    pub slots: [Slot; MAX_SLOTS],
    pub payload: Option<Payload>,
}

impl CommandRecord {
    /// Build a record; slots beyond `MAX_SLOTS` are ignored.
    pub fn new(opcode: Opcode, slots: &[Slot]) -> Self {
        let mut record = Self {
            opcode,
            slots: [Slot::default(); MAX_SLOTS],
            payload: None,
        };
        let n = slots.len().min(MAX_SLOTS);
        record.slots[..n].copy_from_slice(&slots[..n]);
        record
    }

    pub fn slot(&self, index: usize) -> Slot {
        self.slots.get(index).copied().unwrap_or_default()
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = Some(payload);
    }

    pub fn take_payload(&mut self) -> Option<Payload> {
        self.payload.take()
    }

    pub fn payload_bytes(&self) -> Option<&[u8]> {
        self.payload.as_ref().map(Payload::as_bytes)
    }

    /// Raw slot words, e.g. for tracing a record.
    pub fn words(&self) -> &[u32] {
        bytemuck::cast_slice(&self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_round_trip_their_interpretation() {
        assert_eq!(Slot::int(-3).as_int(), -3);
        assert_eq!(Slot::float(0.25).as_float(), 0.25);
        assert_eq!(Slot::handle(VirtualHandle(9)).as_handle(), VirtualHandle(9));
    }

    #[test]
    fn words_expose_raw_slot_bits() {
        let record = CommandRecord::new(Opcode::ClearColor, &[Slot::float(1.0), Slot::int(-1)]);
        assert_eq!(record.words()[0], 1.0f32.to_bits());
        assert_eq!(record.words()[1], u32::MAX);
        assert_eq!(record.words().len(), MAX_SLOTS);
    }

    #[test]
    fn tracked_payload_counts_one_free_on_drop() {
        let stats = Arc::new(PayloadStats::default());
        let payload = Payload::new(vec![0; 12]).tracked(&stats);
        assert_eq!(payload.len(), 12);
        assert_eq!(stats.outstanding(), 1);
        drop(payload);
        assert_eq!(stats.allocated(), 1);
        assert_eq!(stats.freed(), 1);
    }
}
