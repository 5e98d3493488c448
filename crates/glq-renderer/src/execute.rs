use std::ops::Range;

use glq_core::config::SurfaceMode;
use glq_protocol::command::CommandRecord;
use tracing::trace;

use crate::queue::TransferBatch;

/// Records owned by the execution plane, plus the begin-paint / texture-
/// complete indices that delimit the last complete frame for replay.
#[derive(Debug, Default)]
pub struct ExecuteBuffer {
    records: Vec<CommandRecord>,
    start: usize,
    /// Zero means "up to the end of the buffer".
    end: usize,
    dispatched: usize,
    sealed: bool,
}

impl ExecuteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a batch in. Returns the number of records received.
    ///
    /// Exclusive mode always replaces the buffer. Shared mode keeps the
    /// previous buffer when the batch is empty so it can be replayed; new
    /// records replace it once the previous frame has been shown, and are
    /// appended while a frame is still being assembled.
    pub fn transfer(&mut self, batch: Vec<CommandRecord>, mode: SurfaceMode) -> usize {
        let count = batch.len();
        match mode {
            SurfaceMode::Exclusive => self.replace(batch),
            SurfaceMode::Shared if count == 0 => {
                trace!("empty transfer; keeping {} records for replay", self.records.len());
            }
            SurfaceMode::Shared if self.sealed || self.records.is_empty() => self.replace(batch),
            SurfaceMode::Shared => self.records.extend(batch),
        }
        count
    }

    /// Convenience for a full [`TransferBatch`]; host texture requests are
    /// returned to the caller.
    pub fn transfer_batch(
        &mut self,
        batch: TransferBatch,
        mode: SurfaceMode,
    ) -> Vec<crate::host::HostTextureRequest> {
        let TransferBatch {
            records,
            host_textures,
        } = batch;
        self.transfer(records, mode);
        host_textures
    }

    fn replace(&mut self, batch: Vec<CommandRecord>) {
        self.records = batch;
        self.start = 0;
        self.end = 0;
        self.dispatched = 0;
        self.sealed = false;
    }

    /// Records not yet dispatched since they were transferred.
    pub fn pending_range(&self) -> Range<usize> {
        self.dispatched.min(self.records.len())..self.records.len()
    }

    /// The last complete frame: `[begin-paint, texture-complete)`.
    pub fn frame_range(&self) -> Range<usize> {
        let end = if self.end == 0 {
            self.records.len()
        } else {
            self.end.min(self.records.len())
        };
        self.start.min(end)..end
    }

    pub fn records_mut(&mut self, range: Range<usize>) -> &mut [CommandRecord] {
        &mut self.records[range]
    }

    pub fn mark_dispatched(&mut self, upto: usize) {
        self.dispatched = self.dispatched.max(upto);
    }

    pub fn set_start(&mut self, index: usize) {
        self.start = index;
    }

    pub fn set_end(&mut self, index: usize) {
        self.end = index;
    }

    /// The frame held by this buffer has been shown; the next non-empty
    /// transfer starts a new frame.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }
}
