use std::sync::Arc;

use glq_core::ResourceHandleTable;
use glq_protocol::command::{CommandRecord, Slot, MAX_SLOTS};
use glq_protocol::error::ErrorFlags;
use glq_protocol::gl;
use glq_protocol::handle::{NativeHandle, ResourceKind, SurfaceSize, VirtualHandle};
use glq_protocol::opcode::{Opcode, OpcodeInfo, SlotKind};
use glq_protocol::value::{Arg, SyncValue};
use tracing::{debug, trace, warn};

use crate::driver::{Driver, DriverError};
use crate::frame::SwapChain;
use crate::host::HostTextureCache;
use crate::notify::{Notification, Notifier};
use crate::stats::{bump, RendererStats};

/// What one dispatch pass over a run of records saw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub executed: usize,
    /// Index just past the last begin-paint marker.
    pub begin_paint: Option<usize>,
    /// Index just past the last texture-complete marker.
    pub texture_complete: Option<usize>,
    pub frames_finalized: u32,
}

/// Executes command records against a [`Driver`].
///
/// Owns the driver and the swap chain; the handle table is shared with the
/// control plane, which only allocates from it.
pub struct Dispatcher<D> {
    driver: D,
    table: Arc<ResourceHandleTable>,
    swap_chain: SwapChain,
    errors: ErrorFlags,
    current_framebuffer: VirtualHandle,
    poll_errors: bool,
    host_textures: HostTextureCache,
    /// Native textures rebound since the last announcement.
    rebound: Vec<NativeHandle>,
    notifier: Notifier,
    stats: Arc<RendererStats>,
}

impl<D: Driver> Dispatcher<D> {
    pub fn new(
        driver: D,
        table: Arc<ResourceHandleTable>,
        swap_chain: SwapChain,
        poll_errors: bool,
        notifier: Notifier,
        stats: Arc<RendererStats>,
    ) -> Self {
        Self {
            driver,
            table,
            swap_chain,
            errors: ErrorFlags::empty(),
            current_framebuffer: VirtualHandle::NULL,
            poll_errors,
            host_textures: HostTextureCache::new(),
            rebound: Vec::new(),
            notifier,
            stats,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }

    pub fn table(&self) -> &Arc<ResourceHandleTable> {
        &self.table
    }

    pub fn host_textures(&self) -> &HostTextureCache {
        &self.host_textures
    }

    pub fn errors(&self) -> ErrorFlags {
        self.errors
    }

    pub fn take_errors(&mut self) -> ErrorFlags {
        std::mem::take(&mut self.errors)
    }

    /// Create (or resize) the swap-chain surfaces.
    pub fn provision(&mut self, size: SurfaceSize) -> Result<(), DriverError> {
        self.swap_chain.provision(&mut self.driver, size)?;
        self.current_framebuffer = VirtualHandle::NULL;
        Ok(())
    }

    /// Re-provision the swap chain at a new size, keeping the current
    /// framebuffer binding. The new (cleared) display surface is announced
    /// right away since the old one is gone. On failure the old surfaces
    /// stay in place and the error is recorded.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), DriverError> {
        if let Err(e) = self.swap_chain.provision(&mut self.driver, size) {
            self.errors |= e.error_flags();
            return Err(e);
        }
        self.bind_current_target();
        if let Some(display) = self.swap_chain.display_surface() {
            let texture = self.driver.surface_texture(display);
            self.notifier.notify(Notification::TextureReady {
                texture,
                size: self.swap_chain.size(),
            });
        }
        Ok(())
    }

    /// Execute `records` in order. `base` is the index of `records[0]` in
    /// the execute buffer, used for the marker positions in the report.
    /// Payloads are dropped after their record runs when `consume_payloads`
    /// is set; otherwise they stay for replay.
    pub fn dispatch(
        &mut self,
        records: &mut [CommandRecord],
        base: usize,
        consume_payloads: bool,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (i, record) in records.iter_mut().enumerate() {
            match record.opcode {
                Opcode::BeginPaint => report.begin_paint = Some(base + i + 1),
                Opcode::TextureComplete => {
                    self.complete_frame();
                    report.texture_complete = Some(base + i + 1);
                    report.frames_finalized += 1;
                }
                _ => {
                    self.execute(record);
                }
            }

            if consume_payloads {
                drop(record.take_payload());
            }
            if self.poll_errors {
                self.errors |= self.driver.poll_error();
            }
            report.executed += 1;
        }

        bump(&self.stats.records_dispatched, report.executed as u64);
        trace!(?report, "dispatched");
        report
    }

    /// Execute one synchronous record and return its value. Errors raised
    /// before and during the call accumulate into the sticky flags.
    pub fn execute_sync(&mut self, record: &mut CommandRecord) -> Option<SyncValue> {
        self.errors |= self.driver.poll_error();

        let value = match record.opcode {
            Opcode::GetError => None,
            Opcode::Finish => {
                self.driver.finish();
                None
            }
            Opcode::ReadPixels
                if self.current_framebuffer.is_null() && self.swap_chain.is_exclusive() =>
            {
                // Read what the default framebuffer would show, not the
                // multisampled target.
                let surface = self.swap_chain.readback_surface(&mut self.driver);
                self.driver.bind_surface(surface);
                let value = self.execute(record);
                self.swap_chain.bind_default(&mut self.driver);
                value
            }
            _ => self.execute(record),
        };

        self.errors |= self.driver.poll_error();
        drop(record.take_payload());
        value
    }

    /// Re-query every host texture provider. Changed bindings are applied
    /// through rebind records; returns how many changed.
    pub fn refresh_host_textures(&mut self) -> usize {
        let changed = self.host_textures.refresh(&self.table);
        for (handle, native) in &changed {
            let record = CommandRecord::new(
                Opcode::RebindHostTexture,
                &[Slot::handle(*handle), Slot::uint(native.raw())],
            );
            self.execute(&record);
            self.rebound.push(*native);
        }
        changed.len()
    }

    /// Send `ResourceResolved` for host textures rebound since the last call.
    /// The handle is recovered from the native texture, so a handle deleted
    /// by the records that ran in between is not announced.
    pub fn announce_resolved(&mut self) -> usize {
        let mut announced = 0;
        for native in std::mem::take(&mut self.rebound) {
            let handle = self.table.reverse(native, ResourceKind::HostTexture);
            if handle.is_null() {
                continue;
            }
            self.notifier.notify(Notification::ResourceResolved(handle));
            announced += 1;
        }
        announced
    }

    /// Destroy every native object the handle table knows about and every
    /// swap-chain surface. Returns the number of objects destroyed.
    pub fn teardown(&mut self) -> usize {
        let mut destroyed = 0;
        for (handle, native, kind) in self.table.drain() {
            if !native.is_null() && kind.has_native_destructor() {
                trace!("teardown {} {:?} -> {:?}", kind, handle, native);
                self.driver.delete_resource(kind, native);
                destroyed += 1;
            }
        }
        self.swap_chain.release(&mut self.driver);
        self.host_textures.clear();
        self.rebound.clear();
        self.errors = ErrorFlags::empty();
        self.current_framebuffer = VirtualHandle::NULL;
        destroyed
    }

    fn complete_frame(&mut self) {
        if let Some((texture, size)) = self.swap_chain.finalize(&mut self.driver) {
            self.notifier
                .notify(Notification::TextureReady { texture, size });
        }
        bump(&self.stats.frames_finalized, 1);
        self.bind_current_target();
    }

    fn bind_current_target(&mut self) {
        if self.current_framebuffer.is_null() {
            self.swap_chain.bind_default(&mut self.driver);
            return;
        }
        let native = self.table.resolve(self.current_framebuffer);
        if let Err(e) = self
            .driver
            .bind_resource(ResourceKind::Framebuffer, gl::FRAMEBUFFER, native)
        {
            self.driver_failed(Opcode::BindFramebuffer, e);
        }
    }

    fn execute(&mut self, record: &CommandRecord) -> Option<SyncValue> {
        let opcode = record.opcode;
        let info = opcode.info();
        trace!(?opcode, words = ?record.words(), "execute");

        if opcode == Opcode::RebindHostTexture {
            let handle = VirtualHandle(record.slot(0).as_uint());
            let native = NativeHandle(record.slot(1).as_uint());
            if let Err(e) = self.table.bind(handle, native, ResourceKind::HostTexture) {
                debug!("host texture {:?} not rebound: {}", handle, e);
            }
            return None;
        }
        if let Some(kind) = info.creates {
            self.create(record, &info, kind);
            return None;
        }
        if let Some(kind) = info.deletes {
            self.delete(record, kind);
            return None;
        }
        if let Some(kind) = info.binds {
            self.bind(record, &info, kind);
            return None;
        }

        let mut args = [Arg::Int(0); MAX_SLOTS];
        let count = self.resolve_args(record, &info, 0, &mut args)?;
        match self
            .driver
            .issue(opcode, &args[..count], record.payload_bytes())
        {
            Ok(value) => value,
            Err(e) => {
                self.driver_failed(opcode, e);
                None
            }
        }
    }

    fn create(&mut self, record: &CommandRecord, info: &OpcodeInfo, kind: ResourceKind) {
        let handle = record.slot(0).as_handle();
        if !self.table.contains(handle) {
            // Released before this record ran (deleted, or the context was lost)
            debug!("{} for released handle {:?} skipped", record.opcode, handle);
            return;
        }
        if self.table.is_bound(handle) {
            trace!("{:?} already created", handle);
            return;
        }

        let mut args = [Arg::Int(0); MAX_SLOTS];
        let Some(count) = self.resolve_args(record, info, 1, &mut args) else {
            return;
        };
        match self
            .driver
            .create_resource(kind, &args[..count], record.payload_bytes())
        {
            Ok(native) => {
                if let Err(e) = self.table.bind(handle, native, kind) {
                    warn!("created {} {:?} could not be bound: {}", kind, native, e);
                    self.driver.delete_resource(kind, native);
                }
            }
            Err(e) => self.driver_failed(record.opcode, e),
        }
    }

    fn delete(&mut self, record: &CommandRecord, kind: ResourceKind) {
        let handle = record.slot(0).as_handle();
        let native = match self.table.lookup(handle, kind) {
            Ok(native) => native,
            Err(e) => {
                trace!("{} skipped: {}", record.opcode, e);
                return;
            }
        };

        if !native.is_null() && kind.has_native_destructor() {
            self.driver.delete_resource(kind, native);
        }
        self.table.release(handle);

        match kind {
            ResourceKind::HostTexture => self.host_textures.remove(handle),
            ResourceKind::Framebuffer if handle == self.current_framebuffer => {
                self.current_framebuffer = VirtualHandle::NULL;
                self.swap_chain.bind_default(&mut self.driver);
            }
            _ => {}
        }
    }

    fn bind(&mut self, record: &CommandRecord, info: &OpcodeInfo, kind: ResourceKind) {
        let handle_index = info
            .slots
            .iter()
            .position(|s| matches!(s, SlotKind::Handle(_)))
            .unwrap_or(0);
        let target = info
            .slots
            .iter()
            .position(|s| *s == SlotKind::Int)
            .map(|i| record.slot(i).as_uint())
            .unwrap_or(0);
        let handle = record.slot(handle_index).as_handle();
        let kind = match (kind, self.table.kind_of(handle)) {
            (ResourceKind::Texture, Some(ResourceKind::HostTexture)) => ResourceKind::HostTexture,
            _ => kind,
        };

        let native = match self.table.lookup(handle, kind) {
            Ok(native) => native,
            Err(e) => {
                debug!("{}: {}", record.opcode, e);
                self.errors |= ErrorFlags::INVALID_OPERATION;
                return;
            }
        };

        if kind == ResourceKind::Framebuffer {
            self.current_framebuffer = handle;
            if handle.is_null() {
                self.swap_chain.bind_default(&mut self.driver);
                return;
            }
        }

        if let Err(e) = self.driver.bind_resource(kind, target, native) {
            self.driver_failed(record.opcode, e);
        }
    }

    /// Resolve slots `skip..` of `record` into `out`. Returns the number of
    /// arguments written, or `None` if a handle could not be resolved.
    fn resolve_args(
        &mut self,
        record: &CommandRecord,
        info: &OpcodeInfo,
        skip: usize,
        out: &mut [Arg; MAX_SLOTS],
    ) -> Option<usize> {
        for (i, kind) in info.slots.iter().enumerate().skip(skip) {
            let slot = record.slot(i);
            out[i - skip] = match *kind {
                SlotKind::Int => Arg::Int(slot.as_int()),
                SlotKind::Float => Arg::Float(slot.as_float()),
                SlotKind::Handle(_) if info.lenient_handles => {
                    Arg::Native(self.table.resolve(slot.as_handle()))
                }
                SlotKind::Handle(expected) => match self.table.lookup(slot.as_handle(), expected) {
                    Ok(native) => Arg::Native(native),
                    Err(e) => {
                        debug!("{} argument {}: {}", record.opcode, i, e);
                        self.errors |= ErrorFlags::INVALID_OPERATION;
                        return None;
                    }
                },
            };
        }
        Some(info.slots.len().saturating_sub(skip))
    }

    fn driver_failed(&mut self, opcode: Opcode, error: DriverError) {
        match error {
            DriverError::Unsupported(_) => {
                warn!("{} is not supported by the driver; skipped", opcode)
            }
            other => {
                debug!("{} failed: {}", opcode, other);
                self.errors |= other.error_flags();
            }
        }
    }
}
