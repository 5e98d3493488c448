use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glq_core::config::{GlqConfig, HostLayer, SurfaceMode};
use glq_protocol::gl;
use glq_core::ResourceHandleTable;
use glq_protocol::handle::SurfaceSize;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::driver::Driver;
use crate::error::RendererError;
use crate::execute::ExecuteBuffer;
use crate::frame::{FpsCounter, FrameOptions, SwapChain, ALL_BUFFERS};
use crate::notify::{Notification, Notifier};
use crate::queue::TransferBatch;
use crate::stats::{bump, RendererStats};
use crate::sync::{RenderJob, SyncReply};

/// The execution plane: receives transferred batches and runs them against
/// the driver, either once per frame (exclusive surfaces) or on every host
/// frame (shared surfaces).
pub struct Renderer<D> {
    dispatcher: Dispatcher<D>,
    buffer: ExecuteBuffer,
    mode: SurfaceMode,
    layer: HostLayer,
    live: Arc<AtomicBool>,
    first_cycle_pending: bool,
    /// Set by the host frame loop before it draws.
    host_frame_started: Option<Instant>,
    fps: FpsCounter,
    notifier: Notifier,
    stats: Arc<RendererStats>,
}

impl<D: Driver> Renderer<D> {
    pub fn new(
        driver: D,
        table: Arc<ResourceHandleTable>,
        config: &GlqConfig,
        notifier: Notifier,
        stats: Arc<RendererStats>,
    ) -> Self {
        let options = FrameOptions::from_config(config);
        let dispatcher = Dispatcher::new(
            driver,
            table,
            SwapChain::new(options),
            config.diagnostics.poll_errors_per_command,
            notifier.clone(),
            stats.clone(),
        );
        Self {
            dispatcher,
            buffer: ExecuteBuffer::new(),
            mode: config.surface.mode,
            layer: config.surface.layer,
            live: Arc::new(AtomicBool::new(false)),
            first_cycle_pending: false,
            host_frame_started: None,
            fps: FpsCounter::new(Duration::from_millis(config.diagnostics.fps_interval_ms)),
            notifier,
            stats,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<D> {
        &self.dispatcher
    }

    pub fn driver(&self) -> &D {
        self.dispatcher.driver()
    }

    pub fn driver_mut(&mut self) -> &mut D {
        self.dispatcher.driver_mut()
    }

    pub fn buffer(&self) -> &ExecuteBuffer {
        &self.buffer
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Liveness flag shared with schedulers that check it from another thread.
    pub fn live_flag(&self) -> Arc<AtomicBool> {
        self.live.clone()
    }

    /// Provision surfaces at `size`, clamped to what the driver supports.
    pub fn initialize(&mut self, size: SurfaceSize) -> Result<(), RendererError> {
        let max = self.dispatcher.driver().max_surface_size();
        let clamped = size.clamp_to(max);
        if clamped != size {
            warn!(
                "requested {}x{} clamped to {}x{}",
                size.width, size.height, clamped.width, clamped.height
            );
        }

        if let Err(e) = self.dispatcher.provision(clamped) {
            self.live.store(false, Ordering::Release);
            return Err(e.into());
        }
        self.live.store(true, Ordering::Release);
        self.first_cycle_pending = true;
        info!(
            width = clamped.width,
            height = clamped.height,
            mode = ?self.mode,
            "renderer initialized"
        );
        Ok(())
    }

    /// Resize the swap chain without restarting the context. Ignored while
    /// the renderer is not live.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), RendererError> {
        if !self.is_live() {
            debug!("renderer not live; resize ignored");
            return Ok(());
        }
        let clamped = size.clamp_to(self.dispatcher.driver().max_surface_size());
        if clamped == self.dispatcher.swap_chain().size() {
            return Ok(());
        }
        self.dispatcher.resize(clamped)?;
        info!(width = clamped.width, height = clamped.height, "surfaces resized");
        Ok(())
    }

    /// Move a batch into the execute buffer.
    pub fn transfer(&mut self, batch: TransferBatch) {
        let requests = self.buffer.transfer_batch(batch, self.mode);
        self.dispatcher.host_textures().merge(requests);
    }

    /// Transfer and, for exclusive surfaces, execute one frame's commands.
    pub fn render_frame(&mut self, batch: TransferBatch) {
        if !self.is_live() {
            self.drop_batch(batch);
            return;
        }
        self.transfer(batch);
        if self.mode == SurfaceMode::Exclusive {
            let started = Instant::now();
            let report = self.dispatch_pending();
            self.finish_cycle(report, started);
        }
    }

    /// Run a synchronous job: everything queued before it, then its command.
    pub fn execute_job(&mut self, job: RenderJob) {
        if !self.is_live() {
            bump(&self.stats.jobs_abandoned, 1);
            debug!("renderer not live; job abandoned");
            return;
        }

        let started = Instant::now();
        let (batch, command, reply) = job.into_parts();
        self.transfer(batch);
        let report = self.dispatch_pending();
        if self.mode == SurfaceMode::Shared {
            // Shared-mode frames are sealed by the host frame loop
            self.apply_markers(&report);
        }
        self.finish_cycle(report, started);

        let value = command.and_then(|mut record| self.dispatcher.execute_sync(&mut record));
        bump(&self.stats.sync_jobs, 1);
        reply.send(SyncReply {
            value,
            errors: self.dispatcher.take_errors(),
        });
    }

    /// Host frame loop, before the host draws: clear the shared surface.
    /// A foreground layer keeps the host's color.
    pub fn before_host_frame(&mut self) {
        if self.is_live() && self.mode == SurfaceMode::Shared {
            self.host_frame_started = Some(Instant::now());
            let mask = match self.layer {
                HostLayer::Background => ALL_BUFFERS,
                HostLayer::Foreground => gl::DEPTH_BUFFER_BIT | gl::STENCIL_BUFFER_BIT,
            };
            self.dispatcher.driver_mut().clear_surface(None, mask);
        }
    }

    /// Host frame loop, after the host draws: run new commands once, or
    /// replay the last complete frame when nothing new arrived.
    pub fn after_host_frame(&mut self) {
        if !self.is_live() || self.mode != SurfaceMode::Shared {
            return;
        }

        let started = self.host_frame_started.take().unwrap_or_else(Instant::now);
        let rebinds = self.dispatcher.refresh_host_textures();
        let pending = self.buffer.pending_range();
        let report = if pending.is_empty() {
            let range = self.buffer.frame_range();
            let base = range.start;
            self.dispatcher
                .dispatch(self.buffer.records_mut(range), base, false)
        } else {
            let base = pending.start;
            let end = pending.end;
            let report = self
                .dispatcher
                .dispatch(self.buffer.records_mut(pending), base, false);
            self.buffer.mark_dispatched(end);
            self.apply_markers(&report);
            report
        };
        debug!(
            executed = report.executed,
            rebinds,
            "host frame"
        );
        self.finish_cycle(report, started);
    }

    /// The host destroyed the surface or context: destroy every resource,
    /// stop executing, and tell the control plane.
    pub fn host_surface_invalidated(&mut self) {
        let was_live = self.live.swap(false, Ordering::AcqRel);
        let destroyed = self.dispatcher.teardown();
        self.buffer.clear();
        self.first_cycle_pending = false;
        self.host_frame_started = None;
        info!(destroyed, "renderer torn down");
        if was_live {
            self.notifier.notify(Notification::ContextLost);
        }
    }

    pub fn shutdown(&mut self) {
        if self.is_live() {
            self.host_surface_invalidated();
        }
        self.stats.log_snapshot();
        let outstanding = self.stats.payloads.outstanding();
        if outstanding > 0 {
            warn!(outstanding, "payloads still held at shutdown");
        }
    }

    fn dispatch_pending(&mut self) -> DispatchReport {
        self.dispatcher.refresh_host_textures();
        let range = self.buffer.pending_range();
        let base = range.start;
        let end = range.end;
        let consume = self.mode == SurfaceMode::Exclusive;
        let report = self
            .dispatcher
            .dispatch(self.buffer.records_mut(range), base, consume);
        if consume {
            self.buffer.clear();
        } else {
            self.buffer.mark_dispatched(end);
        }
        report
    }

    fn apply_markers(&mut self, report: &DispatchReport) {
        if let Some(start) = report.begin_paint {
            self.buffer.set_start(start);
        }
        if let Some(end) = report.texture_complete {
            self.buffer.set_end(end);
            self.buffer.seal();
        }
    }

    /// Bookkeeping after a dispatch pass that began at `started`.
    fn finish_cycle(&mut self, report: DispatchReport, started: Instant) {
        self.dispatcher.announce_resolved();
        let now = Instant::now();
        if report.frames_finalized > 0 {
            self.stats.record_frame_time(now.saturating_duration_since(started));
        }
        for _ in 0..report.frames_finalized {
            if let Some(fps) = self.fps.tick_at(now) {
                self.notifier.notify(Notification::FpsChanged(fps));
            }
        }
        if self.first_cycle_pending {
            self.first_cycle_pending = false;
            self.notifier.notify(Notification::ContextRestored);
        }
    }

    fn drop_batch(&mut self, batch: TransferBatch) {
        if !batch.is_empty() {
            debug!(records = batch.len(), "renderer not live; batch dropped");
            bump(&self.stats.records_dropped, batch.len() as u64);
        }
    }
}
