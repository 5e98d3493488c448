use std::cell::RefCell;

use glq_protocol::handle::SurfaceSize;
use tracing::{error, warn};

use crate::driver::Driver;
use crate::error::ScheduleError;
use crate::queue::TransferBatch;
use crate::renderer::Renderer;
use crate::sync::{RenderJob, RenderScheduler};

/// Runs the execution plane on the calling thread. Frames render as soon as
/// they are submitted and jobs complete before `schedule_job` returns.
pub struct InlineScheduler<D> {
    renderer: RefCell<Renderer<D>>,
}

impl<D: Driver> InlineScheduler<D> {
    pub fn new(renderer: Renderer<D>) -> Self {
        Self {
            renderer: RefCell::new(renderer),
        }
    }

    pub fn host_frame(&self) {
        let mut renderer = self.renderer.borrow_mut();
        renderer.before_host_frame();
        renderer.after_host_frame();
    }

    pub fn host_surface_invalidated(&self) {
        self.renderer.borrow_mut().host_surface_invalidated();
    }

    pub fn shutdown(&self) {
        self.renderer.borrow_mut().shutdown();
    }

    pub fn with_renderer<R>(&self, f: impl FnOnce(&mut Renderer<D>) -> R) -> R {
        f(&mut self.renderer.borrow_mut())
    }
}

impl<D: Driver> RenderScheduler for InlineScheduler<D> {
    fn submit_frame(&self, batch: TransferBatch) {
        self.renderer.borrow_mut().render_frame(batch);
    }

    fn schedule_job(&self, job: RenderJob) -> Result<(), ScheduleError> {
        let mut renderer = self.renderer.borrow_mut();
        if !renderer.is_live() {
            return Err(ScheduleError::NotLive);
        }
        renderer.execute_job(job);
        Ok(())
    }

    fn runs_inline(&self) -> bool {
        true
    }

    fn initialize(&self, size: SurfaceSize) {
        if let Err(e) = self.renderer.borrow_mut().initialize(size) {
            error!("renderer initialization failed: {}", e);
        }
    }

    fn resize(&self, size: SurfaceSize) {
        if let Err(e) = self.renderer.borrow_mut().resize(size) {
            warn!("resize failed; keeping previous surfaces: {}", e);
        }
    }

    fn invalidate(&self) {
        self.renderer.borrow_mut().host_surface_invalidated();
    }
}
