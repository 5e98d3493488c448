use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use glq_protocol::handle::SurfaceSize;
use tracing::{error, info, warn};

use crate::driver::Driver;
use crate::error::{RendererError, ScheduleError};
use crate::queue::TransferBatch;
use crate::renderer::Renderer;
use crate::sync::{RenderJob, RenderScheduler};

enum RenderMsg {
    Frame(TransferBatch),
    Job(RenderJob),
    HostFrame,
    Initialize(SurfaceSize),
    Resize(SurfaceSize),
    /// Tear down; the sender, if any, is signalled once teardown is done.
    Invalidate(Option<Sender<()>>),
    Shutdown,
}

/// A dedicated render thread owning the [`Renderer`] and its driver.
///
/// Messages are processed in order. The channel is bounded, so the control
/// plane blocks once `max_frames_in_flight` messages are waiting.
pub struct RenderThread {
    sender: Sender<RenderMsg>,
    live: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn<D>(renderer: Renderer<D>, frames_in_flight: usize) -> Result<Self, RendererError>
    where
        D: Driver + Send + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded(frames_in_flight.max(1));
        let live = renderer.live_flag();
        let handle = std::thread::Builder::new()
            .name("glq-render".into())
            .spawn(move || run(renderer, receiver))?;
        Ok(Self {
            sender,
            live,
            handle: Some(handle),
        })
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Drive one host frame (shared surfaces).
    pub fn host_frame(&self) {
        self.send(RenderMsg::HostFrame);
    }

    /// The host lost its surface. Teardown happens on the render thread and
    /// the control plane learns about it through a notification.
    pub fn host_surface_invalidated(&self) {
        self.live.store(false, Ordering::Release);
        self.send(RenderMsg::Invalidate(None));
    }

    fn send(&self, msg: RenderMsg) -> bool {
        if self.sender.send(msg).is_err() {
            warn!("render thread has exited; message dropped");
            return false;
        }
        true
    }
}

impl RenderScheduler for RenderThread {
    fn submit_frame(&self, batch: TransferBatch) {
        self.send(RenderMsg::Frame(batch));
    }

    fn schedule_job(&self, job: RenderJob) -> Result<(), ScheduleError> {
        if !self.is_live() {
            return Err(ScheduleError::NotLive);
        }
        self.sender
            .send(RenderMsg::Job(job))
            .map_err(|_| ScheduleError::Disconnected)
    }

    fn runs_inline(&self) -> bool {
        false
    }

    fn initialize(&self, size: SurfaceSize) {
        // Jobs scheduled right after this are queued behind the initialize
        // message; the render thread clears the flag again if it fails.
        self.live.store(true, Ordering::Release);
        self.send(RenderMsg::Initialize(size));
    }

    fn resize(&self, size: SurfaceSize) {
        self.send(RenderMsg::Resize(size));
    }

    fn invalidate(&self) {
        self.live.store(false, Ordering::Release);
        let (ack, done) = crossbeam_channel::bounded(1);
        if self.send(RenderMsg::Invalidate(Some(ack))) {
            let _ = done.recv();
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        let _ = self.sender.send(RenderMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("render thread panicked");
            }
        }
    }
}

fn run<D: Driver>(mut renderer: Renderer<D>, receiver: Receiver<RenderMsg>) {
    info!("render thread started");
    while let Ok(msg) = receiver.recv() {
        match msg {
            RenderMsg::Frame(batch) => renderer.render_frame(batch),
            RenderMsg::Job(job) => renderer.execute_job(job),
            RenderMsg::HostFrame => {
                renderer.before_host_frame();
                renderer.after_host_frame();
            }
            RenderMsg::Initialize(size) => {
                if let Err(e) = renderer.initialize(size) {
                    error!("renderer initialization failed: {}", e);
                }
            }
            RenderMsg::Resize(size) => {
                if let Err(e) = renderer.resize(size) {
                    warn!("resize failed; keeping previous surfaces: {}", e);
                }
            }
            RenderMsg::Invalidate(ack) => {
                renderer.host_surface_invalidated();
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            RenderMsg::Shutdown => break,
        }
    }
    renderer.shutdown();
    info!("render thread stopped");
}
