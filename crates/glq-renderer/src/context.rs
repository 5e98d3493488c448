//! Control-plane API.
//!
//! A [`Context`] validates calls, queues them as command records and hands
//! them to a [`RenderScheduler`]. Asynchronous calls return immediately;
//! queries block until the execution plane has run everything queued before
//! them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use glq_core::config::GlqConfig;
use glq_core::ResourceHandleTable;
use glq_protocol::command::{CommandRecord, Slot};
use glq_protocol::error::{ErrorFlags, GlError, ProtocolError};
use glq_protocol::gl;
use glq_protocol::handle::{NativeHandle, ResourceKind, SurfaceSize, VirtualHandle};
use glq_protocol::opcode::{CommandClass, Opcode, OpcodeInfo, PayloadRule, SlotKind};
use glq_protocol::value::SyncValue;
use tracing::{debug, warn};

use crate::driver::Driver;
use crate::error::{ContextError, RendererError};
use crate::host::HostTextureProvider;
use crate::inline::InlineScheduler;
use crate::lifecycle::{Generation, Lifecycle, LifecycleError, LifecycleState};
use crate::notify::{self, Notification, Notifier};
use crate::queue::{CommandQueue, QueueFullListener, TransferBatch};
use crate::render_thread::RenderThread;
use crate::renderer::Renderer;
use crate::stats::{bump, RendererStats};
use crate::sync::{self, RenderJob, RenderScheduler, SyncOutcome};

/// Notifications kept for a caller that never polls; older ones are dropped.
const MAX_PENDING_NOTIFICATIONS: usize = 1024;

struct ResourceInner {
    handle: VirtualHandle,
    kind: ResourceKind,
    generation: Arc<Generation>,
    deleted: AtomicBool,
}

/// A resource object handed to the caller. Cheap to clone; all clones
/// refer to the same resource.
#[derive(Clone)]
pub struct Resource(Arc<ResourceInner>);

impl Resource {
    fn new(handle: VirtualHandle, kind: ResourceKind, generation: Arc<Generation>) -> Self {
        Self(Arc::new(ResourceInner {
            handle,
            kind,
            generation,
            deleted: AtomicBool::new(false),
        }))
    }

    pub fn handle(&self) -> VirtualHandle {
        self.0.handle
    }

    pub fn kind(&self) -> ResourceKind {
        self.0.kind
    }

    pub fn generation(&self) -> u64 {
        self.0.generation.id()
    }

    pub fn is_deleted(&self) -> bool {
        self.0.deleted.load(Ordering::Acquire)
    }

    /// Usable with the context whose current generation is `current`.
    fn is_valid_for(&self, current: &Arc<Generation>) -> bool {
        Arc::ptr_eq(&self.0.generation, current) && current.is_valid() && !self.is_deleted()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({:?}, gen {}{})",
            self.0.kind,
            self.0.handle,
            self.0.generation.id(),
            if self.is_deleted() { ", deleted" } else { "" }
        )
    }
}

/// One argument of a queued call.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Int(i32),
    Uint(u32),
    Float(f32),
    /// A resource slot; `None` is the null object (e.g. unbinding).
    Object(Option<&'a Resource>),
}

pub struct Context<S> {
    scheduler: S,
    queue: CommandQueue,
    lifecycle: Lifecycle,
    errors: ErrorFlags,
    lost_reported: bool,
    notifications: Receiver<Notification>,
    /// Applied notifications not yet handed to the caller.
    pending: VecDeque<Notification>,
    stats: Arc<RendererStats>,
    config: GlqConfig,
    fps: u32,
    display: Option<(NativeHandle, SurfaceSize)>,
}

impl Context<RenderThread> {
    /// A context whose execution plane runs on a dedicated render thread.
    pub fn threaded<D>(driver: D, config: &GlqConfig) -> Result<Self, RendererError>
    where
        D: Driver + Send + 'static,
    {
        Self::assemble(config, |table, notifier, stats| {
            let renderer = Renderer::new(driver, table, config, notifier, stats);
            RenderThread::spawn(renderer, config.queue.max_frames_in_flight)
        })
    }
}

impl<D: Driver> Context<InlineScheduler<D>> {
    /// A context whose execution plane runs on the calling thread.
    pub fn inline(driver: D, config: &GlqConfig) -> Self {
        let assembled: Result<Self, std::convert::Infallible> =
            Self::assemble(config, |table, notifier, stats| {
                Ok(InlineScheduler::new(Renderer::new(
                    driver, table, config, notifier, stats,
                )))
            });
        match assembled {
            Ok(context) => context,
            Err(never) => match never {},
        }
    }
}

impl<S: RenderScheduler> Context<S> {
    fn assemble<E>(
        config: &GlqConfig,
        make: impl FnOnce(Arc<ResourceHandleTable>, Notifier, Arc<RendererStats>) -> Result<S, E>,
    ) -> Result<Self, E> {
        let table = Arc::new(ResourceHandleTable::new());
        let stats = Arc::new(RendererStats::new());
        let (notifier, notifications) = notify::channel();
        let scheduler = make(table.clone(), notifier, stats.clone())?;
        Ok(Self {
            scheduler,
            queue: CommandQueue::new(table, &config.queue, stats.clone()),
            lifecycle: Lifecycle::new(),
            errors: ErrorFlags::empty(),
            lost_reported: false,
            notifications,
            pending: VecDeque::new(),
            stats,
            config: config.clone(),
            fps: 0,
            display: None,
        })
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<RendererStats> {
        &self.stats
    }

    pub fn config(&self) -> &GlqConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_context_lost(&self) -> bool {
        self.lifecycle.is_lost()
    }

    /// Last frame rate reported by the execution plane.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Texture and size of the most recent displayable frame.
    pub fn display_texture(&self) -> Option<(NativeHandle, SurfaceSize)> {
        self.display
    }

    // ---- lifecycle ----

    /// Create the first context at `size`.
    pub fn activate(&mut self, size: SurfaceSize) -> Result<(), ContextError> {
        if self.lifecycle.state() != LifecycleState::None {
            return Err(LifecycleError::InvalidTransition {
                from: self.lifecycle.state(),
                to: LifecycleState::Restoring,
            }
            .into());
        }
        self.lifecycle.begin()?;
        self.scheduler.initialize(size);
        Ok(())
    }

    /// Resize the drawing surfaces. Commands queued so far are handed over
    /// first so they run against the old surfaces. A failed resize keeps
    /// the old surfaces and reports `OUT_OF_MEMORY` through `get_error`.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), ContextError> {
        self.ensure_active()?;
        let batch = self.queue.take_batch();
        if !batch.is_empty() {
            self.scheduler.submit_frame(batch);
        }
        self.scheduler.resize(size);
        self.apply_notifications();
        Ok(())
    }

    /// Force a context loss from the control plane.
    pub fn lose_context(&mut self) {
        if !matches!(
            self.lifecycle.state(),
            LifecycleState::Alive | LifecycleState::Restoring
        ) {
            return;
        }
        self.queue.discard_pending();
        self.scheduler.invalidate();
        self.apply_notifications();
        self.apply_context_lost();
    }

    /// Acquire a new context after a loss. Objects from before the loss stay
    /// invalid.
    pub fn restore(&mut self, size: SurfaceSize) -> Result<(), ContextError> {
        self.lifecycle.begin()?;
        self.queue.reset(self.config.queue.initial_capacity);
        self.errors = ErrorFlags::empty();
        self.scheduler.initialize(size);
        Ok(())
    }

    /// Notifications received since the last call, oldest first. Their
    /// effect on the context (loss, frame rate, display texture) has
    /// already been applied.
    pub fn poll_notifications(&mut self) -> Vec<Notification> {
        self.apply_notifications();
        self.pending.drain(..).collect()
    }

    fn apply_notifications(&mut self) {
        let drained: Vec<Notification> = self.notifications.try_iter().collect();
        for notification in drained {
            match &notification {
                Notification::ContextLost => self.apply_context_lost(),
                Notification::ContextRestored => {
                    if self.lifecycle.state() == LifecycleState::Restoring {
                        if let Err(e) = self.lifecycle.mark_alive() {
                            debug!("restore notification ignored: {}", e);
                        }
                    }
                }
                Notification::FpsChanged(fps) => self.fps = *fps,
                Notification::TextureReady { texture, size } => {
                    self.display = Some((*texture, *size));
                }
                Notification::ResourceResolved(_) => {}
            }
            if self.pending.len() >= MAX_PENDING_NOTIFICATIONS {
                self.pending.pop_front();
            }
            self.pending.push_back(notification);
        }
    }

    fn apply_context_lost(&mut self) {
        if !matches!(
            self.lifecycle.state(),
            LifecycleState::Alive | LifecycleState::Restoring
        ) {
            return;
        }
        if let Err(e) = self.lifecycle.lose() {
            debug!("context loss ignored: {}", e);
            return;
        }
        self.errors = ErrorFlags::empty();
        self.lost_reported = false;
        self.display = None;
        let dropped = self.queue.discard_pending();
        warn!(dropped, "context lost");
    }

    fn ensure_active(&self) -> Result<(), ContextError> {
        match self.lifecycle.state() {
            LifecycleState::None => Err(ContextError::NoContext),
            LifecycleState::Lost => Err(ContextError::ContextLost),
            LifecycleState::Restoring | LifecycleState::Alive => Ok(()),
        }
    }

    // ---- resources ----

    fn create(
        &mut self,
        kind: ResourceKind,
        extra: &[Slot],
        payload: Option<Vec<u8>>,
    ) -> Result<Resource, ContextError> {
        self.ensure_active()?;
        let opcode = Opcode::create_for(kind).ok_or(ProtocolError::WrongClass {
            opcode: Opcode::delete_for(kind),
        })?;
        let handle = self.queue.allocate_handle(kind)?;

        let mut slots = Vec::with_capacity(extra.len() + 1);
        slots.push(Slot::handle(handle));
        slots.extend_from_slice(extra);
        self.push(opcode, &slots, payload);

        Ok(Resource::new(
            handle,
            kind,
            self.lifecycle.generation().clone(),
        ))
    }

    pub fn create_buffer(&mut self) -> Result<Resource, ContextError> {
        self.create(ResourceKind::Buffer, &[], None)
    }

    pub fn create_texture(&mut self) -> Result<Resource, ContextError> {
        self.create(ResourceKind::Texture, &[], None)
    }

    pub fn create_framebuffer(&mut self) -> Result<Resource, ContextError> {
        self.create(ResourceKind::Framebuffer, &[], None)
    }

    pub fn create_renderbuffer(&mut self) -> Result<Resource, ContextError> {
        self.create(ResourceKind::Renderbuffer, &[], None)
    }

    pub fn create_shader(&mut self, shader_type: u32) -> Result<Resource, ContextError> {
        self.create(ResourceKind::Shader, &[Slot::uint(shader_type)], None)
    }

    pub fn create_program(&mut self) -> Result<Resource, ContextError> {
        self.create(ResourceKind::Program, &[], None)
    }

    /// Queue a uniform location lookup. The location resolves on the
    /// execution plane; a lookup that fails there leaves it null. An
    /// invalid program sets `INVALID_OPERATION` and yields no location.
    pub fn get_uniform_location(
        &mut self,
        program: &Resource,
        name: &str,
    ) -> Result<Option<Resource>, ContextError> {
        self.ensure_active()?;
        if !self.check_object(program, ResourceKind::Program) {
            self.errors |= ErrorFlags::INVALID_OPERATION;
            return Ok(None);
        }
        self.create(
            ResourceKind::UniformLocation,
            &[Slot::handle(program.handle())],
            Some(name.as_bytes().to_vec()),
        )
        .map(Some)
    }

    /// Make a host-owned texture sampleable through a resource object. The
    /// provider is held weakly; once it is dropped the binding goes away.
    pub fn bind_host_texture(
        &mut self,
        provider: &Arc<dyn HostTextureProvider>,
    ) -> Result<Resource, ContextError> {
        self.ensure_active()?;
        let handle = self.queue.allocate_handle(ResourceKind::HostTexture)?;
        self.queue.bind_host_texture(handle, provider);
        Ok(Resource::new(
            handle,
            ResourceKind::HostTexture,
            self.lifecycle.generation().clone(),
        ))
    }

    /// Queue destruction of `resource`. Deleting twice is a no-op.
    pub fn delete(&mut self, resource: &Resource) {
        if self.ensure_active().is_err() {
            return;
        }
        if !Arc::ptr_eq(&resource.0.generation, self.lifecycle.generation()) {
            self.errors |= ErrorFlags::INVALID_OPERATION;
            return;
        }
        if resource.0.deleted.swap(true, Ordering::AcqRel) {
            return;
        }
        self.push(
            Opcode::delete_for(resource.kind()),
            &[Slot::handle(resource.handle())],
            None,
        );
    }

    /// True if `resource` belongs to the current generation, is not deleted,
    /// and has `kind` (a host texture passes for a texture).
    fn check_object(&self, resource: &Resource, kind: ResourceKind) -> bool {
        let kind_ok = resource.kind() == kind
            || (kind == ResourceKind::Texture && resource.kind() == ResourceKind::HostTexture);
        kind_ok && resource.is_valid_for(self.lifecycle.generation())
    }

    // ---- queued calls ----

    /// Queue an asynchronous call after checking it against the opcode's
    /// schema. Calls are dropped while the context is lost; a call naming
    /// an invalid object sets `INVALID_OPERATION` and is not queued.
    pub fn enqueue(
        &mut self,
        opcode: Opcode,
        args: &[Value<'_>],
        payload: Option<Vec<u8>>,
    ) -> Result<(), ContextError> {
        let info = opcode.info();
        if info.class != CommandClass::Async || info.creates.is_some() || info.deletes.is_some() {
            return Err(ProtocolError::WrongClass { opcode }.into());
        }
        let slots = encode(opcode, &info, args, payload.is_some())?;

        match self.lifecycle.state() {
            LifecycleState::None => return Err(ContextError::NoContext),
            LifecycleState::Lost => return Ok(()),
            LifecycleState::Restoring | LifecycleState::Alive => {}
        }
        if !self.objects_valid(&info, args) {
            self.errors |= ErrorFlags::INVALID_OPERATION;
            return Ok(());
        }

        self.push(opcode, &slots, payload);
        Ok(())
    }

    fn objects_valid(&self, info: &OpcodeInfo, args: &[Value<'_>]) -> bool {
        info.slots.iter().zip(args).all(|(kind, value)| match (kind, value) {
            (SlotKind::Handle(kind), Value::Object(Some(resource))) => {
                self.check_object(resource, *kind)
            }
            _ => true,
        })
    }

    /// Append to the queue; a full queue flushes through a job first.
    fn push(&mut self, opcode: Opcode, slots: &[Slot], payload: Option<Vec<u8>>) -> bool {
        let payload = payload.map(|bytes| self.queue.payload(bytes));

        let scheduler = &self.scheduler;
        let stats = &self.stats;
        let errors = &mut self.errors;
        let mut flush = |queue: &mut CommandQueue| {
            let batch = queue.take_batch();
            debug!(records = batch.len(), "queue full; flushing");
            if let SyncOutcome::Completed(reply) = run_job(scheduler, stats, batch, None) {
                *errors |= reply.errors;
            }
        };
        let listener: &mut dyn QueueFullListener = &mut flush;

        match self.queue.enqueue_with(opcode, slots, Some(listener)) {
            Some(record) => {
                if let Some(payload) = payload {
                    record.set_payload(payload);
                }
                true
            }
            None => false,
        }
    }

    // ---- frames ----

    pub fn begin_frame(&mut self) {
        if self.ensure_active().is_ok() {
            self.push(Opcode::BeginPaint, &[], None);
        }
    }

    /// Close the frame and hand it to the execution plane.
    pub fn end_frame(&mut self) {
        if self.ensure_active().is_ok() {
            self.push(Opcode::TextureComplete, &[], None);
        }
        self.sync_frame();
    }

    /// Transfer everything queued so far without waiting for it to run.
    pub fn sync_frame(&mut self) {
        if self.ensure_active().is_ok() {
            let batch = self.queue.take_batch();
            if !batch.is_empty() {
                self.scheduler.submit_frame(batch);
            }
        } else {
            self.queue.discard_pending();
        }
        self.apply_notifications();
    }

    // ---- synchronous calls ----

    fn submit_sync(&mut self, command: Option<CommandRecord>) -> SyncOutcome {
        let batch = self.queue.take_batch();
        let outcome = run_job(&self.scheduler, &self.stats, batch, command);
        if let SyncOutcome::Completed(reply) = &outcome {
            self.errors |= reply.errors;
        }
        self.apply_notifications();
        outcome
    }

    /// Run a synchronous call and return its value. `Ok(None)` means the
    /// call failed on the execution plane and set an error.
    pub fn query(
        &mut self,
        opcode: Opcode,
        args: &[Value<'_>],
        payload: Option<Vec<u8>>,
    ) -> Result<Option<SyncValue>, ContextError> {
        let info = opcode.info();
        if info.class != CommandClass::Sync {
            return Err(ProtocolError::WrongClass { opcode }.into());
        }
        let slots = encode(opcode, &info, args, payload.is_some())?;
        self.ensure_active()?;
        if !info.lenient_handles && !self.objects_valid(&info, args) {
            self.errors |= ErrorFlags::INVALID_OPERATION;
            return Ok(None);
        }

        let mut record = CommandRecord::new(opcode, &slots);
        if let Some(bytes) = payload {
            record.set_payload(self.queue.payload(bytes));
        }
        match self.submit_sync(Some(record)) {
            SyncOutcome::Completed(reply) => Ok(reply.value),
            SyncOutcome::Abandoned => Err(ContextError::Abandoned),
        }
    }

    /// Pop one error, highest priority first. A lost context reports
    /// `ContextLost` once.
    pub fn get_error(&mut self) -> GlError {
        match self.lifecycle.state() {
            LifecycleState::Lost => {
                if !self.lost_reported {
                    self.lost_reported = true;
                    return GlError::ContextLost;
                }
            }
            LifecycleState::None => {}
            LifecycleState::Restoring | LifecycleState::Alive => {
                if let SyncOutcome::Abandoned =
                    self.submit_sync(Some(CommandRecord::new(Opcode::GetError, &[])))
                {
                    debug!("getError abandoned; reporting local errors only");
                }
            }
        }
        self.errors.take_one()
    }

    /// Block until every queued command has executed.
    pub fn finish(&mut self) -> Result<(), ContextError> {
        self.query(Opcode::Finish, &[], None).map(|_| ())
    }

    /// Read RGBA8 pixels from the current framebuffer.
    pub fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> Result<Vec<u8>, ContextError> {
        self.read_pixels_as(x, y, width, height, gl::RGBA, gl::UNSIGNED_BYTE)
    }

    pub fn read_pixels_as(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
    ) -> Result<Vec<u8>, ContextError> {
        let args = [
            Value::Int(x),
            Value::Int(y),
            Value::Int(width),
            Value::Int(height),
            Value::Uint(format),
            Value::Uint(ty),
        ];
        match self.query(Opcode::ReadPixels, &args, None)? {
            Some(SyncValue::Pixels(pixels)) => Ok(pixels),
            None => Ok(Vec::new()),
            Some(_) => Err(ContextError::UnexpectedReply("readPixels")),
        }
    }

    pub fn get_parameter(&mut self, pname: u32) -> Result<Option<SyncValue>, ContextError> {
        self.query(Opcode::GetParameter, &[Value::Uint(pname)], None)
    }

    pub fn get_shader_parameter(
        &mut self,
        shader: &Resource,
        pname: u32,
    ) -> Result<Option<SyncValue>, ContextError> {
        self.query(
            Opcode::GetShaderParameter,
            &[Value::Object(Some(shader)), Value::Uint(pname)],
            None,
        )
    }

    pub fn get_program_parameter(
        &mut self,
        program: &Resource,
        pname: u32,
    ) -> Result<Option<SyncValue>, ContextError> {
        self.query(
            Opcode::GetProgramParameter,
            &[Value::Object(Some(program)), Value::Uint(pname)],
            None,
        )
    }

    pub fn get_shader_info_log(&mut self, shader: &Resource) -> Result<Option<String>, ContextError> {
        let value = self.query(Opcode::GetShaderInfoLog, &[Value::Object(Some(shader))], None)?;
        text_reply(value, "getShaderInfoLog")
    }

    pub fn get_program_info_log(
        &mut self,
        program: &Resource,
    ) -> Result<Option<String>, ContextError> {
        let value = self.query(Opcode::GetProgramInfoLog, &[Value::Object(Some(program))], None)?;
        text_reply(value, "getProgramInfoLog")
    }

    pub fn get_attrib_location(&mut self, program: &Resource, name: &str) -> Result<i32, ContextError> {
        let value = self.query(
            Opcode::GetAttribLocation,
            &[Value::Object(Some(program))],
            Some(name.as_bytes().to_vec()),
        )?;
        Ok(value.and_then(|v| v.as_int()).unwrap_or(-1))
    }

    pub fn check_framebuffer_status(&mut self) -> Result<u32, ContextError> {
        let value = self.query(
            Opcode::CheckFramebufferStatus,
            &[Value::Uint(gl::FRAMEBUFFER)],
            None,
        )?;
        Ok(value.and_then(|v| v.as_int()).unwrap_or(0) as u32)
    }

    pub fn get_uniform(
        &mut self,
        program: &Resource,
        location: &Resource,
    ) -> Result<Option<SyncValue>, ContextError> {
        self.query(
            Opcode::GetUniform,
            &[Value::Object(Some(program)), Value::Object(Some(location))],
            None,
        )
    }

    /// Existence check. Deleted objects and objects from a previous
    /// generation report `false` without setting an error.
    pub fn is_resource(&mut self, resource: &Resource) -> Result<bool, ContextError> {
        let Some(opcode) = Opcode::existence_query(resource.kind()) else {
            return Ok(false);
        };
        if self.lifecycle.is_lost() || !resource.is_valid_for(self.lifecycle.generation()) {
            return Ok(false);
        }
        let value = self.query(opcode, &[Value::Object(Some(resource))], None)?;
        Ok(value.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    // ---- common asynchronous calls ----

    pub fn bind_buffer(&mut self, target: u32, buffer: Option<&Resource>) -> Result<(), ContextError> {
        self.enqueue(Opcode::BindBuffer, &[Value::Uint(target), Value::Object(buffer)], None)
    }

    pub fn buffer_data(&mut self, target: u32, data: Vec<u8>, usage: u32) -> Result<(), ContextError> {
        let size = data.len() as i32;
        self.enqueue(
            Opcode::BufferData,
            &[Value::Uint(target), Value::Int(size), Value::Uint(usage)],
            Some(data),
        )
    }

    pub fn bind_texture(&mut self, target: u32, texture: Option<&Resource>) -> Result<(), ContextError> {
        self.enqueue(Opcode::BindTexture, &[Value::Uint(target), Value::Object(texture)], None)
    }

    /// Upload a full RGBA8 image to the bound 2D texture.
    pub fn tex_image_2d(
        &mut self,
        width: i32,
        height: i32,
        pixels: Option<Vec<u8>>,
    ) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::TexImage2D,
            &[
                Value::Uint(gl::TEXTURE_2D),
                Value::Int(0),
                Value::Uint(gl::RGBA),
                Value::Int(width),
                Value::Int(height),
                Value::Uint(gl::RGBA),
                Value::Uint(gl::UNSIGNED_BYTE),
            ],
            pixels,
        )
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<&Resource>) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::BindFramebuffer,
            &[Value::Uint(gl::FRAMEBUFFER), Value::Object(framebuffer)],
            None,
        )
    }

    pub fn framebuffer_texture_2d(&mut self, texture: Option<&Resource>) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::FramebufferTexture2D,
            &[
                Value::Uint(gl::FRAMEBUFFER),
                Value::Uint(gl::COLOR_ATTACHMENT0),
                Value::Uint(gl::TEXTURE_2D),
                Value::Object(texture),
                Value::Int(0),
            ],
            None,
        )
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::Viewport,
            &[Value::Int(x), Value::Int(y), Value::Int(width), Value::Int(height)],
            None,
        )
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::ClearColor,
            &[Value::Float(r), Value::Float(g), Value::Float(b), Value::Float(a)],
            None,
        )
    }

    pub fn clear(&mut self, mask: u32) -> Result<(), ContextError> {
        self.enqueue(Opcode::Clear, &[Value::Uint(mask)], None)
    }

    pub fn enable(&mut self, cap: u32) -> Result<(), ContextError> {
        self.enqueue(Opcode::Enable, &[Value::Uint(cap)], None)
    }

    pub fn disable(&mut self, cap: u32) -> Result<(), ContextError> {
        self.enqueue(Opcode::Disable, &[Value::Uint(cap)], None)
    }

    pub fn shader_source(&mut self, shader: &Resource, source: &str) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::ShaderSource,
            &[Value::Object(Some(shader))],
            Some(source.as_bytes().to_vec()),
        )
    }

    pub fn compile_shader(&mut self, shader: &Resource) -> Result<(), ContextError> {
        self.enqueue(Opcode::CompileShader, &[Value::Object(Some(shader))], None)
    }

    pub fn attach_shader(&mut self, program: &Resource, shader: &Resource) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::AttachShader,
            &[Value::Object(Some(program)), Value::Object(Some(shader))],
            None,
        )
    }

    pub fn link_program(&mut self, program: &Resource) -> Result<(), ContextError> {
        self.enqueue(Opcode::LinkProgram, &[Value::Object(Some(program))], None)
    }

    pub fn use_program(&mut self, program: Option<&Resource>) -> Result<(), ContextError> {
        self.enqueue(Opcode::UseProgram, &[Value::Object(program)], None)
    }

    pub fn uniform4f(
        &mut self,
        location: Option<&Resource>,
        values: [f32; 4],
    ) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::Uniform4f,
            &[
                Value::Object(location),
                Value::Float(values[0]),
                Value::Float(values[1]),
                Value::Float(values[2]),
                Value::Float(values[3]),
            ],
            None,
        )
    }

    pub fn uniform4fv(&mut self, location: Option<&Resource>, values: &[f32]) -> Result<(), ContextError> {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.enqueue(Opcode::Uniform4fv, &[Value::Object(location)], Some(bytes))
    }

    pub fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) -> Result<(), ContextError> {
        self.enqueue(
            Opcode::DrawArrays,
            &[Value::Uint(mode), Value::Int(first), Value::Int(count)],
            None,
        )
    }
}

fn run_job<S: RenderScheduler>(
    scheduler: &S,
    stats: &RendererStats,
    batch: TransferBatch,
    command: Option<CommandRecord>,
) -> SyncOutcome {
    let (job, receiver) = RenderJob::new(batch, command);
    if let Err(e) = scheduler.schedule_job(job) {
        debug!("job not scheduled: {}", e);
        bump(&stats.jobs_abandoned, 1);
        return SyncOutcome::Abandoned;
    }
    sync::wait(&receiver, scheduler.runs_inline())
}

/// Check `args` against the opcode's slot schema and payload rule.
fn encode(
    opcode: Opcode,
    info: &OpcodeInfo,
    args: &[Value<'_>],
    has_payload: bool,
) -> Result<Vec<Slot>, ProtocolError> {
    if args.len() != info.slots.len() {
        return Err(ProtocolError::ArityMismatch {
            opcode,
            expected: info.slots.len(),
            got: args.len(),
        });
    }
    let payload_ok = match info.payload {
        PayloadRule::None => !has_payload,
        PayloadRule::Optional => true,
        PayloadRule::Required => has_payload,
    };
    if !payload_ok {
        return Err(ProtocolError::Payload {
            opcode,
            rule: info.payload,
        });
    }

    info.slots
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (kind, value))| match (*kind, *value) {
            (SlotKind::Int, Value::Int(v)) => Ok(Slot::int(v)),
            (SlotKind::Int, Value::Uint(v)) => Ok(Slot::uint(v)),
            (SlotKind::Float, Value::Float(v)) => Ok(Slot::float(v)),
            (SlotKind::Handle(_), Value::Object(None)) => Ok(Slot::handle(VirtualHandle::NULL)),
            (SlotKind::Handle(expected), Value::Object(Some(resource)))
                if resource.kind() == expected
                    || (expected == ResourceKind::Texture
                        && resource.kind() == ResourceKind::HostTexture) =>
            {
                Ok(Slot::handle(resource.handle()))
            }
            (kind, _) => Err(ProtocolError::ArgumentType {
                opcode,
                index,
                expected: match kind {
                    SlotKind::Int => "an integer",
                    SlotKind::Float => "a float",
                    SlotKind::Handle(kind) => kind.name(),
                },
            }),
        })
        .collect()
}

fn text_reply(
    value: Option<SyncValue>,
    call: &'static str,
) -> Result<Option<String>, ContextError> {
    match value {
        Some(SyncValue::Text(text)) => Ok(Some(text)),
        None => Ok(None),
        Some(_) => Err(ContextError::UnexpectedReply(call)),
    }
}
