//! Software driver with no GPU behind it.
//!
//! Resources, binding state and RGBA8 surfaces are emulated in memory, which
//! is enough to observe command ordering, clears, readbacks and swap-chain
//! passes. Every call is recorded in a [`Probe`] that stays readable after
//! the driver has moved to the render thread.

use std::collections::HashMap;
use std::sync::Arc;

use glq_protocol::error::ErrorFlags;
use glq_protocol::gl;
use glq_protocol::handle::{NativeHandle, ResourceKind, SurfaceId, SurfaceSize};
use glq_protocol::opcode::Opcode;
use glq_protocol::value::{Arg, SyncValue};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::driver::{Driver, DriverError, SurfaceDesc};

/// Largest buffer store the driver will allocate.
const MAX_BUFFER_BYTES: usize = 256 << 20;

/// One call made through the [`Driver`] trait.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Create {
        kind: ResourceKind,
        native: NativeHandle,
    },
    Delete {
        kind: ResourceKind,
        native: NativeHandle,
    },
    Bind {
        kind: ResourceKind,
        target: u32,
        native: NativeHandle,
    },
    Issue {
        opcode: Opcode,
        args: Vec<Arg>,
        payload: Option<usize>,
    },
    CreateSurface {
        surface: SurfaceId,
        samples: u32,
    },
    DestroySurface(SurfaceId),
    BindSurface(Option<SurfaceId>),
    ClearSurface {
        surface: Option<SurfaceId>,
        mask: u32,
    },
    ResolveMultisample {
        from: SurfaceId,
        to: SurfaceId,
    },
    PremultiplyAlpha {
        from: SurfaceId,
        to: SurfaceId,
    },
    CopySurface {
        from: SurfaceId,
        to: SurfaceId,
    },
    Flush,
    Finish,
}

impl DriverCall {
    /// Calls that correspond one-to-one to dispatched command records.
    pub fn is_resource_call(&self) -> bool {
        matches!(
            self,
            DriverCall::Create { .. }
                | DriverCall::Delete { .. }
                | DriverCall::Bind { .. }
                | DriverCall::Issue { .. }
        )
    }
}

/// Shared view into a [`HeadlessDriver`]: its call log, plus error injection.
#[derive(Clone, Default)]
pub struct Probe {
    calls: Arc<Mutex<Vec<DriverCall>>>,
    injected: Arc<Mutex<ErrorFlags>>,
    /// Surface creations left before one is made to fail.
    surface_budget: Arc<Mutex<Option<usize>>>,
}

impl Probe {
    fn record(&self, call: DriverCall) {
        trace!("driver call {:?}", call);
        self.calls.lock().push(call);
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    pub fn resource_calls(&self) -> Vec<DriverCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_resource_call())
            .cloned()
            .collect()
    }

    /// Opcodes of every `Issue` call, in order.
    pub fn issued(&self) -> Vec<Opcode> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                DriverCall::Issue { opcode, .. } => Some(*opcode),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Report `flags` from the next `poll_error`.
    pub fn inject_error(&self, flags: ErrorFlags) {
        *self.injected.lock() |= flags;
    }

    /// Let `after` more surfaces be created, then fail the next one.
    pub fn fail_surface_creation(&self, after: usize) {
        *self.surface_budget.lock() = Some(after);
    }

    fn surface_creation_allowed(&self) -> bool {
        let mut budget = self.surface_budget.lock();
        match budget.as_mut() {
            Some(0) => {
                *budget = None;
                false
            }
            Some(remaining) => {
                *remaining -= 1;
                true
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attachment {
    Texture(NativeHandle),
    Renderbuffer(NativeHandle),
}

#[derive(Debug)]
enum Object {
    Buffer {
        data: Vec<u8>,
    },
    Texture {
        size: SurfaceSize,
        pixels: Vec<u8>,
    },
    Framebuffer {
        color: Option<Attachment>,
    },
    Renderbuffer {
        size: SurfaceSize,
    },
    Shader {
        shader_type: u32,
        source: String,
        compiled: bool,
        log: String,
    },
    Program {
        shaders: Vec<NativeHandle>,
        linked: bool,
        log: String,
        attribs: HashMap<String, i32>,
    },
    Location {
        program: NativeHandle,
        value: Vec<f32>,
    },
}

impl Object {
    fn kind(&self) -> ResourceKind {
        match self {
            Object::Buffer { .. } => ResourceKind::Buffer,
            Object::Texture { .. } => ResourceKind::Texture,
            Object::Framebuffer { .. } => ResourceKind::Framebuffer,
            Object::Renderbuffer { .. } => ResourceKind::Renderbuffer,
            Object::Shader { .. } => ResourceKind::Shader,
            Object::Program { .. } => ResourceKind::Program,
            Object::Location { .. } => ResourceKind::UniformLocation,
        }
    }
}

struct Surface {
    size: SurfaceSize,
    samples: u32,
    texture: NativeHandle,
    pixels: Vec<u8>,
}

impl Surface {
    fn new(size: SurfaceSize, samples: u32, texture: NativeHandle) -> Self {
        Self {
            size,
            samples,
            texture,
            pixels: vec![0; size.pixel_count() * 4],
        }
    }
}

/// In-memory [`Driver`] implementation.
pub struct HeadlessDriver {
    probe: Probe,
    max_size: SurfaceSize,
    next_id: u32,
    objects: HashMap<NativeHandle, Object>,
    surfaces: HashMap<SurfaceId, Surface>,
    host: Surface,
    target: Option<SurfaceId>,
    bound_buffers: HashMap<u32, NativeHandle>,
    bound_texture: NativeHandle,
    bound_framebuffer: NativeHandle,
    bound_renderbuffer: NativeHandle,
    current_program: NativeHandle,
    clear_color: [f32; 4],
    viewport: [i32; 4],
    draw_calls: u64,
}

impl HeadlessDriver {
    pub fn new() -> Self {
        Self::with_host_surface(SurfaceSize::default())
    }

    /// A driver whose default (host) target has `size` pixels, for shared
    /// surface mode.
    pub fn with_host_surface(size: SurfaceSize) -> Self {
        Self {
            probe: Probe::default(),
            max_size: SurfaceSize::new(4096, 4096),
            next_id: 1,
            objects: HashMap::new(),
            surfaces: HashMap::new(),
            host: Surface::new(size, 0, NativeHandle::NULL),
            target: None,
            bound_buffers: HashMap::new(),
            bound_texture: NativeHandle::NULL,
            bound_framebuffer: NativeHandle::NULL,
            bound_renderbuffer: NativeHandle::NULL,
            current_program: NativeHandle::NULL,
            clear_color: [0.0; 4],
            viewport: [0, 0, size.width as i32, size.height as i32],
            draw_calls: 0,
        }
    }

    pub fn with_max_surface_size(mut self, max: SurfaceSize) -> Self {
        self.max_size = max;
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    fn next_native(&mut self) -> NativeHandle {
        let id = NativeHandle(self.next_id);
        self.next_id += 1;
        id
    }

    fn object(&self, native: NativeHandle, kind: ResourceKind) -> Result<&Object, DriverError> {
        match self.objects.get(&native) {
            Some(obj) if obj.kind() == kind => Ok(obj),
            _ => Err(DriverError::InvalidValue(format!("no {} {:?}", kind, native))),
        }
    }

    fn object_mut(
        &mut self,
        native: NativeHandle,
        kind: ResourceKind,
    ) -> Result<&mut Object, DriverError> {
        match self.objects.get_mut(&native) {
            Some(obj) if obj.kind() == kind => Ok(obj),
            _ => Err(DriverError::InvalidValue(format!("no {} {:?}", kind, native))),
        }
    }

    /// Pixels and size of whatever the current draw target is.
    fn target_pixels(&mut self) -> Option<(&mut Vec<u8>, SurfaceSize)> {
        if !self.bound_framebuffer.is_null() {
            let color = match self.objects.get(&self.bound_framebuffer) {
                Some(Object::Framebuffer { color }) => *color,
                _ => None,
            };
            return match color {
                Some(Attachment::Texture(tex)) => match self.objects.get_mut(&tex) {
                    Some(Object::Texture { size, pixels }) => Some((pixels, *size)),
                    _ => None,
                },
                _ => None,
            };
        }
        match self.target {
            Some(id) => self
                .surfaces
                .get_mut(&id)
                .map(|s| (&mut s.pixels, s.size)),
            None => Some((&mut self.host.pixels, self.host.size)),
        }
    }

    fn surface_pixels(&mut self, surface: Option<SurfaceId>) -> Option<&mut Vec<u8>> {
        match surface {
            Some(id) => self.surfaces.get_mut(&id).map(|s| &mut s.pixels),
            None => Some(&mut self.host.pixels),
        }
    }

    fn framebuffer_complete(&self) -> bool {
        if self.bound_framebuffer.is_null() {
            return true;
        }
        matches!(
            self.objects.get(&self.bound_framebuffer),
            Some(Object::Framebuffer { color: Some(_) })
        )
    }

    fn clear(&mut self, mask: u32) {
        if mask & gl::COLOR_BUFFER_BIT == 0 {
            return;
        }
        let rgba = self.clear_color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        if let Some((pixels, _)) = self.target_pixels() {
            for px in pixels.chunks_exact_mut(4) {
                px.copy_from_slice(&rgba);
            }
        }
    }

    fn read_pixels(&mut self, args: &[Arg]) -> Result<SyncValue, DriverError> {
        let (x, y, w, h) = (args[0].as_int(), args[1].as_int(), args[2].as_int(), args[3].as_int());
        let (format, ty) = (args[4].as_uint(), args[5].as_uint());
        if format != gl::RGBA {
            return Err(DriverError::InvalidEnum(format));
        }
        if ty != gl::UNSIGNED_BYTE {
            return Err(DriverError::InvalidEnum(ty));
        }
        if w < 0 || h < 0 {
            return Err(DriverError::InvalidValue("negative readback size".into()));
        }
        if !self.framebuffer_complete() {
            return Err(DriverError::IncompleteFramebuffer);
        }

        if w as u32 > self.max_size.width || h as u32 > self.max_size.height {
            return Err(DriverError::InvalidValue(format!(
                "readback size {}x{} exceeds maximum",
                w, h
            )));
        }

        let mut out = vec![0u8; w as usize * h as usize * 4];
        if let Some((pixels, size)) = self.target_pixels() {
            // Copy only the part of the rectangle that overlaps the target
            let (x, y, w, h) = (i64::from(x), i64::from(y), i64::from(w), i64::from(h));
            let (x0, x1) = (x.max(0), (x + w).min(i64::from(size.width)));
            let (y0, y1) = (y.max(0), (y + h).min(i64::from(size.height)));
            if x0 < x1 {
                let len = (x1 - x0) as usize * 4;
                for sy in y0..y1 {
                    let src = (sy as usize * size.width as usize + x0 as usize) * 4;
                    let dst = ((sy - y) * w + (x0 - x)) as usize * 4;
                    out[dst..dst + len].copy_from_slice(&pixels[src..src + len]);
                }
            }
        }
        Ok(SyncValue::Pixels(out))
    }

    fn set_uniform(&mut self, args: &[Arg], values: Vec<f32>) -> Result<(), DriverError> {
        let location = args[0].as_native();
        if location.is_null() {
            return Ok(());
        }
        let current = self.current_program;
        match self.object_mut(location, ResourceKind::UniformLocation)? {
            Object::Location { program, value } if *program == current => {
                *value = values;
                Ok(())
            }
            _ => Err(DriverError::InvalidOperation(
                "uniform location does not belong to the current program".into(),
            )),
        }
    }

    fn get_parameter(&self, pname: u32) -> Result<SyncValue, DriverError> {
        let value = match pname {
            gl::VIEWPORT => SyncValue::Ints(self.viewport.to_vec()),
            gl::COLOR_CLEAR_VALUE => SyncValue::Floats(self.clear_color.to_vec()),
            gl::MAX_TEXTURE_SIZE | gl::MAX_RENDERBUFFER_SIZE => {
                SyncValue::Int(self.max_size.width.min(self.max_size.height) as i32)
            }
            gl::ARRAY_BUFFER_BINDING => SyncValue::Int(
                self.bound_buffers
                    .get(&gl::ARRAY_BUFFER)
                    .map(|n| n.raw() as i32)
                    .unwrap_or(0),
            ),
            gl::FRAMEBUFFER_BINDING => SyncValue::Int(self.bound_framebuffer.raw() as i32),
            gl::CURRENT_PROGRAM => SyncValue::Int(self.current_program.raw() as i32),
            other => return Err(DriverError::InvalidEnum(other)),
        };
        Ok(value)
    }
}

impl Default for HeadlessDriver {
    fn default() -> Self {
        Self::new()
    }
}

fn text(payload: Option<&[u8]>) -> String {
    payload
        .map(|p| String::from_utf8_lossy(p).into_owned())
        .unwrap_or_default()
}

fn floats(payload: Option<&[u8]>) -> Vec<f32> {
    payload
        .unwrap_or_default()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

impl Driver for HeadlessDriver {
    fn create_resource(
        &mut self,
        kind: ResourceKind,
        args: &[Arg],
        payload: Option<&[u8]>,
    ) -> Result<NativeHandle, DriverError> {
        let object = match kind {
            ResourceKind::Buffer => Object::Buffer { data: Vec::new() },
            ResourceKind::Texture => Object::Texture {
                size: SurfaceSize::default(),
                pixels: Vec::new(),
            },
            ResourceKind::Framebuffer => Object::Framebuffer { color: None },
            ResourceKind::Renderbuffer => Object::Renderbuffer {
                size: SurfaceSize::default(),
            },
            ResourceKind::Shader => {
                let shader_type = args.first().map(|a| a.as_uint()).unwrap_or(0);
                if shader_type != gl::VERTEX_SHADER && shader_type != gl::FRAGMENT_SHADER {
                    return Err(DriverError::InvalidEnum(shader_type));
                }
                Object::Shader {
                    shader_type,
                    source: String::new(),
                    compiled: false,
                    log: String::new(),
                }
            }
            ResourceKind::Program => Object::Program {
                shaders: Vec::new(),
                linked: false,
                log: String::new(),
                attribs: HashMap::new(),
            },
            ResourceKind::UniformLocation => {
                let program = args.first().map(|a| a.as_native()).unwrap_or_default();
                match self.object(program, ResourceKind::Program)? {
                    Object::Program { linked: true, .. } => {}
                    _ => {
                        return Err(DriverError::InvalidOperation(
                            "program is not linked".into(),
                        ))
                    }
                }
                if text(payload).is_empty() {
                    return Err(DriverError::InvalidValue("empty uniform name".into()));
                }
                Object::Location {
                    program,
                    value: Vec::new(),
                }
            }
            ResourceKind::HostTexture => {
                return Err(DriverError::InvalidOperation(
                    "host textures are bound, not created".into(),
                ))
            }
        };

        let native = self.next_native();
        self.objects.insert(native, object);
        self.probe.record(DriverCall::Create { kind, native });
        Ok(native)
    }

    fn delete_resource(&mut self, kind: ResourceKind, native: NativeHandle) {
        self.probe.record(DriverCall::Delete { kind, native });
        if self.objects.remove(&native).is_none() {
            debug!("delete of unknown {} {:?}", kind, native);
        }
        if self.current_program == native {
            self.current_program = NativeHandle::NULL;
        }
        if self.bound_framebuffer == native {
            self.bound_framebuffer = NativeHandle::NULL;
        }
    }

    fn bind_resource(
        &mut self,
        kind: ResourceKind,
        target: u32,
        native: NativeHandle,
    ) -> Result<(), DriverError> {
        self.probe.record(DriverCall::Bind {
            kind,
            target,
            native,
        });
        // Host textures live outside this driver's object table
        if !native.is_null() && kind != ResourceKind::HostTexture {
            match self.objects.get(&native) {
                Some(obj) if obj.kind() == kind => {}
                _ => {
                    return Err(DriverError::InvalidOperation(format!(
                        "bind of unknown {} {:?}",
                        kind, native
                    )))
                }
            }
        }

        match kind {
            ResourceKind::Buffer => {
                self.bound_buffers.insert(target, native);
            }
            ResourceKind::Texture | ResourceKind::HostTexture => self.bound_texture = native,
            ResourceKind::Framebuffer => self.bound_framebuffer = native,
            ResourceKind::Renderbuffer => self.bound_renderbuffer = native,
            ResourceKind::Program => {
                if let Some(Object::Program { linked: false, .. }) = self.objects.get(&native) {
                    return Err(DriverError::InvalidOperation("program is not linked".into()));
                }
                self.current_program = native;
            }
            ResourceKind::Shader | ResourceKind::UniformLocation => {
                return Err(DriverError::InvalidEnum(target))
            }
        }
        Ok(())
    }

    fn issue(
        &mut self,
        opcode: Opcode,
        args: &[Arg],
        payload: Option<&[u8]>,
    ) -> Result<Option<SyncValue>, DriverError> {
        self.probe.record(DriverCall::Issue {
            opcode,
            args: args.to_vec(),
            payload: payload.map(<[u8]>::len),
        });

        match opcode {
            Opcode::ShaderSource => {
                if let Object::Shader { source, .. } =
                    self.object_mut(args[0].as_native(), ResourceKind::Shader)?
                {
                    *source = text(payload);
                }
            }
            Opcode::CompileShader => {
                if let Object::Shader {
                    source,
                    compiled,
                    log,
                    ..
                } = self.object_mut(args[0].as_native(), ResourceKind::Shader)?
                {
                    *compiled = !source.trim().is_empty() && !source.contains("#error");
                    *log = if *compiled {
                        String::new()
                    } else {
                        "ERROR: 0:1: compilation failed".to_string()
                    };
                }
            }
            Opcode::AttachShader | Opcode::DetachShader => {
                let shader = args[1].as_native();
                self.object(shader, ResourceKind::Shader)?;
                if let Object::Program { shaders, .. } =
                    self.object_mut(args[0].as_native(), ResourceKind::Program)?
                {
                    let attached = shaders.contains(&shader);
                    match (opcode, attached) {
                        (Opcode::AttachShader, false) => shaders.push(shader),
                        (Opcode::DetachShader, true) => shaders.retain(|s| *s != shader),
                        _ => {
                            return Err(DriverError::InvalidOperation(format!(
                                "{} with shader {:?}",
                                opcode, shader
                            )))
                        }
                    }
                }
            }
            Opcode::LinkProgram => {
                let program = args[0].as_native();
                let attached = match self.object(program, ResourceKind::Program)? {
                    Object::Program { shaders, .. } => shaders.clone(),
                    _ => Vec::new(),
                };
                let compiled_types: Vec<u32> = attached
                    .iter()
                    .filter_map(|s| match self.objects.get(s) {
                        Some(Object::Shader {
                            shader_type,
                            compiled: true,
                            ..
                        }) => Some(*shader_type),
                        _ => None,
                    })
                    .collect();
                let ok = compiled_types.contains(&gl::VERTEX_SHADER)
                    && compiled_types.contains(&gl::FRAGMENT_SHADER);
                if let Object::Program { linked, log, .. } =
                    self.object_mut(program, ResourceKind::Program)?
                {
                    *linked = ok;
                    *log = if ok {
                        String::new()
                    } else {
                        "link failed: missing compiled vertex or fragment shader".to_string()
                    };
                }
            }
            Opcode::BindAttribLocation => {
                let index = args[1].as_int();
                if let Object::Program { attribs, .. } =
                    self.object_mut(args[0].as_native(), ResourceKind::Program)?
                {
                    attribs.insert(text(payload), index);
                }
            }

            Opcode::BufferData | Opcode::BufferSubData => {
                let target = args[0].as_uint();
                let buffer = self.bound_buffers.get(&target).copied().unwrap_or_default();
                if buffer.is_null() {
                    return Err(DriverError::InvalidOperation(format!(
                        "no buffer bound to {:#x}",
                        target
                    )));
                }
                let bytes = payload.unwrap_or_default();
                if let Object::Buffer { data } = self.object_mut(buffer, ResourceKind::Buffer)? {
                    if opcode == Opcode::BufferData {
                        let size = args[1].as_int();
                        if size < 0 {
                            return Err(DriverError::InvalidValue("negative buffer size".into()));
                        }
                        if size as usize > MAX_BUFFER_BYTES {
                            return Err(DriverError::OutOfMemory(format!(
                                "buffer of {} bytes",
                                size
                            )));
                        }
                        *data = if payload.is_some() {
                            bytes.to_vec()
                        } else {
                            vec![0; size as usize]
                        };
                    } else {
                        let offset = args[1].as_int();
                        if offset < 0 || offset as usize + bytes.len() > data.len() {
                            return Err(DriverError::InvalidValue(
                                "bufferSubData out of range".into(),
                            ));
                        }
                        let offset = offset as usize;
                        data[offset..offset + bytes.len()].copy_from_slice(bytes);
                    }
                }
            }
            Opcode::TexImage2D => {
                let (w, h) = (args[3].as_int(), args[4].as_int());
                if w < 0 || h < 0 || w as u32 > self.max_size.width || h as u32 > self.max_size.height {
                    return Err(DriverError::InvalidValue(format!("texture size {}x{}", w, h)));
                }
                let size = SurfaceSize::new(w as u32, h as u32);
                let expected = size.pixel_count() * 4;
                let new_pixels = match payload {
                    Some(p) if p.len() == expected => p.to_vec(),
                    Some(p) => {
                        return Err(DriverError::InvalidOperation(format!(
                            "texImage2D expected {} bytes, got {}",
                            expected,
                            p.len()
                        )))
                    }
                    None => vec![0; expected],
                };
                let texture = self.bound_texture;
                if texture.is_null() {
                    return Err(DriverError::InvalidOperation("no texture bound".into()));
                }
                if let Object::Texture {
                    size: tex_size,
                    pixels,
                } = self.object_mut(texture, ResourceKind::Texture)?
                {
                    *tex_size = size;
                    *pixels = new_pixels;
                }
            }
            Opcode::TexSubImage2D => {
                let (x, y, w, h) = (
                    args[2].as_int(),
                    args[3].as_int(),
                    args[4].as_int(),
                    args[5].as_int(),
                );
                let bytes = payload.unwrap_or_default();
                let texture = self.bound_texture;
                if texture.is_null() {
                    return Err(DriverError::InvalidOperation("no texture bound".into()));
                }
                if let Object::Texture { size, pixels } =
                    self.object_mut(texture, ResourceKind::Texture)?
                {
                    let fits = x >= 0
                        && y >= 0
                        && w >= 0
                        && h >= 0
                        && i64::from(x) + i64::from(w) <= i64::from(size.width)
                        && i64::from(y) + i64::from(h) <= i64::from(size.height)
                        && bytes.len() == w as usize * h as usize * 4;
                    if !fits {
                        return Err(DriverError::InvalidValue("texSubImage2D out of range".into()));
                    }
                    let stride = size.width as usize * 4;
                    let row_len = w as usize * 4;
                    for row in 0..h as usize {
                        let dst = (y as usize + row) * stride + x as usize * 4;
                        let src = row * row_len;
                        pixels[dst..dst + row_len].copy_from_slice(&bytes[src..src + row_len]);
                    }
                }
            }
            Opcode::RenderbufferStorage => {
                let rb = self.bound_renderbuffer;
                if rb.is_null() {
                    return Err(DriverError::InvalidOperation("no renderbuffer bound".into()));
                }
                let new_size = SurfaceSize::new(args[2].as_uint(), args[3].as_uint());
                if let Object::Renderbuffer { size } =
                    self.object_mut(rb, ResourceKind::Renderbuffer)?
                {
                    *size = new_size;
                }
            }
            Opcode::FramebufferTexture2D | Opcode::FramebufferRenderbuffer => {
                let fbo = self.bound_framebuffer;
                if fbo.is_null() {
                    return Err(DriverError::InvalidOperation(
                        "default framebuffer cannot take attachments".into(),
                    ));
                }
                let attachment = args[1].as_uint();
                let native = args[3].as_native();
                let new_color = match (opcode, native.is_null()) {
                    (_, true) => None,
                    (Opcode::FramebufferTexture2D, false) => {
                        self.object(native, ResourceKind::Texture)?;
                        Some(Attachment::Texture(native))
                    }
                    (_, false) => {
                        self.object(native, ResourceKind::Renderbuffer)?;
                        Some(Attachment::Renderbuffer(native))
                    }
                };
                if attachment == gl::COLOR_ATTACHMENT0 {
                    if let Object::Framebuffer { color } =
                        self.object_mut(fbo, ResourceKind::Framebuffer)?
                    {
                        *color = new_color;
                    }
                }
            }

            Opcode::Viewport => {
                self.viewport = [
                    args[0].as_int(),
                    args[1].as_int(),
                    args[2].as_int(),
                    args[3].as_int(),
                ];
            }
            Opcode::ClearColor => {
                self.clear_color = [
                    args[0].as_float(),
                    args[1].as_float(),
                    args[2].as_float(),
                    args[3].as_float(),
                ];
            }
            Opcode::Clear => {
                if !self.framebuffer_complete() {
                    return Err(DriverError::IncompleteFramebuffer);
                }
                self.clear(args[0].as_uint());
            }

            Opcode::Uniform1i => self.set_uniform(args, vec![args[1].as_int() as f32])?,
            Opcode::Uniform1f => self.set_uniform(args, vec![args[1].as_float()])?,
            Opcode::Uniform4f => self.set_uniform(
                args,
                vec![
                    args[1].as_float(),
                    args[2].as_float(),
                    args[3].as_float(),
                    args[4].as_float(),
                ],
            )?,
            Opcode::Uniform4fv | Opcode::UniformMatrix4fv => {
                let values = floats(payload);
                let width = if opcode == Opcode::Uniform4fv { 4 } else { 16 };
                if values.is_empty() || values.len() % width != 0 {
                    return Err(DriverError::InvalidValue(format!(
                        "{} expects a multiple of {} floats",
                        opcode, width
                    )));
                }
                self.set_uniform(args, values)?;
            }

            Opcode::DrawArrays | Opcode::DrawElements => {
                if self.current_program.is_null() {
                    return Err(DriverError::InvalidOperation("no program in use".into()));
                }
                if !self.framebuffer_complete() {
                    return Err(DriverError::IncompleteFramebuffer);
                }
                self.draw_calls += 1;
            }

            Opcode::TexParameteri
            | Opcode::GenerateMipmap
            | Opcode::ActiveTexture
            | Opcode::Scissor
            | Opcode::ClearDepth
            | Opcode::ClearStencil
            | Opcode::Enable
            | Opcode::Disable
            | Opcode::BlendFunc
            | Opcode::DepthFunc
            | Opcode::DepthMask
            | Opcode::ColorMask
            | Opcode::CullFace
            | Opcode::FrontFace
            | Opcode::LineWidth
            | Opcode::PixelStorei
            | Opcode::EnableVertexAttribArray
            | Opcode::DisableVertexAttribArray
            | Opcode::VertexAttribPointer
            | Opcode::VertexAttrib4f
            | Opcode::Flush
            | Opcode::Finish
            | Opcode::GetError => {}

            Opcode::ReadPixels => return self.read_pixels(args).map(Some),
            Opcode::GetParameter => return self.get_parameter(args[0].as_uint()).map(Some),
            Opcode::GetShaderParameter => {
                let pname = args[1].as_uint();
                return match self.object(args[0].as_native(), ResourceKind::Shader)? {
                    Object::Shader {
                        shader_type,
                        compiled,
                        ..
                    } => match pname {
                        gl::COMPILE_STATUS => Ok(Some(SyncValue::Bool(*compiled))),
                        gl::SHADER_TYPE => Ok(Some(SyncValue::Int(*shader_type as i32))),
                        gl::DELETE_STATUS => Ok(Some(SyncValue::Bool(false))),
                        other => Err(DriverError::InvalidEnum(other)),
                    },
                    _ => Ok(None),
                };
            }
            Opcode::GetProgramParameter => {
                let pname = args[1].as_uint();
                return match self.object(args[0].as_native(), ResourceKind::Program)? {
                    Object::Program {
                        linked, shaders, ..
                    } => match pname {
                        gl::LINK_STATUS => Ok(Some(SyncValue::Bool(*linked))),
                        gl::ATTACHED_SHADERS => Ok(Some(SyncValue::Int(shaders.len() as i32))),
                        gl::DELETE_STATUS => Ok(Some(SyncValue::Bool(false))),
                        other => Err(DriverError::InvalidEnum(other)),
                    },
                    _ => Ok(None),
                };
            }
            Opcode::GetShaderInfoLog => {
                return match self.object(args[0].as_native(), ResourceKind::Shader)? {
                    Object::Shader { log, .. } => Ok(Some(SyncValue::Text(log.clone()))),
                    _ => Ok(None),
                };
            }
            Opcode::GetProgramInfoLog => {
                return match self.object(args[0].as_native(), ResourceKind::Program)? {
                    Object::Program { log, .. } => Ok(Some(SyncValue::Text(log.clone()))),
                    _ => Ok(None),
                };
            }
            Opcode::IsBuffer
            | Opcode::IsTexture
            | Opcode::IsFramebuffer
            | Opcode::IsRenderbuffer
            | Opcode::IsShader
            | Opcode::IsProgram => {
                let kind = match opcode {
                    Opcode::IsBuffer => ResourceKind::Buffer,
                    Opcode::IsTexture => ResourceKind::Texture,
                    Opcode::IsFramebuffer => ResourceKind::Framebuffer,
                    Opcode::IsRenderbuffer => ResourceKind::Renderbuffer,
                    Opcode::IsShader => ResourceKind::Shader,
                    _ => ResourceKind::Program,
                };
                let exists = self.object(args[0].as_native(), kind).is_ok();
                return Ok(Some(SyncValue::Bool(exists)));
            }
            Opcode::GetAttribLocation => {
                let name = text(payload);
                return match self.object(args[0].as_native(), ResourceKind::Program)? {
                    Object::Program { attribs, .. } => Ok(Some(SyncValue::Int(
                        attribs.get(&name).copied().unwrap_or(-1),
                    ))),
                    _ => Ok(None),
                };
            }
            Opcode::CheckFramebufferStatus => {
                let status = if self.bound_framebuffer.is_null() || self.framebuffer_complete() {
                    gl::FRAMEBUFFER_COMPLETE
                } else {
                    gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT
                };
                return Ok(Some(SyncValue::Int(status as i32)));
            }
            Opcode::GetUniform => {
                let program = args[0].as_native();
                self.object(program, ResourceKind::Program)?;
                return match self.object(args[1].as_native(), ResourceKind::UniformLocation)? {
                    Object::Location {
                        program: owner,
                        value,
                    } if *owner == program => Ok(Some(SyncValue::Floats(value.clone()))),
                    _ => Err(DriverError::InvalidOperation(
                        "location belongs to another program".into(),
                    )),
                };
            }

            _ => return Err(DriverError::Unsupported(opcode)),
        }
        Ok(None)
    }

    fn poll_error(&mut self) -> ErrorFlags {
        std::mem::take(&mut *self.probe.injected.lock())
    }

    fn max_surface_size(&self) -> SurfaceSize {
        self.max_size
    }

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, DriverError> {
        if desc.size.width > self.max_size.width || desc.size.height > self.max_size.height {
            return Err(DriverError::SurfaceCreation(format!(
                "{}x{} exceeds maximum",
                desc.size.width, desc.size.height
            )));
        }
        if !self.probe.surface_creation_allowed() {
            return Err(DriverError::SurfaceCreation("injected failure".into()));
        }
        let id = SurfaceId(self.next_native().raw());
        let texture = if desc.samples == 0 {
            self.next_native()
        } else {
            NativeHandle::NULL
        };
        self.surfaces
            .insert(id, Surface::new(desc.size, desc.samples, texture));
        self.probe.record(DriverCall::CreateSurface {
            surface: id,
            samples: desc.samples,
        });
        Ok(id)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.probe.record(DriverCall::DestroySurface(surface));
        self.surfaces.remove(&surface);
        if self.target == Some(surface) {
            self.target = None;
        }
    }

    fn bind_surface(&mut self, surface: Option<SurfaceId>) {
        self.probe.record(DriverCall::BindSurface(surface));
        self.target = surface;
        self.bound_framebuffer = NativeHandle::NULL;
    }

    fn clear_surface(&mut self, surface: Option<SurfaceId>, mask: u32) {
        self.probe.record(DriverCall::ClearSurface { surface, mask });
        if mask & gl::COLOR_BUFFER_BIT == 0 {
            return;
        }
        if let Some(pixels) = self.surface_pixels(surface) {
            pixels.fill(0);
        }
    }

    fn surface_texture(&self, surface: SurfaceId) -> NativeHandle {
        self.surfaces
            .get(&surface)
            .map(|s| s.texture)
            .unwrap_or_default()
    }

    fn resolve_multisample(&mut self, from: SurfaceId, to: SurfaceId) {
        self.probe
            .record(DriverCall::ResolveMultisample { from, to });
        self.copy_pixels(from, to, false);
    }

    fn premultiply_alpha(&mut self, from: SurfaceId, to: SurfaceId) {
        self.probe.record(DriverCall::PremultiplyAlpha { from, to });
        self.copy_pixels(from, to, true);
    }

    fn copy_surface(&mut self, from: SurfaceId, to: SurfaceId) {
        self.probe.record(DriverCall::CopySurface { from, to });
        self.copy_pixels(from, to, false);
    }

    fn flush(&mut self) {
        self.probe.record(DriverCall::Flush);
    }

    fn finish(&mut self) {
        self.probe.record(DriverCall::Finish);
    }
}

impl HeadlessDriver {
    fn copy_pixels(&mut self, from: SurfaceId, to: SurfaceId, premultiply: bool) {
        let Some(mut pixels) = self.surfaces.get(&from).map(|s| s.pixels.clone()) else {
            return;
        };
        if premultiply {
            for px in pixels.chunks_exact_mut(4) {
                let a = u16::from(px[3]);
                for c in &mut px[..3] {
                    *c = ((u16::from(*c) * a + 127) / 255) as u8;
                }
            }
        }
        if let Some(dst) = self.surfaces.get_mut(&to) {
            if dst.pixels.len() == pixels.len() {
                dst.pixels = pixels;
            } else {
                trace!(
                    "size mismatch copying {:?} -> {:?} ({} samples)",
                    from,
                    to,
                    dst.samples
                );
            }
        }
    }
}
