use std::fmt;

use serde::{Deserialize, Serialize};

/// A control-plane handle for a graphics resource.
/// Allocated the moment the resource object is constructed, before any
/// driver object exists. Zero means "no resource" / "default target".
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct VirtualHandle(pub u32);

impl VirtualHandle {
    pub const NULL: VirtualHandle = VirtualHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for VirtualHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The driver-assigned identifier behind a virtual handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NativeHandle(pub u32);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Driver identifier of a render-target surface owned by the swap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamp both dimensions into `1..=max`.
    pub fn clamp_to(self, max: SurfaceSize) -> SurfaceSize {
        SurfaceSize {
            width: self.width.clamp(1, max.width.max(1)),
            height: self.height.clamp(1, max.height.max(1)),
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// The kind of driver object behind a handle. Recorded in the handle table
/// at allocation time so bulk teardown knows which destructor to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Framebuffer,
    Renderbuffer,
    Shader,
    Program,
    UniformLocation,
    /// A texture owned by the host compositor, sampled by reference.
    HostTexture,
}

impl ResourceKind {
    /// Uniform locations and host textures are looked up, not created,
    /// so there is nothing to destroy when their entries go away.
    pub fn has_native_destructor(self) -> bool {
        !matches!(self, ResourceKind::UniformLocation | ResourceKind::HostTexture)
    }

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Renderbuffer => "renderbuffer",
            ResourceKind::Shader => "shader",
            ResourceKind::Program => "program",
            ResourceKind::UniformLocation => "uniform location",
            ResourceKind::HostTexture => "host texture",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
