use glq_protocol::error::ErrorFlags;
use glq_protocol::handle::{NativeHandle, ResourceKind, SurfaceId, SurfaceSize};
use glq_protocol::opcode::Opcode;
use glq_protocol::value::{Arg, SyncValue};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    #[error("unsupported opcode: {0}")]
    Unsupported(Opcode),

    #[error("invalid enum: {0:#x}")]
    InvalidEnum(u32),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("framebuffer incomplete")]
    IncompleteFramebuffer,

    #[error("surface creation failed: {0}")]
    SurfaceCreation(String),
}

impl DriverError {
    /// The sticky error bits this failure contributes.
    pub fn error_flags(&self) -> ErrorFlags {
        match self {
            DriverError::Unsupported(_) => ErrorFlags::empty(),
            DriverError::InvalidEnum(_) => ErrorFlags::INVALID_ENUM,
            DriverError::InvalidValue(_) => ErrorFlags::INVALID_VALUE,
            DriverError::InvalidOperation(_) => ErrorFlags::INVALID_OPERATION,
            DriverError::OutOfMemory(_) | DriverError::SurfaceCreation(_) => {
                ErrorFlags::OUT_OF_MEMORY
            }
            DriverError::IncompleteFramebuffer => ErrorFlags::INVALID_FRAMEBUFFER_OPERATION,
        }
    }
}

/// Parameters of a swap-chain surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDesc {
    pub size: SurfaceSize,
    /// Zero for a single-sampled surface.
    pub samples: u32,
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
}

/// The real graphics API, as seen by the dispatcher. Every driver call the
/// queue makes goes through this trait; nothing calls driver entry points
/// by name.
pub trait Driver {
    /// Create the native object for a resource. `args` are the record's
    /// remaining slots after the handle, already resolved.
    fn create_resource(
        &mut self,
        kind: ResourceKind,
        args: &[Arg],
        payload: Option<&[u8]>,
    ) -> Result<NativeHandle, DriverError>;

    fn delete_resource(&mut self, kind: ResourceKind, native: NativeHandle);

    fn bind_resource(
        &mut self,
        kind: ResourceKind,
        target: u32,
        native: NativeHandle,
    ) -> Result<(), DriverError>;

    /// Issue any other opcode with resolved arguments.
    fn issue(
        &mut self,
        opcode: Opcode,
        args: &[Arg],
        payload: Option<&[u8]>,
    ) -> Result<Option<SyncValue>, DriverError>;

    /// Return and clear the driver's pending error state.
    fn poll_error(&mut self) -> ErrorFlags;

    fn max_surface_size(&self) -> SurfaceSize;

    fn create_surface(&mut self, desc: &SurfaceDesc) -> Result<SurfaceId, DriverError>;

    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Make `surface` the draw target; `None` selects the host's default target.
    fn bind_surface(&mut self, surface: Option<SurfaceId>);

    /// Clear the buffers selected by `mask` (`COLOR_BUFFER_BIT`,
    /// `DEPTH_BUFFER_BIT`, `STENCIL_BUFFER_BIT`) of a surface, or of the
    /// host target when `surface` is `None`.
    fn clear_surface(&mut self, surface: Option<SurfaceId>, mask: u32);

    /// The texture that samples a single-sampled surface.
    fn surface_texture(&self, surface: SurfaceId) -> NativeHandle;

    fn resolve_multisample(&mut self, from: SurfaceId, to: SurfaceId);

    /// Full-surface pass writing `rgb * a` from `from` into `to`.
    fn premultiply_alpha(&mut self, from: SurfaceId, to: SurfaceId);

    fn copy_surface(&mut self, from: SurfaceId, to: SurfaceId);

    fn flush(&mut self);

    fn finish(&mut self);
}
