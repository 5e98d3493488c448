use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::ResourceKind;

/// How a 32-bit slot of a command record is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Int,
    Float,
    /// A virtual handle, resolved through the handle table before dispatch.
    Handle(ResourceKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadRule {
    None,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Queued and dispatched at the next transfer.
    Async,
    /// Caller blocks until the execution plane returns a value.
    Sync,
    /// Synthesized by the queue machinery itself (frame markers, host rebinds).
    Internal,
}

/// Static schema of an opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub class: CommandClass,
    pub slots: &'static [SlotKind],
    pub payload: PayloadRule,
    /// Slot 0 carries the handle that receives the created native object.
    pub creates: Option<ResourceKind>,
    /// Slot 0 carries the handle whose native object is destroyed.
    pub deletes: Option<ResourceKind>,
    pub binds: Option<ResourceKind>,
    /// Unknown handles resolve to zero instead of failing (existence queries).
    pub lenient_handles: bool,
}

impl OpcodeInfo {
    const fn new(name: &'static str, class: CommandClass, slots: &'static [SlotKind]) -> Self {
        Self {
            name,
            class,
            slots,
            payload: PayloadRule::None,
            creates: None,
            deletes: None,
            binds: None,
            lenient_handles: false,
        }
    }

    const fn payload(mut self, rule: PayloadRule) -> Self {
        self.payload = rule;
        self
    }

    const fn creates(mut self, kind: ResourceKind) -> Self {
        self.creates = Some(kind);
        self
    }

    const fn deletes(mut self, kind: ResourceKind) -> Self {
        self.deletes = Some(kind);
        self
    }

    const fn binds(mut self, kind: ResourceKind) -> Self {
        self.binds = Some(kind);
        self
    }

    const fn lenient(mut self) -> Self {
        self.lenient_handles = true;
        self
    }
}

/// The command set understood by the queue. Any driver-specific call can be
/// carried through `Extension`, whose slots are all integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Resource lifetime
    CreateBuffer,
    CreateTexture,
    CreateFramebuffer,
    CreateRenderbuffer,
    CreateShader,
    CreateProgram,
    DeleteBuffer,
    DeleteTexture,
    DeleteFramebuffer,
    DeleteRenderbuffer,
    DeleteShader,
    DeleteProgram,
    GetUniformLocation,
    ClearLocation,
    ReleaseHostTexture,

    // Binding
    BindBuffer,
    BindTexture,
    BindFramebuffer,
    BindRenderbuffer,
    UseProgram,

    // Shaders and programs
    ShaderSource,
    CompileShader,
    AttachShader,
    DetachShader,
    LinkProgram,
    BindAttribLocation,

    // Storage
    BufferData,
    BufferSubData,
    TexImage2D,
    TexSubImage2D,
    TexParameteri,
    GenerateMipmap,
    ActiveTexture,
    RenderbufferStorage,
    FramebufferTexture2D,
    FramebufferRenderbuffer,

    // Fixed-function state
    Viewport,
    Scissor,
    ClearColor,
    ClearDepth,
    ClearStencil,
    Clear,
    Enable,
    Disable,
    BlendFunc,
    DepthFunc,
    DepthMask,
    ColorMask,
    CullFace,
    FrontFace,
    LineWidth,
    PixelStorei,

    // Vertex input
    EnableVertexAttribArray,
    DisableVertexAttribArray,
    VertexAttribPointer,
    VertexAttrib4f,

    // Uniforms
    Uniform1i,
    Uniform1f,
    Uniform4f,
    Uniform4fv,
    UniformMatrix4fv,

    // Drawing
    DrawArrays,
    DrawElements,
    Flush,

    // Internal markers
    BeginPaint,
    TextureComplete,
    RebindHostTexture,

    // Synchronous queries
    GetError,
    Finish,
    ReadPixels,
    GetParameter,
    GetShaderParameter,
    GetProgramParameter,
    GetShaderInfoLog,
    GetProgramInfoLog,
    IsBuffer,
    IsTexture,
    IsFramebuffer,
    IsRenderbuffer,
    IsShader,
    IsProgram,
    GetAttribLocation,
    CheckFramebufferStatus,
    GetUniform,

    Extension(u16),
}

const I: SlotKind = SlotKind::Int;
const F: SlotKind = SlotKind::Float;
const BUF: SlotKind = SlotKind::Handle(ResourceKind::Buffer);
const TEX: SlotKind = SlotKind::Handle(ResourceKind::Texture);
const FBO: SlotKind = SlotKind::Handle(ResourceKind::Framebuffer);
const RBO: SlotKind = SlotKind::Handle(ResourceKind::Renderbuffer);
const SHD: SlotKind = SlotKind::Handle(ResourceKind::Shader);
const PRG: SlotKind = SlotKind::Handle(ResourceKind::Program);
const LOC: SlotKind = SlotKind::Handle(ResourceKind::UniformLocation);
const HTX: SlotKind = SlotKind::Handle(ResourceKind::HostTexture);

const EXTENSION_SLOTS: &[SlotKind] = &[I, I, I, I, I, I, I, I];

impl Opcode {
    pub fn info(self) -> OpcodeInfo {
        use CommandClass::{Async, Internal, Sync};
        use PayloadRule::{Optional, Required};
        use ResourceKind as K;

        match self {
            Opcode::CreateBuffer => OpcodeInfo::new("createBuffer", Async, &[BUF]).creates(K::Buffer),
            Opcode::CreateTexture => OpcodeInfo::new("createTexture", Async, &[TEX]).creates(K::Texture),
            Opcode::CreateFramebuffer => {
                OpcodeInfo::new("createFramebuffer", Async, &[FBO]).creates(K::Framebuffer)
            }
            Opcode::CreateRenderbuffer => {
                OpcodeInfo::new("createRenderbuffer", Async, &[RBO]).creates(K::Renderbuffer)
            }
            Opcode::CreateShader => OpcodeInfo::new("createShader", Async, &[SHD, I]).creates(K::Shader),
            Opcode::CreateProgram => OpcodeInfo::new("createProgram", Async, &[PRG]).creates(K::Program),
            Opcode::DeleteBuffer => OpcodeInfo::new("deleteBuffer", Async, &[BUF]).deletes(K::Buffer),
            Opcode::DeleteTexture => OpcodeInfo::new("deleteTexture", Async, &[TEX]).deletes(K::Texture),
            Opcode::DeleteFramebuffer => {
                OpcodeInfo::new("deleteFramebuffer", Async, &[FBO]).deletes(K::Framebuffer)
            }
            Opcode::DeleteRenderbuffer => {
                OpcodeInfo::new("deleteRenderbuffer", Async, &[RBO]).deletes(K::Renderbuffer)
            }
            Opcode::DeleteShader => OpcodeInfo::new("deleteShader", Async, &[SHD]).deletes(K::Shader),
            Opcode::DeleteProgram => OpcodeInfo::new("deleteProgram", Async, &[PRG]).deletes(K::Program),
            Opcode::GetUniformLocation => OpcodeInfo::new("getUniformLocation", Async, &[LOC, PRG])
                .payload(Required)
                .creates(K::UniformLocation),
            Opcode::ClearLocation => {
                OpcodeInfo::new("clearLocation", Async, &[LOC]).deletes(K::UniformLocation)
            }
            Opcode::ReleaseHostTexture => {
                OpcodeInfo::new("releaseHostTexture", Async, &[HTX]).deletes(K::HostTexture)
            }

            Opcode::BindBuffer => OpcodeInfo::new("bindBuffer", Async, &[I, BUF]).binds(K::Buffer),
            Opcode::BindTexture => OpcodeInfo::new("bindTexture", Async, &[I, TEX]).binds(K::Texture),
            Opcode::BindFramebuffer => {
                OpcodeInfo::new("bindFramebuffer", Async, &[I, FBO]).binds(K::Framebuffer)
            }
            Opcode::BindRenderbuffer => {
                OpcodeInfo::new("bindRenderbuffer", Async, &[I, RBO]).binds(K::Renderbuffer)
            }
            Opcode::UseProgram => OpcodeInfo::new("useProgram", Async, &[PRG]).binds(K::Program),

            Opcode::ShaderSource => OpcodeInfo::new("shaderSource", Async, &[SHD]).payload(Required),
            Opcode::CompileShader => OpcodeInfo::new("compileShader", Async, &[SHD]),
            Opcode::AttachShader => OpcodeInfo::new("attachShader", Async, &[PRG, SHD]),
            Opcode::DetachShader => OpcodeInfo::new("detachShader", Async, &[PRG, SHD]),
            Opcode::LinkProgram => OpcodeInfo::new("linkProgram", Async, &[PRG]),
            Opcode::BindAttribLocation => {
                OpcodeInfo::new("bindAttribLocation", Async, &[PRG, I]).payload(Required)
            }

            Opcode::BufferData => OpcodeInfo::new("bufferData", Async, &[I, I, I]).payload(Optional),
            Opcode::BufferSubData => OpcodeInfo::new("bufferSubData", Async, &[I, I]).payload(Required),
            Opcode::TexImage2D => {
                OpcodeInfo::new("texImage2D", Async, &[I, I, I, I, I, I, I]).payload(Optional)
            }
            Opcode::TexSubImage2D => {
                OpcodeInfo::new("texSubImage2D", Async, &[I, I, I, I, I, I, I, I]).payload(Required)
            }
            Opcode::TexParameteri => OpcodeInfo::new("texParameteri", Async, &[I, I, I]),
            Opcode::GenerateMipmap => OpcodeInfo::new("generateMipmap", Async, &[I]),
            Opcode::ActiveTexture => OpcodeInfo::new("activeTexture", Async, &[I]),
            Opcode::RenderbufferStorage => OpcodeInfo::new("renderbufferStorage", Async, &[I, I, I, I]),
            Opcode::FramebufferTexture2D => {
                OpcodeInfo::new("framebufferTexture2D", Async, &[I, I, I, TEX, I])
            }
            Opcode::FramebufferRenderbuffer => {
                OpcodeInfo::new("framebufferRenderbuffer", Async, &[I, I, I, RBO])
            }

            Opcode::Viewport => OpcodeInfo::new("viewport", Async, &[I, I, I, I]),
            Opcode::Scissor => OpcodeInfo::new("scissor", Async, &[I, I, I, I]),
            Opcode::ClearColor => OpcodeInfo::new("clearColor", Async, &[F, F, F, F]),
            Opcode::ClearDepth => OpcodeInfo::new("clearDepth", Async, &[F]),
            Opcode::ClearStencil => OpcodeInfo::new("clearStencil", Async, &[I]),
            Opcode::Clear => OpcodeInfo::new("clear", Async, &[I]),
            Opcode::Enable => OpcodeInfo::new("enable", Async, &[I]),
            Opcode::Disable => OpcodeInfo::new("disable", Async, &[I]),
            Opcode::BlendFunc => OpcodeInfo::new("blendFunc", Async, &[I, I]),
            Opcode::DepthFunc => OpcodeInfo::new("depthFunc", Async, &[I]),
            Opcode::DepthMask => OpcodeInfo::new("depthMask", Async, &[I]),
            Opcode::ColorMask => OpcodeInfo::new("colorMask", Async, &[I, I, I, I]),
            Opcode::CullFace => OpcodeInfo::new("cullFace", Async, &[I]),
            Opcode::FrontFace => OpcodeInfo::new("frontFace", Async, &[I]),
            Opcode::LineWidth => OpcodeInfo::new("lineWidth", Async, &[F]),
            Opcode::PixelStorei => OpcodeInfo::new("pixelStorei", Async, &[I, I]),

            Opcode::EnableVertexAttribArray => {
                OpcodeInfo::new("enableVertexAttribArray", Async, &[I])
            }
            Opcode::DisableVertexAttribArray => {
                OpcodeInfo::new("disableVertexAttribArray", Async, &[I])
            }
            Opcode::VertexAttribPointer => {
                OpcodeInfo::new("vertexAttribPointer", Async, &[I, I, I, I, I, I])
            }
            Opcode::VertexAttrib4f => OpcodeInfo::new("vertexAttrib4f", Async, &[I, F, F, F, F]),

            Opcode::Uniform1i => OpcodeInfo::new("uniform1i", Async, &[LOC, I]),
            Opcode::Uniform1f => OpcodeInfo::new("uniform1f", Async, &[LOC, F]),
            Opcode::Uniform4f => OpcodeInfo::new("uniform4f", Async, &[LOC, F, F, F, F]),
            Opcode::Uniform4fv => OpcodeInfo::new("uniform4fv", Async, &[LOC]).payload(Required),
            Opcode::UniformMatrix4fv => {
                OpcodeInfo::new("uniformMatrix4fv", Async, &[LOC, I]).payload(Required)
            }

            Opcode::DrawArrays => OpcodeInfo::new("drawArrays", Async, &[I, I, I]),
            Opcode::DrawElements => OpcodeInfo::new("drawElements", Async, &[I, I, I, I]),
            Opcode::Flush => OpcodeInfo::new("flush", Async, &[]),

            Opcode::BeginPaint => OpcodeInfo::new("beginPaint", Internal, &[]),
            Opcode::TextureComplete => OpcodeInfo::new("textureComplete", Internal, &[]),
            Opcode::RebindHostTexture => OpcodeInfo::new("rebindHostTexture", Internal, &[I, I]),

            Opcode::GetError => OpcodeInfo::new("getError", Sync, &[]),
            Opcode::Finish => OpcodeInfo::new("finish", Sync, &[]),
            Opcode::ReadPixels => OpcodeInfo::new("readPixels", Sync, &[I, I, I, I, I, I]),
            Opcode::GetParameter => OpcodeInfo::new("getParameter", Sync, &[I]),
            Opcode::GetShaderParameter => OpcodeInfo::new("getShaderParameter", Sync, &[SHD, I]),
            Opcode::GetProgramParameter => OpcodeInfo::new("getProgramParameter", Sync, &[PRG, I]),
            Opcode::GetShaderInfoLog => OpcodeInfo::new("getShaderInfoLog", Sync, &[SHD]),
            Opcode::GetProgramInfoLog => OpcodeInfo::new("getProgramInfoLog", Sync, &[PRG]),
            Opcode::IsBuffer => OpcodeInfo::new("isBuffer", Sync, &[BUF]).lenient(),
            Opcode::IsTexture => OpcodeInfo::new("isTexture", Sync, &[TEX]).lenient(),
            Opcode::IsFramebuffer => OpcodeInfo::new("isFramebuffer", Sync, &[FBO]).lenient(),
            Opcode::IsRenderbuffer => OpcodeInfo::new("isRenderbuffer", Sync, &[RBO]).lenient(),
            Opcode::IsShader => OpcodeInfo::new("isShader", Sync, &[SHD]).lenient(),
            Opcode::IsProgram => OpcodeInfo::new("isProgram", Sync, &[PRG]).lenient(),
            Opcode::GetAttribLocation => {
                OpcodeInfo::new("getAttribLocation", Sync, &[PRG]).payload(Required)
            }
            Opcode::CheckFramebufferStatus => OpcodeInfo::new("checkFramebufferStatus", Sync, &[I]),
            Opcode::GetUniform => OpcodeInfo::new("getUniform", Sync, &[PRG, LOC]),

            Opcode::Extension(_) => {
                OpcodeInfo::new("extension", Async, EXTENSION_SLOTS).payload(Optional)
            }
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn class(self) -> CommandClass {
        self.info().class
    }

    pub fn is_sync(self) -> bool {
        self.class() == CommandClass::Sync
    }

    /// The existence query matching a resource kind, if the kind has one.
    pub fn existence_query(kind: ResourceKind) -> Option<Opcode> {
        match kind {
            ResourceKind::Buffer => Some(Opcode::IsBuffer),
            ResourceKind::Texture => Some(Opcode::IsTexture),
            ResourceKind::Framebuffer => Some(Opcode::IsFramebuffer),
            ResourceKind::Renderbuffer => Some(Opcode::IsRenderbuffer),
            ResourceKind::Shader => Some(Opcode::IsShader),
            ResourceKind::Program => Some(Opcode::IsProgram),
            ResourceKind::UniformLocation | ResourceKind::HostTexture => None,
        }
    }

    pub fn create_for(kind: ResourceKind) -> Option<Opcode> {
        match kind {
            ResourceKind::Buffer => Some(Opcode::CreateBuffer),
            ResourceKind::Texture => Some(Opcode::CreateTexture),
            ResourceKind::Framebuffer => Some(Opcode::CreateFramebuffer),
            ResourceKind::Renderbuffer => Some(Opcode::CreateRenderbuffer),
            ResourceKind::Shader => Some(Opcode::CreateShader),
            ResourceKind::Program => Some(Opcode::CreateProgram),
            ResourceKind::UniformLocation => Some(Opcode::GetUniformLocation),
            ResourceKind::HostTexture => None,
        }
    }

    pub fn delete_for(kind: ResourceKind) -> Opcode {
        match kind {
            ResourceKind::Buffer => Opcode::DeleteBuffer,
            ResourceKind::Texture => Opcode::DeleteTexture,
            ResourceKind::Framebuffer => Opcode::DeleteFramebuffer,
            ResourceKind::Renderbuffer => Opcode::DeleteRenderbuffer,
            ResourceKind::Shader => Opcode::DeleteShader,
            ResourceKind::Program => Opcode::DeleteProgram,
            ResourceKind::UniformLocation => Opcode::ClearLocation,
            ResourceKind::HostTexture => Opcode::ReleaseHostTexture,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Extension(code) => write!(f, "extension({:#06x})", code),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_opcodes_carry_the_handle_in_slot_zero() {
        for kind in [
            ResourceKind::Buffer,
            ResourceKind::Texture,
            ResourceKind::Framebuffer,
            ResourceKind::Renderbuffer,
            ResourceKind::Shader,
            ResourceKind::Program,
            ResourceKind::UniformLocation,
        ] {
            let create = Opcode::create_for(kind).map(Opcode::info);
            let create = match create {
                Some(info) => info,
                None => panic!("no create opcode for {}", kind),
            };
            assert_eq!(create.creates, Some(kind));
            assert_eq!(create.slots[0], SlotKind::Handle(kind));

            let delete = Opcode::delete_for(kind).info();
            assert_eq!(delete.deletes, Some(kind));
            assert_eq!(delete.slots[0], SlotKind::Handle(kind));
        }
    }

    #[test]
    fn no_opcode_exceeds_eight_slots() {
        for op in [Opcode::TexSubImage2D, Opcode::Extension(7), Opcode::TexImage2D] {
            assert!(op.info().slots.len() <= 8, "{} has too many slots", op);
        }
    }
}
