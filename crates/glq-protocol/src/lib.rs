pub mod command;
pub mod error;
pub mod gl;
pub mod handle;
pub mod opcode;
pub mod value;

pub use command::{CommandRecord, Payload, PayloadStats, Slot, MAX_SLOTS};
pub use error::{ErrorFlags, GlError, ProtocolError};
pub use handle::{NativeHandle, ResourceKind, SurfaceId, SurfaceSize, VirtualHandle};
pub use opcode::{CommandClass, Opcode, OpcodeInfo, PayloadRule, SlotKind};
pub use value::{Arg, SyncValue};
