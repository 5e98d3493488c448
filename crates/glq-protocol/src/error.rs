use serde::{Deserialize, Serialize};

use crate::gl;
use crate::opcode::{Opcode, PayloadRule};

bitflags::bitflags! {
    /// Sticky error categories, accumulated until polled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ErrorFlags: u32 {
        const INVALID_ENUM                  = 0b0000_0001;
        const INVALID_VALUE                 = 0b0000_0010;
        const INVALID_OPERATION             = 0b0000_0100;
        const OUT_OF_MEMORY                 = 0b0000_1000;
        const INVALID_FRAMEBUFFER_OPERATION = 0b0001_0000;
    }
}

impl ErrorFlags {
    /// Return and clear the highest-priority pending error.
    pub fn take_one(&mut self) -> GlError {
        const ORDER: [(ErrorFlags, GlError); 5] = [
            (ErrorFlags::INVALID_ENUM, GlError::InvalidEnum),
            (ErrorFlags::INVALID_VALUE, GlError::InvalidValue),
            (ErrorFlags::INVALID_OPERATION, GlError::InvalidOperation),
            (ErrorFlags::OUT_OF_MEMORY, GlError::OutOfMemory),
            (
                ErrorFlags::INVALID_FRAMEBUFFER_OPERATION,
                GlError::InvalidFramebufferOperation,
            ),
        ];

        for (flag, error) in ORDER {
            if self.contains(flag) {
                self.remove(flag);
                return error;
            }
        }
        GlError::NoError
    }
}

/// A single error code as returned by `getError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlError {
    NoError,
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    OutOfMemory,
    InvalidFramebufferOperation,
    ContextLost,
}

impl GlError {
    pub fn code(self) -> u32 {
        match self {
            GlError::NoError => gl::NO_ERROR,
            GlError::InvalidEnum => gl::INVALID_ENUM,
            GlError::InvalidValue => gl::INVALID_VALUE,
            GlError::InvalidOperation => gl::INVALID_OPERATION,
            GlError::OutOfMemory => gl::OUT_OF_MEMORY,
            GlError::InvalidFramebufferOperation => gl::INVALID_FRAMEBUFFER_OPERATION,
            GlError::ContextLost => gl::CONTEXT_LOST,
        }
    }
}

/// A control-plane call that does not fit the opcode's schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("{opcode}: expected {expected} arguments, got {got}")]
    ArityMismatch {
        opcode: Opcode,
        expected: usize,
        got: usize,
    },

    #[error("{opcode}: argument {index} should be {expected}")]
    ArgumentType {
        opcode: Opcode,
        index: usize,
        expected: &'static str,
    },

    #[error("{opcode}: payload rule is {rule:?}")]
    Payload { opcode: Opcode, rule: PayloadRule },

    #[error("{opcode} cannot be issued from the control plane this way")]
    WrongClass { opcode: Opcode },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_drain_in_priority_order() {
        let mut flags = ErrorFlags::INVALID_FRAMEBUFFER_OPERATION
            | ErrorFlags::INVALID_OPERATION
            | ErrorFlags::INVALID_ENUM;
        assert_eq!(flags.take_one(), GlError::InvalidEnum);
        assert_eq!(flags.take_one(), GlError::InvalidOperation);
        assert_eq!(flags.take_one(), GlError::InvalidFramebufferOperation);
        assert_eq!(flags.take_one(), GlError::NoError);
        assert!(flags.is_empty());
    }
}
