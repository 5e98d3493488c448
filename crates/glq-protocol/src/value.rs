use serde::{Deserialize, Serialize};

use crate::handle::NativeHandle;

/// A slot after handle resolution, as handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
    Native(NativeHandle),
}

impl Arg {
    pub fn as_int(self) -> i32 {
        match self {
            Arg::Int(v) => v,
            Arg::Float(v) => v as i32,
            Arg::Native(h) => h.raw() as i32,
        }
    }

    pub fn as_uint(self) -> u32 {
        self.as_int() as u32
    }

    pub fn as_float(self) -> f32 {
        match self {
            Arg::Int(v) => v as f32,
            Arg::Float(v) => v,
            Arg::Native(h) => h.raw() as f32,
        }
    }

    pub fn as_native(self) -> NativeHandle {
        match self {
            Arg::Native(h) => h,
            Arg::Int(v) => NativeHandle(v as u32),
            Arg::Float(_) => NativeHandle::NULL,
        }
    }
}

/// Result of a synchronous command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncValue {
    Bool(bool),
    Int(i32),
    Ints(Vec<i32>),
    Float(f32),
    Floats(Vec<f32>),
    Text(String),
    Pixels(Vec<u8>),
}

impl SyncValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SyncValue::Bool(v) => Some(*v),
            SyncValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            SyncValue::Int(v) => Some(*v),
            SyncValue::Bool(v) => Some(*v as i32),
            _ => None,
        }
    }
}
