//! Codecs - conversions between Rust values and stack slots
//!
//! Design: one `Marshal` impl per primitive; composite values (records,
//! arrays) are built from these by the generated wrappers.

use super::value::{Handle, Tag, Value};
use crate::functions::{ClientFuncId, ServerFuncId};
use crate::instances::InstanceRef;

/// A Rust type that occupies exactly one stack slot
pub trait Marshal: Sized {
    /// Tag a pop of this type expects
    const TAG: Tag;

    fn into_value(self) -> Value;

    /// Extract from a slot, handing the slot back on tag mismatch
    fn from_value(value: Value) -> Result<Self, Value>;
}

macro_rules! marshal_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Marshal for $ty {
                const TAG: Tag = Tag::$variant;

                #[inline]
                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                #[inline]
                fn from_value(value: Value) -> Result<Self, Value> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

marshal_primitive! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    usize => Size,
    Handle => Handle,
    String => Str,
    ClientFuncId => ClientFunc,
    ServerFuncId => ServerFunc,
    InstanceRef => Instance,
}
