//! Tagged values carried by the shared stack
//!
//! Every argument and result crossing the boundary is one of these. The tag
//! travels with the value so a pop can verify what the producer pushed.

use crate::functions::{ClientFuncId, ServerFuncId};
use crate::instances::InstanceRef;
use core::fmt;

/// Value tag, one per marshalable primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tag {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Size,
    Handle,
    Str,
    ClientFunc,
    ServerFunc,
    Instance,
    Null,
}

impl Tag {
    /// Name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "int8",
            Self::U8 => "uint8",
            Self::I16 => "int16",
            Self::U16 => "uint16",
            Self::I32 => "int32",
            Self::U32 => "uint32",
            Self::I64 => "int64",
            Self::U64 => "uint64",
            Self::F32 => "float",
            Self::F64 => "double",
            Self::Size => "size",
            Self::Handle => "handle",
            Self::Str => "string",
            Self::ClientFunc => "client function",
            Self::ServerFunc => "server function",
            Self::Instance => "instance",
            Self::Null => "null",
        }
    }

    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32
                | Self::I64 | Self::U64 | Self::Size
        )
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opaque pointer-sized handle
///
/// Hosts receive and return these as plain integers. The core never
/// dereferences one; what it designates is up to the code that pushed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// A single stack slot
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Size(usize),
    Handle(Handle),
    Str(String),
    ClientFunc(ClientFuncId),
    ServerFunc(ServerFuncId),
    Instance(InstanceRef),
    Null,
}

impl Value {
    pub const fn tag(&self) -> Tag {
        match self {
            Self::Bool(_) => Tag::Bool,
            Self::I8(_) => Tag::I8,
            Self::U8(_) => Tag::U8,
            Self::I16(_) => Tag::I16,
            Self::U16(_) => Tag::U16,
            Self::I32(_) => Tag::I32,
            Self::U32(_) => Tag::U32,
            Self::I64(_) => Tag::I64,
            Self::U64(_) => Tag::U64,
            Self::F32(_) => Tag::F32,
            Self::F64(_) => Tag::F64,
            Self::Size(_) => Tag::Size,
            Self::Handle(_) => Tag::Handle,
            Self::Str(_) => Tag::Str,
            Self::ClientFunc(_) => Tag::ClientFunc,
            Self::ServerFunc(_) => Tag::ServerFunc,
            Self::Instance(_) => Tag::Instance,
            Self::Null => Tag::Null,
        }
    }
}
