//! Opaque registry handles
//!
//! Handles are pointer-sized integers that hosts store and hand back. They
//! are never addresses: the low bits carry the handle kind and the rest an
//! index into the registry, so a handle of the wrong kind (or a value the
//! registry never issued) is caught instead of being trusted.

use crate::error::ProtocolError;
use core::num::NonZeroUsize;

const KIND_BITS: u32 = 3;
const KIND_MASK: usize = (1 << KIND_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum HandleKind {
    Module = 1,
    ModuleMethod = 2,
    Interface = 3,
    InterfaceMethod = 4,
    Exception = 5,
}

impl HandleKind {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::ModuleMethod => "module method",
            Self::Interface => "interface",
            Self::InterfaceMethod => "interface method",
            Self::Exception => "exception",
        }
    }
}

#[inline]
fn encode(kind: HandleKind, index: usize) -> NonZeroUsize {
    let raw = ((index + 1) << KIND_BITS) | kind as usize;
    // kind bits are never zero
    NonZeroUsize::new(raw).unwrap_or(NonZeroUsize::MIN)
}

#[inline]
fn decode(kind: HandleKind, raw: usize) -> Result<usize, ProtocolError> {
    if raw & KIND_MASK != kind as usize || raw >> KIND_BITS == 0 {
        return Err(ProtocolError::UnknownHandle {
            kind: kind.name(),
            raw,
        });
    }
    Ok((raw >> KIND_BITS) - 1)
}

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $name(NonZeroUsize);

        impl $name {
            pub(crate) fn from_index(index: usize) -> Self {
                Self(encode(HandleKind::$kind, index))
            }

            pub(crate) fn index(self) -> usize {
                (self.0.get() >> KIND_BITS) - 1
            }

            /// Rebuild a handle a host handed back
            ///
            /// Only the kind bits are checked here; whether the index is live
            /// is checked by the registry on lookup.
            pub fn from_raw(raw: usize) -> Result<Self, ProtocolError> {
                decode(HandleKind::$kind, raw).map(Self::from_index)
            }

            #[inline]
            pub fn into_raw(self) -> usize {
                self.0.get()
            }
        }
    };
}

opaque_handle!(
    /// A registered module
    ModuleRef => Module
);
opaque_handle!(
    /// A plain native entry point inside a module
    ModuleMethodRef => ModuleMethod
);
opaque_handle!(
    /// A named interface inside a module
    InterfaceRef => Interface
);
opaque_handle!(
    /// One method of an interface, dispatched polymorphically
    InterfaceMethodRef => InterfaceMethod
);
opaque_handle!(
    /// A named exception type; also what the exception channel carries
    ExceptionRef => Exception
);
