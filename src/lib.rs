//! nativeimpl - marshalling runtime between native libraries and managed hosts
//!
//! Every call across the boundary goes through one shared value stack:
//! the caller pushes arguments, the callee pops them and pushes its result.
//! Native objects and callables never cross as pointers; hosts see
//! registry-issued ids and handles instead.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod exception;
pub mod ffi;
pub mod functions;
pub mod host;
pub mod instances;
pub mod logging;
pub mod registry;
pub mod runtime;
pub mod safety;
pub mod stack;

// Re-export commonly used items
pub use config::{FatalMode, RuntimeConfig};
pub use error::{ProtocolError, RuntimeError};
pub use functions::{ClientFunc, ClientFuncId, ServerFuncId};
pub use host::{CallbackTable, HostCallbacks};
pub use instances::{ClientObject, InstanceRef};
pub use registry::{ExceptionRef, InterfaceMethodRef, InterfaceRef, ModuleMethodRef, ModuleRef};
pub use runtime::{NativeFn, Runtime, TableDump};
pub use safety::TransientHandle;
pub use stack::{Handle, Marshal, Tag, Value};
