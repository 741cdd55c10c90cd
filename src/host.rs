//! Host adapter - the five callbacks a host supplies at init
//!
//! Native code reaches back into the host only through these. The runtime
//! routes each call through the dispatcher, so implementations always run
//! on the thread that called `init`.

use crate::functions::ClientFuncId;
use crate::registry::InterfaceMethodRef;
use crate::runtime::Runtime;
use tracing::trace;

/// Callbacks into the host environment
///
/// Each call is synchronous: it returns once the host has finished,
/// including any stack traffic it performs on `rt`.
pub trait HostCallbacks: Send + Sync {
    /// Run a stored host callable; arguments and results travel on the stack
    fn client_func_exec(&self, rt: &Runtime, func: ClientFuncId);

    /// Native code dropped its last reference to a host callable
    fn client_func_release(&self, rt: &Runtime, func: ClientFuncId);

    /// Run `method` on the host object `object`
    fn client_method_exec(&self, rt: &Runtime, method: InterfaceMethodRef, object: i32);

    /// Native code dropped its last reference to a host object
    fn client_object_release(&self, rt: &Runtime, object: i32);

    /// Invalidate host-side transient state
    fn client_clear_safety_area(&self, rt: &Runtime);
}

pub type ClientFuncExecFn = extern "C" fn(func: i32);
pub type ClientFuncReleaseFn = extern "C" fn(func: i32);
pub type ClientMethodExecFn = extern "C" fn(method: usize, object: i32);
pub type ClientObjectReleaseFn = extern "C" fn(object: i32);
pub type ClientClearSafetyAreaFn = extern "C" fn();

/// Host callbacks given as C function pointers
///
/// The C side reaches the stack through the `ni_*` entry points, which
/// operate on the global runtime, so the `rt` argument is not forwarded.
#[derive(Debug, Clone, Copy)]
pub struct CallbackTable {
    pub func_exec: ClientFuncExecFn,
    pub func_release: ClientFuncReleaseFn,
    pub method_exec: ClientMethodExecFn,
    pub object_release: ClientObjectReleaseFn,
    pub clear_safety_area: ClientClearSafetyAreaFn,
}

impl HostCallbacks for CallbackTable {
    fn client_func_exec(&self, _rt: &Runtime, func: ClientFuncId) {
        trace!(event = "host_callback", callback = "func_exec", func = func.0);
        (self.func_exec)(func.0);
    }

    fn client_func_release(&self, _rt: &Runtime, func: ClientFuncId) {
        trace!(event = "host_callback", callback = "func_release", func = func.0);
        (self.func_release)(func.0);
    }

    fn client_method_exec(&self, _rt: &Runtime, method: InterfaceMethodRef, object: i32) {
        trace!(event = "host_callback", callback = "method_exec", object);
        (self.method_exec)(method.into_raw(), object);
    }

    fn client_object_release(&self, _rt: &Runtime, object: i32) {
        trace!(event = "host_callback", callback = "object_release", object);
        (self.object_release)(object);
    }

    fn client_clear_safety_area(&self, _rt: &Runtime) {
        trace!(event = "host_callback", callback = "clear_safety_area");
        (self.clear_safety_area)();
    }
}
