//! C ABI - the `ni_*` entry points host adapters link against
//!
//! Every entry point works on `Runtime::global()`. Handles cross as `usize`
//! with 0 meaning null; names are NUL-terminated UTF-8; stack strings are
//! pointer + length.
//!
//! A protocol error never unwinds into the host: whatever `fatal_mode`
//! says, a failure inside an entry point ends in an abort.

#![allow(non_snake_case)]

mod objects;
mod stack;

pub use objects::*;
pub use stack::*;

use crate::error::ProtocolError;
use crate::host::{
    CallbackTable, ClientClearSafetyAreaFn, ClientFuncExecFn, ClientFuncReleaseFn, ClientMethodExecFn,
    ClientObjectReleaseFn,
};
use crate::instances::InstanceRef;
use crate::registry::{ExceptionRef, InterfaceMethodRef, InterfaceRef, ModuleMethodRef, ModuleRef};
use crate::runtime::Runtime;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

/// Native entry point as seen from C: arguments and results travel on the
/// stack
pub type NativeEntry = extern "C" fn();

/// Run `f` against the global runtime; a panic becomes an abort
fn guard<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(|| f(Runtime::global()))) {
        Ok(value) => value,
        Err(_) => std::process::abort(),
    }
}

/// Borrow a NUL-terminated name
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn name_arg<'a>(rt: &Runtime, ptr: *const c_char, argument: &'static str) -> &'a str {
    if ptr.is_null() {
        rt.fatal(ProtocolError::NullPointer { argument });
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(name) => name,
        Err(_) => rt.fatal(ProtocolError::InvalidUtf8 { argument }),
    }
}

#[inline]
fn exception_raw(exception: Option<ExceptionRef>) -> usize {
    exception.map_or(0, ExceptionRef::into_raw)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Install the host callbacks; the calling thread becomes the owner thread
///
/// Returns 0 on success, 1 when already initialized.
#[no_mangle]
pub extern "C" fn ni_nativeImplInit(
    func_exec: ClientFuncExecFn,
    func_release: ClientFuncReleaseFn,
    method_exec: ClientMethodExecFn,
    object_release: ClientObjectReleaseFn,
    clear_safety_area: ClientClearSafetyAreaFn,
) -> i32 {
    guard(|rt| {
        let table = CallbackTable {
            func_exec,
            func_release,
            method_exec,
            object_release,
            clear_safety_area,
        };
        match rt.init(table) {
            Ok(()) => 0,
            Err(err) => {
                warn!(error = %err, "ni_nativeImplInit failed");
                err.status()
            }
        }
    })
}

#[no_mangle]
pub extern "C" fn ni_nativeImplShutdown() {
    guard(|rt| rt.shutdown());
}

/// Run callbacks queued by other threads; call from the owner's event loop
#[no_mangle]
pub extern "C" fn ni_processPendingCallbacks() -> usize {
    guard(|rt| rt.process_pending_callbacks())
}

// ============================================================================
// Registration
// ============================================================================

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_registerModule(name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "module name") };
        rt.register_module(name).into_raw()
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_registerModuleMethod(module: usize, name: *const c_char, entry: NativeEntry) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "method name") };
        let module = rt.check(ModuleRef::from_raw(module));
        rt.register_method(module, name, move |_: &Runtime| entry()).into_raw()
    })
}

#[no_mangle]
pub extern "C" fn ni_registerModuleConstants(module: usize, entry: NativeEntry) {
    guard(|rt| {
        let module = rt.check(ModuleRef::from_raw(module));
        rt.register_constants(module, move |_: &Runtime| entry());
    });
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_registerInterface(module: usize, name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "interface name") };
        let module = rt.check(ModuleRef::from_raw(module));
        rt.register_interface(module, name).into_raw()
    })
}

/// Register an interface method; `entry` may be null when only hosts
/// implement it
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_registerInterfaceMethod(
    iface: usize,
    name: *const c_char,
    entry: Option<NativeEntry>,
) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "interface method name") };
        let iface = rt.check(InterfaceRef::from_raw(iface));
        let method = match entry {
            Some(entry) => rt.register_interface_impl(iface, name, move |_: &Runtime| entry()),
            None => rt.register_interface_method(iface, name),
        };
        method.into_raw()
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_registerException(module: usize, name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "exception name") };
        let module = rt.check(ModuleRef::from_raw(module));
        rt.register_exception(module, name).into_raw()
    })
}

// ============================================================================
// Resolution
// ============================================================================

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_getModule(name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "module name") };
        rt.module(name).into_raw()
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_getModuleMethod(module: usize, name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "method name") };
        let module = rt.check(ModuleRef::from_raw(module));
        rt.method(module, name).into_raw()
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_getInterface(module: usize, name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "interface name") };
        let module = rt.check(ModuleRef::from_raw(module));
        rt.interface(module, name).into_raw()
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_getInterfaceMethod(iface: usize, name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "interface method name") };
        let iface = rt.check(InterfaceRef::from_raw(iface));
        rt.interface_method(iface, name).into_raw()
    })
}

/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ni_getException(module: usize, name: *const c_char) -> usize {
    guard(|rt| {
        let name = unsafe { name_arg(rt, name, "exception name") };
        let module = rt.check(ModuleRef::from_raw(module));
        rt.exception(module, name).into_raw()
    })
}

// ============================================================================
// Invocation
// ============================================================================

#[no_mangle]
pub extern "C" fn ni_invokeModuleMethod(method: usize) {
    guard(|rt| {
        let method = rt.check(ModuleMethodRef::from_raw(method));
        rt.invoke_module_method(method);
    });
}

/// Returns the pending exception handle, or 0
#[no_mangle]
pub extern "C" fn ni_invokeModuleMethodWithExceptions(method: usize) -> usize {
    guard(|rt| {
        let method = rt.check(ModuleMethodRef::from_raw(method));
        exception_raw(rt.invoke_module_method_with_exceptions(method))
    })
}

/// Dispatch an interface method to a host object
#[no_mangle]
pub extern "C" fn ni_invokeInterfaceMethod(method: usize, object: i32) {
    guard(|rt| {
        let method = rt.check(InterfaceMethodRef::from_raw(method));
        rt.invoke_interface_method(method, InstanceRef::Client(object));
    });
}

#[no_mangle]
pub extern "C" fn ni_invokeInterfaceMethodWithExceptions(method: usize, object: i32) -> usize {
    guard(|rt| {
        let method = rt.check(InterfaceMethodRef::from_raw(method));
        exception_raw(rt.invoke_interface_method_with_exceptions(method, InstanceRef::Client(object)))
    })
}

#[no_mangle]
pub extern "C" fn ni_pushModuleConstants(module: usize) {
    guard(|rt| {
        let module = rt.check(ModuleRef::from_raw(module));
        rt.push_module_constants(module);
    });
}

// ============================================================================
// Exceptions and diagnostics
// ============================================================================

#[no_mangle]
pub extern "C" fn ni_setException(exception: usize) {
    guard(|rt| {
        let exception = rt.check(ExceptionRef::from_raw(exception));
        rt.set_exception(exception);
    });
}

/// Log every live id; returns how many instance and function ids are held
#[no_mangle]
pub extern "C" fn ni_dumpTables() -> usize {
    guard(|rt| {
        let dump = rt.dump_tables();
        info!(event = "table_dump", "{}", dump);
        dump.server_instances.len() + dump.client_instances.len() + dump.server_funcs.len() + dump.client_funcs.len()
    })
}
