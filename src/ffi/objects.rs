//! Instances and functions over the C ABI

use super::{exception_raw, guard};
use crate::error::ProtocolError;
use crate::functions::{ClientFuncId, ServerFuncId};
use crate::runtime::Runtime;
use tracing::trace;

/// Native callable handed to the host from C, with its context word
pub type ServerFuncEntry = extern "C" fn(data: usize);

// ============================================================================
// Instances
// ============================================================================

#[no_mangle]
pub extern "C" fn ni_pushClientInst(id: i32) {
    guard(|rt| rt.push_client_instance(id));
}

#[no_mangle]
pub extern "C" fn ni_pushServerInst(id: i32) {
    guard(|rt| rt.push_server_instance(id));
}

/// Pop an instance as `(id, isClientOwned)`; null comes back as `(0, false)`
///
/// # Safety
/// `out_id` and `out_is_client` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn ni_popInstance(out_id: *mut i32, out_is_client: *mut bool) {
    guard(|rt| {
        if out_id.is_null() || out_is_client.is_null() {
            rt.fatal(ProtocolError::NullPointer {
                argument: "instance output",
            });
        }
        let (id, is_client) = rt
            .pop_instance()
            .map_or((0, false), |inst| (inst.id(), inst.is_client_owned()));
        unsafe {
            *out_id = id;
            *out_is_client = is_client;
        }
    });
}

#[no_mangle]
pub extern "C" fn ni_releaseServerInst(id: i32) {
    guard(|rt| rt.release_server_instance(id));
}

/// Invalidate transient handles and buffers; the host's
/// `clientClearSafetyArea` runs as part of it
#[no_mangle]
pub extern "C" fn ni_clearServerSafetyArea() {
    guard(|rt| {
        rt.clear_server_safety_area();
    });
}

// ============================================================================
// Functions
// ============================================================================

#[no_mangle]
pub extern "C" fn ni_pushClientFunc(id: i32) {
    guard(|rt| rt.push_client_func(ClientFuncId(id)));
}

/// Pop a client function id pushed back by native code
#[no_mangle]
pub extern "C" fn ni_popClientFunc() -> i32 {
    guard(|rt| rt.pop::<ClientFuncId>().0)
}

/// Register a C callable as a server function and push its id
#[no_mangle]
pub extern "C" fn ni_pushServerFunc(entry: ServerFuncEntry, data: usize) -> i32 {
    guard(|rt| {
        let id = rt.push_server_func(move |_: &Runtime| entry(data));
        trace!(event = "ffi_server_func", id = id.0);
        id.0
    })
}

#[no_mangle]
pub extern "C" fn ni_popServerFunc() -> i32 {
    guard(|rt| rt.pop_server_func().0)
}

#[no_mangle]
pub extern "C" fn ni_execServerFunc(id: i32) {
    guard(|rt| rt.exec_server_func(ServerFuncId(id)));
}

/// Returns the pending exception handle, or 0
#[no_mangle]
pub extern "C" fn ni_execServerFuncWithExceptions(id: i32) -> usize {
    guard(|rt| exception_raw(rt.exec_server_func_with_exceptions(ServerFuncId(id))))
}

#[no_mangle]
pub extern "C" fn ni_releaseServerFunc(id: i32) {
    guard(|rt| rt.release_server_func(ServerFuncId(id)));
}
