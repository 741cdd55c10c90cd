//! The `ni_*` surface driven the way a C host adapter drives it
//!
//! Everything here shares `Runtime::global()`, so the whole session lives in
//! one test.

use nativeimpl::ffi::*;
use nativeimpl::{InstanceRef, InterfaceMethodRef, Runtime};
use std::ffi::CStr;
use std::ptr;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

static FUNC_EXECS: AtomicUsize = AtomicUsize::new(0);
static LAST_FUNC_RELEASE: AtomicI32 = AtomicI32::new(0);
static LAST_METHOD: AtomicUsize = AtomicUsize::new(0);
static LAST_METHOD_OBJECT: AtomicI32 = AtomicI32::new(0);
static LAST_OBJECT_RELEASE: AtomicI32 = AtomicI32::new(0);
static CLEARS: AtomicUsize = AtomicUsize::new(0);

static DIVIDE_BY_ZERO: AtomicUsize = AtomicUsize::new(0);

// ---------------------------------------------------------------------------
// Host side
// ---------------------------------------------------------------------------

extern "C" fn host_func_exec(func: i32) {
    FUNC_EXECS.fetch_add(1, Ordering::SeqCst);
    let value = ni_popInt32();
    ni_pushInt32(func * 1000 + value);
}

extern "C" fn host_func_release(func: i32) {
    LAST_FUNC_RELEASE.store(func, Ordering::SeqCst);
}

extern "C" fn host_method_exec(method: usize, object: i32) {
    LAST_METHOD.store(method, Ordering::SeqCst);
    LAST_METHOD_OBJECT.store(object, Ordering::SeqCst);
    ni_pushInt32(99);
}

extern "C" fn host_object_release(object: i32) {
    LAST_OBJECT_RELEASE.store(object, Ordering::SeqCst);
}

extern "C" fn host_clear_safety_area() {
    CLEARS.fetch_add(1, Ordering::SeqCst);
}

fn pop_string() -> String {
    let mut ptr: *const u8 = ptr::null();
    let mut len = 0usize;
    unsafe {
        ni_popString(&mut ptr, &mut len);
        String::from_utf8(slice::from_raw_parts(ptr, len).to_vec()).unwrap()
    }
}

fn push_string(value: &str) {
    unsafe { ni_pushString(value.as_ptr(), value.len()) };
}

fn name(bytes: &'static [u8]) -> *const std::os::raw::c_char {
    CStr::from_bytes_with_nul(bytes).unwrap().as_ptr()
}

// ---------------------------------------------------------------------------
// Native side
// ---------------------------------------------------------------------------

extern "C" fn math_add() {
    let b = ni_popInt32();
    let a = ni_popInt32();
    ni_pushInt32(a + b);
}

extern "C" fn math_divide() {
    let b = ni_popDouble();
    let a = ni_popDouble();
    if b == 0.0 {
        ni_setException(DIVIDE_BY_ZERO.load(Ordering::SeqCst));
        return;
    }
    ni_pushDouble(a / b);
}

extern "C" fn math_greet() {
    let who = pop_string();
    push_string(&format!("hello, {}", who));
}

/// Calls back into the host callable passed as the last argument
extern "C" fn math_apply() {
    let rt = Runtime::global();
    let func = rt.pop_client_func();
    // the remaining argument is the callable's input
    func.exec();
}

extern "C" fn math_constants() {
    ni_pushDouble(std::f64::consts::E);
    ni_pushDouble(std::f64::consts::PI);
}

extern "C" fn counter_describe() {
    let mut id = 0;
    let mut is_client = true;
    unsafe { ni_popInstance(&mut id, &mut is_client) };
    assert!(!is_client);
    push_string(&format!("counter #{}", id));
}

extern "C" fn add_offset(data: usize) {
    let value = ni_popInt32();
    ni_pushInt32(value + data as i32);
}

#[test]
fn test_c_host_session() {
    let status = ni_nativeImplInit(
        host_func_exec,
        host_func_release,
        host_method_exec,
        host_object_release,
        host_clear_safety_area,
    );
    assert_eq!(status, 0);
    let again = ni_nativeImplInit(
        host_func_exec,
        host_func_release,
        host_method_exec,
        host_object_release,
        host_clear_safety_area,
    );
    assert_eq!(again, 1, "second init reports already initialized");

    // Registration, as a native library's load hook does it
    let module = unsafe { ni_registerModule(name(b"Math\0")) };
    assert_ne!(module, 0);
    unsafe {
        ni_registerModuleMethod(module, name(b"add\0"), math_add);
        ni_registerModuleMethod(module, name(b"divide\0"), math_divide);
        ni_registerModuleMethod(module, name(b"greet\0"), math_greet);
        ni_registerModuleMethod(module, name(b"apply\0"), math_apply);
    }
    ni_registerModuleConstants(module, math_constants);
    let divide_by_zero = unsafe { ni_registerException(module, name(b"DivideByZero\0")) };
    DIVIDE_BY_ZERO.store(divide_by_zero, Ordering::SeqCst);

    let iface = unsafe { ni_registerInterface(module, name(b"Describable\0")) };
    let describe = unsafe { ni_registerInterfaceMethod(iface, name(b"describe\0"), Some(counter_describe)) };

    // Resolution, as the host adapter does it
    assert_eq!(unsafe { ni_getModule(name(b"Math\0")) }, module);
    assert_eq!(unsafe { ni_getInterface(module, name(b"Describable\0")) }, iface);
    assert_eq!(unsafe { ni_getInterfaceMethod(iface, name(b"describe\0")) }, describe);
    assert_eq!(unsafe { ni_getException(module, name(b"DivideByZero\0")) }, divide_by_zero);
    let add = unsafe { ni_getModuleMethod(module, name(b"add\0")) };
    let divide = unsafe { ni_getModuleMethod(module, name(b"divide\0")) };
    let greet = unsafe { ni_getModuleMethod(module, name(b"greet\0")) };
    let apply = unsafe { ni_getModuleMethod(module, name(b"apply\0")) };

    // Primitives
    ni_pushInt32(40);
    ni_pushInt32(2);
    ni_invokeModuleMethod(add);
    assert_eq!(ni_popInt32(), 42);

    ni_pushUInt64(u64::MAX);
    ni_pushBool(true);
    ni_pushInt8(-8);
    ni_pushFloat(1.5);
    ni_pushSizeT(usize::MAX);
    ni_pushPtr(0xdead_beef);
    assert_eq!(ni_popPtr(), 0xdead_beef);
    assert_eq!(ni_popSizeT(), usize::MAX);
    assert_eq!(ni_popFloat(), 1.5);
    assert_eq!(ni_popInt8(), -8);
    assert!(ni_popBool());
    assert_eq!(ni_popUInt64(), u64::MAX);

    // Exception channel
    ni_pushDouble(1.0);
    ni_pushDouble(0.0);
    assert_eq!(ni_invokeModuleMethodWithExceptions(divide), divide_by_zero);
    ni_pushDouble(9.0);
    ni_pushDouble(3.0);
    assert_eq!(ni_invokeModuleMethodWithExceptions(divide), 0);
    assert_eq!(ni_popDouble(), 3.0);

    // Strings
    push_string("world");
    ni_invokeModuleMethod(greet);
    assert_eq!(pop_string(), "hello, world");

    push_string("");
    ni_invokeModuleMethod(greet);
    assert_eq!(pop_string(), "hello, ");

    let words = ["alpha", "", "gamma"];
    let ptrs: Vec<*const u8> = words.iter().map(|w| w.as_ptr()).collect();
    let lens: Vec<usize> = words.iter().map(|w| w.len()).collect();
    unsafe { ni_pushStringArray(ptrs.as_ptr(), lens.as_ptr(), words.len()) };
    let mut out_ptrs: *const *const u8 = ptr::null();
    let mut out_lens: *const usize = ptr::null();
    let count = unsafe { ni_popStringArray(&mut out_ptrs, &mut out_lens) };
    assert_eq!(count, 3);
    let popped: Vec<String> = (0..count)
        .map(|i| unsafe {
            let bytes = slice::from_raw_parts(*out_ptrs.add(i), *out_lens.add(i));
            String::from_utf8(bytes.to_vec()).unwrap()
        })
        .collect();
    assert_eq!(popped, words);

    // Constants
    ni_pushModuleConstants(module);
    assert_eq!(ni_popDouble(), std::f64::consts::PI);
    assert_eq!(ni_popDouble(), std::f64::consts::E);

    // Host callables
    ni_pushInt32(7);
    ni_pushClientFunc(3);
    ni_invokeModuleMethod(apply);
    assert_eq!(ni_popInt32(), 3007);
    assert_eq!(FUNC_EXECS.load(Ordering::SeqCst), 1);
    assert_eq!(LAST_FUNC_RELEASE.load(Ordering::SeqCst), 3);

    ni_pushClientFunc(4);
    assert_eq!(ni_popClientFunc(), 4);

    // Native callables
    let offset = ni_pushServerFunc(add_offset, 100);
    assert_eq!(ni_popServerFunc(), offset);
    ni_pushInt32(5);
    ni_execServerFunc(offset);
    assert_eq!(ni_popInt32(), 105);
    ni_pushInt32(5);
    assert_eq!(ni_execServerFuncWithExceptions(offset), 0);
    assert_eq!(ni_popInt32(), 105);
    ni_releaseServerFunc(offset);

    // Interface dispatch to a host object
    ni_invokeInterfaceMethod(describe, 12);
    assert_eq!(LAST_METHOD.load(Ordering::SeqCst), describe);
    assert_eq!(LAST_METHOD_OBJECT.load(Ordering::SeqCst), 12);
    assert_eq!(ni_popInt32(), 99);

    // Interface dispatch to a native object
    let counter = Runtime::global().push_server_object(Arc::new(0_u32));
    let mut popped_id = 0;
    let mut popped_client = true;
    unsafe { ni_popInstance(&mut popped_id, &mut popped_client) };
    assert_eq!((popped_id, popped_client), (counter, false));
    let describe_ref = InterfaceMethodRef::from_raw(describe).unwrap();
    Runtime::global().invoke_interface_method(describe_ref, InstanceRef::Server(counter));
    assert_eq!(pop_string(), format!("counter #{}", counter));
    ni_releaseServerInst(counter);

    // Null instance
    ni_pushNull();
    unsafe { ni_popInstance(&mut popped_id, &mut popped_client) };
    assert_eq!((popped_id, popped_client), (0, false));

    // Client instance ids pass through unchanged
    ni_pushClientInst(21);
    unsafe { ni_popInstance(&mut popped_id, &mut popped_client) };
    assert_eq!((popped_id, popped_client), (21, true));

    // clearing the server side asks the host to clear its side too
    let clears = CLEARS.load(Ordering::SeqCst);
    ni_clearServerSafetyArea();
    assert_eq!(CLEARS.load(Ordering::SeqCst), clears + 1);
    assert_eq!(ni_processPendingCallbacks(), 0);
    assert_eq!(ni_dumpTables(), 0);
    assert_eq!(LAST_OBJECT_RELEASE.load(Ordering::SeqCst), 0);

    ni_nativeImplShutdown();
    assert!(!Runtime::global().is_initialized());
}
