//! Stack primitives over the C ABI

use super::guard;
use crate::error::ProtocolError;
use crate::runtime::Runtime;
use crate::stack::Handle;
use std::slice;

macro_rules! ffi_primitive {
    ($($push:ident, $pop:ident => $ty:ty;)*) => {
        $(
            #[no_mangle]
            pub extern "C" fn $push(value: $ty) {
                guard(|rt| rt.push(value));
            }

            #[no_mangle]
            pub extern "C" fn $pop() -> $ty {
                guard(|rt| rt.pop::<$ty>())
            }
        )*
    };
}

ffi_primitive! {
    ni_pushBool, ni_popBool => bool;
    ni_pushInt8, ni_popInt8 => i8;
    ni_pushUInt8, ni_popUInt8 => u8;
    ni_pushInt16, ni_popInt16 => i16;
    ni_pushUInt16, ni_popUInt16 => u16;
    ni_pushInt32, ni_popInt32 => i32;
    ni_pushUInt32, ni_popUInt32 => u32;
    ni_pushInt64, ni_popInt64 => i64;
    ni_pushUInt64, ni_popUInt64 => u64;
    ni_pushFloat, ni_popFloat => f32;
    ni_pushDouble, ni_popDouble => f64;
    ni_pushSizeT, ni_popSizeT => usize;
}

/// Push an opaque pointer-sized handle
#[no_mangle]
pub extern "C" fn ni_pushPtr(value: usize) {
    guard(|rt| rt.push(Handle::from_raw(value)));
}

#[no_mangle]
pub extern "C" fn ni_popPtr() -> usize {
    guard(|rt| rt.pop::<Handle>().into_raw())
}

/// # Safety
/// `ptr` must be null with `len == 0`, or point to `len` readable bytes.
unsafe fn bytes_arg<'a>(rt: &Runtime, ptr: *const u8, len: usize, argument: &'static str) -> &'a [u8] {
    if len == 0 {
        return &[];
    }
    if ptr.is_null() {
        rt.fatal(ProtocolError::NullPointer { argument });
    }
    slice::from_raw_parts(ptr, len)
}

unsafe fn str_arg<'a>(rt: &Runtime, ptr: *const u8, len: usize, argument: &'static str) -> &'a str {
    let bytes = bytes_arg(rt, ptr, len, argument);
    match std::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(_) => rt.fatal(ProtocolError::InvalidUtf8 { argument }),
    }
}

/// # Safety
/// `ptr` must be null with `len == 0`, or point to `len` bytes of UTF-8.
#[no_mangle]
pub unsafe extern "C" fn ni_pushString(ptr: *const u8, len: usize) {
    guard(|rt| {
        let value = unsafe { str_arg(rt, ptr, len, "string") };
        rt.push_str(value);
    });
}

/// Pop a string into a buffer owned by the safety area
///
/// The buffer is not NUL-terminated. It stays valid until the next
/// `ni_clearServerSafetyArea`, or, with `auto_clear_safety_area` set, until
/// the next top-level invocation starts.
///
/// # Safety
/// `out_ptr` and `out_len` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn ni_popString(out_ptr: *mut *const u8, out_len: *mut usize) {
    guard(|rt| {
        if out_ptr.is_null() || out_len.is_null() {
            rt.fatal(ProtocolError::NullPointer {
                argument: "string output",
            });
        }
        let value: String = rt.pop();
        let (_, ptr, len) = rt.safety_area().stash_bytes(value.into_bytes());
        unsafe {
            *out_ptr = ptr;
            *out_len = len;
        }
    });
}

/// Push `count` strings given as parallel pointer and length arrays
///
/// # Safety
/// `ptrs` and `lens` must each hold `count` entries, and every string must
/// satisfy the contract of `ni_pushString`.
#[no_mangle]
pub unsafe extern "C" fn ni_pushStringArray(ptrs: *const *const u8, lens: *const usize, count: usize) {
    guard(|rt| {
        if count > 0 && (ptrs.is_null() || lens.is_null()) {
            rt.fatal(ProtocolError::NullPointer {
                argument: "string array",
            });
        }
        let items: Vec<&str> = (0..count)
            .map(|i| unsafe { str_arg(rt, *ptrs.add(i), *lens.add(i), "string array element") })
            .collect();
        rt.push_string_array(&items);
    });
}

/// Pop a string array into safety-area buffers; returns the element count
///
/// `*out_ptrs` and `*out_lens` receive parallel arrays of `count` entries.
/// They stay valid until the next `ni_clearServerSafetyArea`, or, with
/// `auto_clear_safety_area` set, until the next top-level invocation starts.
///
/// # Safety
/// `out_ptrs` and `out_lens` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn ni_popStringArray(out_ptrs: *mut *const *const u8, out_lens: *mut *const usize) -> usize {
    guard(|rt| {
        if out_ptrs.is_null() || out_lens.is_null() {
            rt.fatal(ProtocolError::NullPointer {
                argument: "string array output",
            });
        }
        let items = rt.pop_string_array();
        let area = rt.safety_area();

        let mut addresses = Vec::with_capacity(items.len());
        let mut lens = Vec::with_capacity(items.len());
        for item in items {
            let (_, ptr, len) = area.stash_bytes(item.into_bytes());
            addresses.push(ptr as usize);
            lens.push(len);
        }

        // the tables live in the safety area too; moving a Vec keeps its buffer
        let count = addresses.len();
        let table = addresses.as_ptr() as *const *const u8;
        let lens_ptr = lens.as_ptr();
        area.stash(addresses);
        area.stash(lens);
        unsafe {
            *out_ptrs = table;
            *out_lens = lens_ptr;
        }
        count
    })
}

#[no_mangle]
pub extern "C" fn ni_pushNull() {
    guard(|rt| rt.push_null());
}
