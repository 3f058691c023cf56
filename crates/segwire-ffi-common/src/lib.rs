//! C boundary helpers shared by `segwire`.
//!
//! The boundary hands data across in two directions:
//!
//! - Inbound, caller memory is viewed through [`slice_from_raw`] and
//!   [`cstr_to_str`] without copying. Those views must not outlive the call.
//! - Outbound, encoded frames are lent for the duration of a callback via
//!   [`slice_ptr`]; nothing in them is owned by the caller.
//!
//! The only heap values the caller ever owns are engine handles and C
//! strings. Each has a matching `free_*` helper that ignores NULL.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::slice;

/// Allocate a C string the caller must release with [`free_cstring`].
///
/// Interior NUL bytes make the message unrepresentable, so `fallback` is
/// used instead.
///
/// # Example
/// ```
/// use segwire_ffi_common::{cstring_new_or_fallback, free_cstring};
///
/// let ptr = cstring_new_or_fallback("decode failed", "error");
/// unsafe { free_cstring(ptr) };
/// ```
#[inline]
pub fn cstring_new_or_fallback(s: &str, fallback: &'static str) -> *mut c_char {
    CString::new(s)
        .or_else(|_| CString::new(fallback))
        .unwrap_or_default()
        .into_raw()
}

/// Release a string from [`cstring_new_or_fallback`]. NULL is ignored.
///
/// # Safety
/// The pointer must have been allocated by `CString::into_raw()` or be null.
#[inline]
pub unsafe fn free_cstring(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

/// Release an engine handle created with `Box::into_raw`. NULL is ignored.
///
/// # Safety
/// The pointer must have been allocated by `Box::into_raw()` or be null.
#[inline]
pub unsafe fn free_boxed<T>(ptr: *mut T) {
    if !ptr.is_null() {
        unsafe {
            let _ = Box::from_raw(ptr);
        }
    }
}

/// Borrow a slice as a raw pointer for a C consumer.
///
/// Empty slices map to NULL so consumers never see a dangling address.
#[inline]
pub fn slice_ptr<T>(values: &[T]) -> *const T {
    if values.is_empty() {
        ptr::null()
    } else {
        values.as_ptr()
    }
}

/// View caller memory as a slice, treating NULL or zero length as empty.
///
/// # Safety
/// When `ptr` is non-null it must point to `len` initialized values of `T`
/// that stay valid and unmodified for the returned lifetime.
#[inline]
pub unsafe fn slice_from_raw<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(ptr, len) }
    }
}

/// Borrow a NUL-terminated UTF-8 string, such as a tensor name or config JSON.
///
/// Fails with a static reason for NULL or non-UTF-8 input.
///
/// # Safety
/// A non-null `ptr` must stay valid and NUL-terminated for `'a`.
pub unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Result<&'a str, &'static str> {
    if ptr.is_null() {
        return Err("null pointer");
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| "invalid UTF-8")
}

/// Status structs that report failure through an owned `error_msg`.
///
/// Implementors only describe how to build the failed value; [`error`]
/// allocates the message so every status frees the same way.
///
/// [`error`]: FfiResult::error
pub trait FfiResult: Sized {
    /// Message used when the real one contains NUL bytes
    const ERROR_FALLBACK: &'static str;

    /// Build the failed status around an already allocated message
    fn error_fields(error_msg: *mut c_char) -> Self;

    /// Failed status carrying `msg`
    #[inline]
    fn error(msg: &str) -> Self {
        let error_msg = cstring_new_or_fallback(msg, Self::ERROR_FALLBACK);
        Self::error_fields(error_msg)
    }
}

/// Export `$fn_name` returning the crate version as a static C string.
#[macro_export]
macro_rules! define_version_fn {
    ($fn_name:ident) => {
        #[no_mangle]
        pub extern "C" fn $fn_name() -> *const std::os::raw::c_char {
            concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const std::os::raw::c_char
        }
    };
}

/// Export `$fn_name` releasing a boxed `$engine_type` handle.
///
/// # Example
/// ```ignore
/// segwire_ffi_common::define_engine_free!(segwire_engine_free, SegwireEngine);
/// ```
#[macro_export]
macro_rules! define_engine_free {
    ($fn_name:ident, $engine_type:ty) => {
        #[no_mangle]
        #[allow(clippy::not_unsafe_ptr_arg_deref)]
        pub extern "C" fn $fn_name(ptr: *mut $engine_type) {
            unsafe { $crate::free_boxed(ptr) };
        }
    };
}

/// Export `$fn_name` releasing a string allocated by this library.
#[macro_export]
macro_rules! define_string_free {
    ($fn_name:ident) => {
        #[no_mangle]
        #[allow(clippy::not_unsafe_ptr_arg_deref)]
        pub extern "C" fn $fn_name(s: *mut std::os::raw::c_char) {
            unsafe { $crate::free_cstring(s) };
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cstring_new_or_fallback() {
        let ptr = cstring_new_or_fallback("hello", "fallback");
        assert!(!ptr.is_null());
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert_eq!(s, "hello");
        unsafe { free_cstring(ptr) };
    }

    #[test]
    fn test_cstring_with_null_bytes_uses_fallback() {
        let ptr = cstring_new_or_fallback("hel\0lo", "fallback");
        let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap();
        assert_eq!(s, "fallback");
        unsafe { free_cstring(ptr) };
    }

    #[test]
    fn test_free_null_is_safe() {
        unsafe { free_cstring(ptr::null_mut()) };
        unsafe { free_boxed::<i32>(ptr::null_mut()) };
    }

    #[test]
    fn test_slice_ptr_empty_is_null() {
        let empty: [i32; 0] = [];
        assert!(slice_ptr(&empty).is_null());
        let values = [1i32, 2, 3];
        assert_eq!(slice_ptr(&values), values.as_ptr());
    }

    #[test]
    fn test_slice_from_raw_null_is_empty() {
        let view: &[f32] = unsafe { slice_from_raw(ptr::null(), 12) };
        assert!(view.is_empty());

        let values = [0.5f32, 0.25];
        let view = unsafe { slice_from_raw(values.as_ptr(), values.len()) };
        assert_eq!(view, &values);
    }

    #[test]
    fn test_cstr_to_str_null() {
        let result = unsafe { cstr_to_str(ptr::null()) };
        assert_eq!(result.unwrap_err(), "null pointer");
    }

    #[test]
    fn test_cstr_to_str_valid() {
        let s = CString::new("dets").unwrap();
        let result = unsafe { cstr_to_str(s.as_ptr()) };
        assert_eq!(result.unwrap(), "dets");
    }
}
