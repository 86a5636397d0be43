//! Glue shared by the preload libraries: the next definitions of the
//! intercepted symbols and the `-1` + `errno` return convention.

use crate::error::Result;
use crate::sys::SocketCalls;
use lazy_static::lazy_static;
use libc::{c_int, sockaddr, socklen_t};
use std::ffi::CString;

type BindFn = unsafe extern "C" fn(c_int, *const sockaddr, socklen_t) -> c_int;
type Accept4Fn = unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t, c_int) -> c_int;
type SockNameFn = unsafe extern "C" fn(c_int, *mut sockaddr, *mut socklen_t) -> c_int;
type CloseFn = unsafe extern "C" fn(c_int) -> c_int;

lazy_static! {
    static ref ORIGINAL_FUNCTIONS: OriginalFunctions = OriginalFunctions::new();
}

// Store original function pointers
struct OriginalFunctions {
    bind: Option<BindFn>,
    accept4: Option<Accept4Fn>,
    getsockname: Option<SockNameFn>,
    getpeername: Option<SockNameFn>,
    close: Option<CloseFn>,
}

impl OriginalFunctions {
    fn new() -> Self {
        unsafe {
            Self {
                bind: Self::get_original("bind"),
                accept4: Self::get_original("accept4"),
                getsockname: Self::get_original("getsockname"),
                getpeername: Self::get_original("getpeername"),
                close: Self::get_original("close"),
            }
        }
    }

    unsafe fn get_original<T: Copy>(name: &str) -> Option<T> {
        let name_cstr = CString::new(name).ok()?;
        let ptr = unsafe { libc::dlsym(libc::RTLD_NEXT, name_cstr.as_ptr()) };
        if ptr.is_null() {
            tracing::error!("Failed to resolve next definition of {}", name);
            None
        } else {
            Some(unsafe { std::mem::transmute_copy(&ptr) })
        }
    }
}

fn missing() -> c_int {
    set_errno(libc::ENOSYS);
    -1
}

/// The definitions of the intercepted calls that come after ours in lookup
/// order, resolved with `dlsym(RTLD_NEXT, ...)` on first use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NextSymbols;

unsafe impl SocketCalls for NextSymbols {
    unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        match ORIGINAL_FUNCTIONS.bind {
            Some(f) => unsafe { f(fd, addr, len) },
            None => missing(),
        }
    }

    unsafe fn accept4(
        &self,
        fd: c_int,
        addr: *mut sockaddr,
        len: *mut socklen_t,
        flags: c_int,
    ) -> c_int {
        match ORIGINAL_FUNCTIONS.accept4 {
            Some(f) => unsafe { f(fd, addr, len, flags) },
            None => missing(),
        }
    }

    unsafe fn getsockname(&self, fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
        match ORIGINAL_FUNCTIONS.getsockname {
            Some(f) => unsafe { f(fd, addr, len) },
            None => missing(),
        }
    }

    unsafe fn getpeername(&self, fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
        match ORIGINAL_FUNCTIONS.getpeername {
            Some(f) => unsafe { f(fd, addr, len) },
            None => missing(),
        }
    }

    unsafe fn close(&self, fd: c_int) -> c_int {
        match ORIGINAL_FUNCTIONS.close {
            Some(f) => unsafe { f(fd) },
            None => missing(),
        }
    }
}

pub fn set_errno(code: c_int) {
    unsafe { *libc::__errno_location() = code };
}

/// Collapse a result into a C return value, setting `errno` on failure.
pub fn to_c_int(result: Result<c_int>) -> c_int {
    match result {
        Ok(value) => value,
        Err(e) => {
            set_errno(e.errno());
            -1
        }
    }
}

/// As [`to_c_int`], for calls that return 0 on success.
pub fn to_status(result: Result<()>) -> c_int {
    to_c_int(result.map(|()| 0))
}
