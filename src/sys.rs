//! OS primitives used by the interposers.
//!
//! Calls that the preload libraries themselves export (`bind`, `accept4`,
//! `getsockname`, `getpeername`, `close`) must never be reached through libc
//! from here, or they would re-enter the interposer. They go through
//! [`SocketCalls`] instead.

use crate::error::{Result, check};
use libc::{c_int, sockaddr, socklen_t};
use std::io::{self, Read};
use std::os::unix::io::RawFd;

/// The real implementations of the intercepted calls.
///
/// # Safety
///
/// Implementations must behave like the libc functions of the same name.
pub unsafe trait SocketCalls: Send + Sync {
    unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int;
    unsafe fn accept4(
        &self,
        fd: c_int,
        addr: *mut sockaddr,
        len: *mut socklen_t,
        flags: c_int,
    ) -> c_int;
    unsafe fn getsockname(&self, fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int;
    unsafe fn getpeername(&self, fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int;
    unsafe fn close(&self, fd: c_int) -> c_int;
}

/// Calls libc directly, for use when nothing is preloaded.
#[derive(Debug, Default, Clone, Copy)]
pub struct Libc;

unsafe impl SocketCalls for Libc {
    unsafe fn bind(&self, fd: c_int, addr: *const sockaddr, len: socklen_t) -> c_int {
        unsafe { libc::bind(fd, addr, len) }
    }

    unsafe fn accept4(
        &self,
        fd: c_int,
        addr: *mut sockaddr,
        len: *mut socklen_t,
        flags: c_int,
    ) -> c_int {
        unsafe { libc::accept4(fd, addr, len, flags) }
    }

    unsafe fn getsockname(&self, fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
        unsafe { libc::getsockname(fd, addr, len) }
    }

    unsafe fn getpeername(&self, fd: c_int, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
        unsafe { libc::getpeername(fd, addr, len) }
    }

    unsafe fn close(&self, fd: c_int) -> c_int {
        unsafe { libc::close(fd) }
    }
}

/// `SO_TYPE` of a socket.
pub fn socket_type(fd: RawFd) -> Result<c_int> {
    let mut sock_type: c_int = 0;
    let mut len = std::mem::size_of::<c_int>() as socklen_t;
    check(unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            (&mut sock_type as *mut c_int).cast(),
            &mut len,
        )
    })?;
    Ok(sock_type)
}

/// Descriptor flags (`F_GETFD`) and status flags (`F_GETFL`) of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdFlags {
    pub fd_flags: c_int,
    pub status_flags: c_int,
}

impl FdFlags {
    pub fn snapshot(fd: RawFd) -> Result<Self> {
        Ok(Self {
            fd_flags: check(unsafe { libc::fcntl(fd, libc::F_GETFD) })?,
            status_flags: check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?,
        })
    }

    pub fn restore(&self, fd: RawFd) -> Result<()> {
        check(unsafe { libc::fcntl(fd, libc::F_SETFD, self.fd_flags) })?;
        check(unsafe { libc::fcntl(fd, libc::F_SETFL, self.status_flags) })?;
        Ok(())
    }
}

pub fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

pub fn unix_stream_socket() -> Result<RawFd> {
    check(unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) })
}

/// Put the object behind `source` under the number `target`, then give it
/// back the flags `target` had.
///
/// `dup3` atomically replaces whatever `target` referred to. `source` is left
/// open; closing it is the caller's business.
pub fn splice(source: RawFd, target: RawFd, flags: FdFlags) -> Result<()> {
    check(unsafe { libc::dup3(source, target, libc::O_CLOEXEC) })?;
    flags.restore(target)
}

/// Closes its descriptor through the real `close` unless disarmed.
pub struct FdGuard<'a, C: SocketCalls + ?Sized> {
    fd: RawFd,
    calls: &'a C,
    armed: bool,
}

impl<'a, C: SocketCalls + ?Sized> FdGuard<'a, C> {
    pub fn new(fd: RawFd, calls: &'a C) -> Self {
        Self {
            fd,
            calls,
            armed: true,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Keep the descriptor open and hand it back.
    pub fn disarm(mut self) -> RawFd {
        self.armed = false;
        self.fd
    }

    /// Close now, reporting the outcome.
    pub fn close(mut self) -> Result<()> {
        self.armed = false;
        check(unsafe { self.calls.close(self.fd) }).map(|_| ())
    }
}

impl<C: SocketCalls + ?Sized> Drop for FdGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            unsafe { self.calls.close(self.fd) };
        }
    }
}

/// Blocking reads from a borrowed descriptor.
///
/// Unlike [`Read::read_exact`] callers, nothing here retries `EINTR`.
#[derive(Debug, Clone, Copy)]
pub struct FdReader(pub RawFd);

impl Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.0, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }
}
