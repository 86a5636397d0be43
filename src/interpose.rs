//! Bind redirection onto Unix-domain sockets and PROXY-aware accept.

use crate::addr::{AddressBuffer, Family};
use crate::config::{BindConfig, Environment, UnixAddress};
use crate::error::{Error, Result, check};
use crate::protocol::read_preamble;
use crate::registry::{ListenerEntry, SocketRegistry};
use crate::sys::{self, FdFlags, FdGuard, FdReader, SocketCalls};
use crate::translate::translate;
use libc::{c_int, sa_family_t, sockaddr, socklen_t};
use std::mem::size_of;
use std::os::unix::io::RawFd;
use tracing::{debug, trace, warn};

/// A TCP bind the interposer is allowed to redirect.
#[derive(Debug, Clone, Copy)]
pub struct BindTarget {
    pub family: Family,
    pub address: AddressBuffer,
}

impl BindTarget {
    /// Decide whether `bytes` describes a redirectable bind.
    ///
    /// `Ok(None)` means "not ours, pass through". Only stream sockets with an
    /// IPv4/IPv6 address qualify; for those the length must be exact.
    pub fn classify(bytes: &[u8], is_stream: bool) -> Result<Option<Self>> {
        if bytes.len() < size_of::<sa_family_t>() {
            return Err(Error::InvalidArgument("address shorter than its family tag"));
        }
        let raw_family = sa_family_t::from_ne_bytes([bytes[0], bytes[1]]);
        let Some(family) = Family::from_raw(raw_family) else {
            return Ok(None);
        };
        if !is_stream {
            return Ok(None);
        }
        let address = AddressBuffer::from_bytes(family, bytes)?;
        Ok(Some(Self { family, address }))
    }

    pub fn port(&self) -> u16 {
        self.address.port().unwrap_or(0)
    }
}

/// Process-wide interception state: real calls, configuration, registry.
pub struct Interposer<C, E> {
    calls: C,
    config: BindConfig<E>,
    registry: SocketRegistry,
}

impl<C: SocketCalls, E: Environment> Interposer<C, E> {
    pub fn new(calls: C, env: E) -> Self {
        Self {
            calls,
            config: BindConfig::new(env),
            registry: SocketRegistry::new(),
        }
    }

    pub fn registry(&self) -> &SocketRegistry {
        &self.registry
    }

    /// Intercepted `bind`.
    ///
    /// # Safety
    ///
    /// `addr` must be null or valid for `len` bytes of reads.
    pub unsafe fn bind(&self, fd: RawFd, addr: *const sockaddr, len: socklen_t) -> Result<()> {
        if addr.is_null() {
            return Err(Error::InvalidArgument("null bind address"));
        }
        let bytes = unsafe { std::slice::from_raw_parts(addr.cast::<u8>(), len as usize) };
        let is_stream = sys::socket_type(fd).is_ok_and(|t| t == libc::SOCK_STREAM);

        let Some(target) = BindTarget::classify(bytes, is_stream)? else {
            trace!("bind: fd={} not eligible, passing through", fd);
            return unsafe { self.real_bind(fd, addr, len) };
        };
        let Some(path) = self.config.socket_path(target.port()) else {
            trace!("bind: fd={} port {} not configured", fd, target.port());
            return unsafe { self.real_bind(fd, addr, len) };
        };
        let unix_addr = UnixAddress::new(&path)?;

        let flags = FdFlags::snapshot(fd)?;
        let listener = FdGuard::new(sys::unix_stream_socket()?, &self.calls);
        check(unsafe {
            self.calls
                .bind(listener.fd(), unix_addr.as_ptr(), unix_addr.socklen())
        })?;

        sys::splice(listener.fd(), fd, flags)?;
        listener.close()?;

        self.registry.register_listener(
            fd,
            ListenerEntry {
                family: target.family,
                bound: target.address,
            },
        );
        debug!(
            "bind: fd={} port {} -> {}",
            fd,
            target.port(),
            path.display()
        );
        Ok(())
    }

    unsafe fn real_bind(&self, fd: RawFd, addr: *const sockaddr, len: socklen_t) -> Result<()> {
        check(unsafe { self.calls.bind(fd, addr, len) }).map(|_| ())
    }

    /// Intercepted `accept4`.
    ///
    /// On a redirected listener this blocks until the peer has sent its whole
    /// preamble. There is no timeout.
    ///
    /// # Safety
    ///
    /// `addr`/`addrlen` follow the `accept4` contract.
    pub unsafe fn accept4(
        &self,
        fd: RawFd,
        addr: *mut sockaddr,
        addrlen: *mut socklen_t,
        flags: c_int,
    ) -> Result<RawFd> {
        let Some(family) = self.registry.listener_family(fd) else {
            return check(unsafe { self.calls.accept4(fd, addr, addrlen, flags) });
        };

        let client = check(unsafe {
            self.calls.accept4(
                fd,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                flags & !libc::SOCK_NONBLOCK,
            )
        })?;
        let guard = FdGuard::new(client, &self.calls);

        let preamble = read_preamble(&mut FdReader(client)).inspect_err(|e| {
            warn!("accept: fd={} rejected connection {}: {}", fd, client, e);
        })?;
        let entry = translate(family, &preamble.addresses);

        if flags & libc::SOCK_NONBLOCK != 0 {
            sys::set_nonblocking(client)?;
        }
        if !addr.is_null() {
            unsafe { entry.remote.copy_to_raw(addr, addrlen)? };
        }

        let client = guard.disarm();
        self.registry.register_client(client, entry);
        Ok(client)
    }

    /// Intercepted `getsockname`.
    ///
    /// # Safety
    ///
    /// `addr`/`addrlen` follow the `getsockname` contract.
    pub unsafe fn getsockname(
        &self,
        fd: RawFd,
        addr: *mut sockaddr,
        addrlen: *mut socklen_t,
    ) -> Result<()> {
        match self.registry.get(fd) {
            Some(entry) => unsafe { entry.local().copy_to_raw(addr, addrlen) },
            None => check(unsafe { self.calls.getsockname(fd, addr, addrlen) }).map(|_| ()),
        }
    }

    /// Intercepted `getpeername`.
    ///
    /// # Safety
    ///
    /// `addr`/`addrlen` follow the `getpeername` contract.
    pub unsafe fn getpeername(
        &self,
        fd: RawFd,
        addr: *mut sockaddr,
        addrlen: *mut socklen_t,
    ) -> Result<()> {
        match self.registry.get(fd) {
            Some(entry) => {
                let remote = entry.remote();
                if remote.is_empty() {
                    return Err(Error::NotConnected);
                }
                unsafe { remote.copy_to_raw(addr, addrlen) }
            }
            None => check(unsafe { self.calls.getpeername(fd, addr, addrlen) }).map(|_| ()),
        }
    }

    /// Intercepted `close`. The registry entry goes first so a recycled
    /// descriptor number never inherits it.
    pub fn close(&self, fd: RawFd) -> Result<()> {
        self.registry.forget(fd);
        check(unsafe { self.calls.close(fd) }).map(|_| ())
    }
}
