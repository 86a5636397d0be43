//! Bind redirection onto descriptors the supervisor already bound.
//!
//! A bind to port P on a stream (datagram) socket is replaced by the
//! descriptor named in `TCPFD_P` (`UDPFD_P`). No protocol decoding happens
//! and no per-descriptor state is kept.

use crate::addr::Family;
use crate::config::{BindConfig, Environment, SocketKind};
use crate::error::{Error, Result, check};
use crate::sys::{self, FdFlags, SocketCalls};
use libc::{sa_family_t, sockaddr, socklen_t};
use std::mem::size_of;
use std::os::unix::io::RawFd;
use tracing::{debug, trace};

pub struct Prebinder<C, E> {
    calls: C,
    config: BindConfig<E>,
}

impl<C: SocketCalls, E: Environment> Prebinder<C, E> {
    pub fn new(calls: C, env: E) -> Self {
        Self {
            calls,
            config: BindConfig::new(env),
        }
    }

    /// Intercepted `bind`.
    ///
    /// # Safety
    ///
    /// `addr` must be null or valid for `len` bytes of reads.
    pub unsafe fn bind(&self, fd: RawFd, addr: *const sockaddr, len: socklen_t) -> Result<()> {
        if addr.is_null() || (len as usize) < size_of::<sa_family_t>() {
            return Err(Error::InvalidArgument("bind address shorter than its family tag"));
        }
        let bytes = unsafe { std::slice::from_raw_parts(addr.cast::<u8>(), len as usize) };
        let kind = SocketKind::from_raw(sys::socket_type(fd)?);

        let port = match Family::from_raw(sa_family_t::from_ne_bytes([bytes[0], bytes[1]])) {
            Some(family) => {
                if bytes.len() != family.sockaddr_len() {
                    return Err(Error::InvalidArgument("address length does not match family"));
                }
                // sin_port and sin6_port share the offset right after the family tag.
                u16::from_be_bytes([bytes[2], bytes[3]])
            }
            None => return unsafe { self.real_bind(fd, addr, len) },
        };
        let Some(kind) = kind else {
            return unsafe { self.real_bind(fd, addr, len) };
        };

        let Some(prebound) = self.config.prebound_fd(kind, port)? else {
            trace!("bind: fd={} port {} has no pre-bound fd", fd, port);
            return unsafe { self.real_bind(fd, addr, len) };
        };

        let flags = FdFlags::snapshot(fd)?;
        sys::splice(prebound, fd, flags)?;
        debug!("bind: fd={} port {} -> pre-bound fd {}", fd, port, prebound);
        Ok(())
    }

    unsafe fn real_bind(&self, fd: RawFd, addr: *const sockaddr, len: socklen_t) -> Result<()> {
        check(unsafe { self.calls.bind(fd, addr, len) }).map(|_| ())
    }
}
