//! Fixed-capacity socket address storage for spoofed endpoints.

use crate::error::{Error, Result};
use libc::{sa_family_t, sockaddr, sockaddr_in, sockaddr_in6, socklen_t};
use std::mem::size_of;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Address family a listener was bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn from_raw(family: sa_family_t) -> Option<Self> {
        match family as i32 {
            libc::AF_INET => Some(Family::V4),
            libc::AF_INET6 => Some(Family::V6),
            _ => None,
        }
    }

    pub fn as_raw(self) -> sa_family_t {
        match self {
            Family::V4 => libc::AF_INET as sa_family_t,
            Family::V6 => libc::AF_INET6 as sa_family_t,
        }
    }

    /// Exact size of the family's `sockaddr_*` structure.
    pub fn sockaddr_len(self) -> usize {
        match self {
            Family::V4 => size_of::<sockaddr_in>(),
            Family::V6 => size_of::<sockaddr_in6>(),
        }
    }
}

/// Either nothing, or one complete `sockaddr_in` / `sockaddr_in6`.
///
/// The reported length is always 0 or the exact structure size.
#[derive(Clone, Copy, Default)]
pub enum AddressBuffer {
    #[default]
    Absent,
    V4(sockaddr_in),
    V6(sockaddr_in6),
}

impl AddressBuffer {
    /// Read an address of the given family out of raw caller bytes.
    ///
    /// `bytes` must be exactly the family's structure size.
    pub fn from_bytes(family: Family, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != family.sockaddr_len() {
            return Err(Error::InvalidArgument("address length does not match family"));
        }
        // SAFETY: length checked above; read_unaligned tolerates any source alignment and
        // both structures are plain old data.
        let buf = unsafe {
            match family {
                Family::V4 => AddressBuffer::V4(std::ptr::read_unaligned(bytes.as_ptr().cast())),
                Family::V6 => AddressBuffer::V6(std::ptr::read_unaligned(bytes.as_ptr().cast())),
            }
        };
        Ok(buf)
    }

    pub fn family(&self) -> Option<Family> {
        match self {
            AddressBuffer::Absent => None,
            AddressBuffer::V4(_) => Some(Family::V4),
            AddressBuffer::V6(_) => Some(Family::V6),
        }
    }

    pub fn len(&self) -> usize {
        self.family().map_or(0, Family::sockaddr_len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Port in host byte order, if an address is present.
    pub fn port(&self) -> Option<u16> {
        match self {
            AddressBuffer::Absent => None,
            AddressBuffer::V4(sin) => Some(u16::from_be(sin.sin_port)),
            AddressBuffer::V6(sin6) => Some(u16::from_be(sin6.sin6_port)),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        let ptr: *const u8 = match self {
            AddressBuffer::Absent => return &[],
            AddressBuffer::V4(sin) => (sin as *const sockaddr_in).cast(),
            AddressBuffer::V6(sin6) => (sin6 as *const sockaddr_in6).cast(),
        };
        // SAFETY: ptr points at a live structure of exactly self.len() bytes.
        unsafe { std::slice::from_raw_parts(ptr, self.len()) }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            AddressBuffer::Absent => None,
            AddressBuffer::V4(sin) => Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
                u16::from_be(sin.sin_port),
            ))),
            AddressBuffer::V6(sin6) => Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            ))),
        }
    }

    /// Copy into `dest`, writing at most `dest.len()` bytes.
    ///
    /// Returns the full length of the address regardless of truncation.
    pub fn copy_to(&self, dest: &mut [u8]) -> usize {
        let src = self.as_bytes();
        let n = src.len().min(dest.len());
        dest[..n].copy_from_slice(&src[..n]);
        src.len()
    }

    /// `getsockname`-style copy-out into a caller buffer.
    ///
    /// # Safety
    ///
    /// `addr` must be valid for `*addrlen` bytes of writes when `addrlen` is non-null.
    pub unsafe fn copy_to_raw(&self, addr: *mut sockaddr, addrlen: *mut socklen_t) -> Result<()> {
        if addrlen.is_null() {
            return Err(Error::Os(std::io::Error::from_raw_os_error(libc::EFAULT)));
        }
        let capacity = unsafe { *addrlen } as usize;
        if capacity > 0 && addr.is_null() {
            return Err(Error::Os(std::io::Error::from_raw_os_error(libc::EFAULT)));
        }
        let dest: &mut [u8] = if capacity == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(addr.cast::<u8>(), capacity) }
        };
        let len = self.copy_to(dest);
        unsafe { *addrlen = len as socklen_t };
        Ok(())
    }
}

impl From<SocketAddrV4> for AddressBuffer {
    fn from(addr: SocketAddrV4) -> Self {
        AddressBuffer::V4(sockaddr_in {
            sin_family: libc::AF_INET as sa_family_t,
            sin_port: addr.port().to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(addr.ip().octets()),
            },
            sin_zero: [0; 8],
        })
    }
}

impl From<SocketAddrV6> for AddressBuffer {
    fn from(addr: SocketAddrV6) -> Self {
        AddressBuffer::V6(sockaddr_in6 {
            sin6_family: libc::AF_INET6 as sa_family_t,
            sin6_port: addr.port().to_be(),
            sin6_flowinfo: addr.flowinfo(),
            sin6_addr: libc::in6_addr {
                s6_addr: addr.ip().octets(),
            },
            sin6_scope_id: addr.scope_id(),
        })
    }
}

impl From<SocketAddr> for AddressBuffer {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => v4.into(),
            SocketAddr::V6(v6) => v6.into(),
        }
    }
}

impl std::fmt::Debug for AddressBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_socket_addr() {
            Some(addr) => write!(f, "AddressBuffer({addr})"),
            None => f.write_str("AddressBuffer(absent)"),
        }
    }
}
