//! Environment-driven bind substitution settings.
//!
//! `SOCKET_PATH_<port>` names the Unix-domain path that replaces a TCP
//! listener on `<port>`. `TCPFD_<port>` / `UDPFD_<port>` name an already
//! bound descriptor for the fd hand-off variant.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

pub const SOCKET_PATH_PREFIX: &str = "SOCKET_PATH_";
pub const TCP_FD_PREFIX: &str = "TCPFD_";
pub const UDP_FD_PREFIX: &str = "UDPFD_";

/// Source of configuration values.
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Option<OsString>;
}

/// Reads the live process environment on every lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }
}

impl Environment for HashMap<String, OsString> {
    fn var(&self, key: &str) -> Option<OsString> {
        self.get(key).cloned()
    }
}

/// Socket kind used to pick between `TCPFD_` and `UDPFD_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

impl SocketKind {
    pub fn from_raw(sock_type: libc::c_int) -> Option<Self> {
        match sock_type {
            libc::SOCK_STREAM => Some(SocketKind::Stream),
            libc::SOCK_DGRAM => Some(SocketKind::Datagram),
            _ => None,
        }
    }

    fn fd_prefix(self) -> &'static str {
        match self {
            SocketKind::Stream => TCP_FD_PREFIX,
            SocketKind::Datagram => UDP_FD_PREFIX,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindConfig<E> {
    env: E,
}

impl<E: Environment> BindConfig<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    pub fn socket_path(&self, port: u16) -> Option<PathBuf> {
        self.env
            .var(&format!("{}{}", SOCKET_PATH_PREFIX, port))
            .map(PathBuf::from)
    }

    pub fn prebound_fd(&self, kind: SocketKind, port: u16) -> Result<Option<RawFd>> {
        let Some(value) = self.env.var(&format!("{}{}", kind.fd_prefix(), port)) else {
            return Ok(None);
        };
        value
            .to_str()
            .and_then(|s| s.trim().parse::<RawFd>().ok())
            .filter(|fd| *fd >= 0)
            .map(Some)
            .ok_or(Error::InvalidArgument("pre-bound descriptor is not a decimal fd"))
    }
}

/// A `sockaddr_un` built from a configured path.
#[derive(Clone, Copy)]
pub struct UnixAddress(libc::sockaddr_un);

impl UnixAddress {
    pub fn new(path: &Path) -> Result<Self> {
        let bytes = path.as_os_str().as_bytes();
        let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
        // Room for the terminating NUL.
        if bytes.len() > addr.sun_path.len() - 1 {
            return Err(Error::InvalidArgument("unix socket path too long"));
        }
        if bytes.contains(&0) {
            return Err(Error::InvalidArgument("unix socket path contains NUL"));
        }
        for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }
        Ok(Self(addr))
    }

    pub fn as_ptr(&self) -> *const libc::sockaddr {
        (&self.0 as *const libc::sockaddr_un).cast()
    }

    pub fn socklen(&self) -> libc::socklen_t {
        std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t
    }
}
