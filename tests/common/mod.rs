#![allow(dead_code)]

use anyhow::{Result, bail};
use libc::{c_int, sockaddr, sockaddr_storage, socklen_t};
use std::collections::HashMap;
use std::ffi::OsString;
use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::RawFd;
use unixbind::protocol::{COMMAND_PROXY, Header, ProxiedFamily};
use unixbind::{AddressBuffer, Family};

pub fn env(pairs: &[(&str, &std::path::Path)]) -> HashMap<String, OsString> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_os_str().to_owned()))
        .collect()
}

pub fn socket(domain: c_int, ty: c_int) -> Result<RawFd> {
    let fd = unsafe { libc::socket(domain, ty | libc::SOCK_CLOEXEC, 0) };
    if fd == -1 {
        bail!("socket: {}", std::io::Error::last_os_error());
    }
    Ok(fd)
}

pub fn listen(fd: RawFd) -> Result<()> {
    if unsafe { libc::listen(fd, 64) } == -1 {
        bail!("listen: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

pub fn raw_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

pub fn option_int(fd: RawFd, level: c_int, name: c_int) -> c_int {
    let mut value: c_int = 0;
    let mut len = std::mem::size_of::<c_int>() as socklen_t;
    let ret = unsafe {
        libc::getsockopt(fd, level, name, (&mut value as *mut c_int).cast(), &mut len)
    };
    assert_eq!(ret, 0, "getsockopt failed: {}", std::io::Error::last_os_error());
    value
}

pub fn status_flags(fd: RawFd) -> c_int {
    unsafe { libc::fcntl(fd, libc::F_GETFL) }
}

pub fn fd_flags(fd: RawFd) -> c_int {
    unsafe { libc::fcntl(fd, libc::F_GETFD) }
}

/// Run an address query and decode what it wrote.
pub fn query<F>(f: F) -> unixbind::Result<(AddressBuffer, socklen_t)>
where
    F: FnOnce(*mut sockaddr, *mut socklen_t) -> unixbind::Result<()>,
{
    let mut storage: sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<sockaddr_storage>() as socklen_t;
    f((&mut storage as *mut sockaddr_storage).cast(), &mut len)?;
    let bytes = unsafe {
        std::slice::from_raw_parts((&storage as *const sockaddr_storage).cast::<u8>(), len as usize)
    };
    let buf = match Family::from_raw(storage.ss_family) {
        Some(family) => AddressBuffer::from_bytes(family, bytes)?,
        None => AddressBuffer::Absent,
    };
    Ok((buf, len))
}

pub fn sock(buf: AddressBuffer) -> SocketAddr {
    buf.to_socket_addr().expect("address present")
}

pub fn preamble(command: u8, family: ProxiedFamily, payload: Vec<u8>) -> Vec<u8> {
    let header = Header {
        command,
        family,
        payload_len: payload.len() as u16,
    };
    let mut out = header.encode().to_vec();
    out.extend(payload);
    out
}

pub fn v4_preamble(src: &str, dst: &str) -> Vec<u8> {
    let src: SocketAddrV4 = src.parse().unwrap();
    let dst: SocketAddrV4 = dst.parse().unwrap();
    let mut payload = Vec::new();
    payload.extend_from_slice(&src.ip().octets());
    payload.extend_from_slice(&dst.ip().octets());
    payload.extend_from_slice(&src.port().to_be_bytes());
    payload.extend_from_slice(&dst.port().to_be_bytes());
    preamble(COMMAND_PROXY, ProxiedFamily::Tcp4, payload)
}

pub fn v6_preamble(src: &str, dst: &str) -> Vec<u8> {
    let src: SocketAddrV6 = src.parse().unwrap();
    let dst: SocketAddrV6 = dst.parse().unwrap();
    let mut payload = Vec::new();
    payload.extend_from_slice(&src.ip().octets());
    payload.extend_from_slice(&dst.ip().octets());
    payload.extend_from_slice(&src.port().to_be_bytes());
    payload.extend_from_slice(&dst.port().to_be_bytes());
    preamble(COMMAND_PROXY, ProxiedFamily::Tcp6, payload)
}
