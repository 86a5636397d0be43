mod common;

use anyhow::Result;
use common::*;
use libc::socklen_t;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use unixbind::sys::FdReader;
use unixbind::{AddressBuffer, Error, Libc, Prebinder};

type TestPrebinder = Prebinder<Libc, HashMap<String, OsString>>;

fn prebinder(pairs: &[(&str, String)]) -> TestPrebinder {
    let env = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), OsString::from(v)))
        .collect();
    Prebinder::new(Libc, env)
}

fn bind(prebinder: &TestPrebinder, fd: RawFd, addr: &str) -> unixbind::Result<()> {
    let buf = AddressBuffer::from(addr.parse::<SocketAddr>().unwrap());
    unsafe { prebinder.bind(fd, buf.as_bytes().as_ptr().cast(), buf.len() as socklen_t) }
}

fn local_addr(fd: RawFd) -> unixbind::Result<SocketAddr> {
    query(|a, l| unixbind::error::check(unsafe { libc::getsockname(fd, a, l) }).map(|_| ()))
        .map(|(buf, _)| sock(buf))
}

#[test]
fn test_stream_bind_takes_over_prebound_listener() -> Result<()> {
    let supervisor = TcpListener::bind("127.0.0.1:0")?;
    let prebinder = prebinder(&[("TCPFD_7000", supervisor.as_raw_fd().to_string())]);

    let fd = socket(libc::AF_INET, libc::SOCK_STREAM)?;
    bind(&prebinder, fd, "127.0.0.1:7000")?;
    listen(fd)?;
    assert_eq!(local_addr(fd)?, supervisor.local_addr()?);

    let mut client = TcpStream::connect(supervisor.local_addr()?)?;
    client.write_all(b"ping")?;
    let conn = unsafe { libc::accept4(fd, std::ptr::null_mut(), std::ptr::null_mut(), 0) };
    assert!(conn >= 0, "accept failed: {}", std::io::Error::last_os_error());
    let mut buf = [0u8; 4];
    FdReader(conn).read_exact(&mut buf)?;
    assert_eq!(&buf, b"ping");

    // The supervisor's own descriptor is still open and usable.
    assert!(supervisor.local_addr().is_ok());

    raw_close(conn);
    raw_close(fd);
    Ok(())
}

#[test]
fn test_prebind_keeps_caller_flags() -> Result<()> {
    let supervisor = TcpListener::bind("127.0.0.1:0")?;
    let prebinder = prebinder(&[("TCPFD_7001", supervisor.as_raw_fd().to_string())]);

    let fd = socket(libc::AF_INET6, libc::SOCK_STREAM | libc::SOCK_NONBLOCK)?;
    bind(&prebinder, fd, "[::]:7001")?;
    assert_ne!(status_flags(fd) & libc::O_NONBLOCK, 0);
    assert_ne!(fd_flags(fd) & libc::FD_CLOEXEC, 0);
    assert_eq!(local_addr(fd)?, supervisor.local_addr()?);

    raw_close(fd);
    Ok(())
}

#[test]
fn test_datagram_bind_uses_udp_variable() -> Result<()> {
    let supervisor = UdpSocket::bind("127.0.0.1:0")?;
    let tcp = TcpListener::bind("127.0.0.1:0")?;
    let prebinder = prebinder(&[
        ("UDPFD_5353", supervisor.as_raw_fd().to_string()),
        ("TCPFD_5353", tcp.as_raw_fd().to_string()),
    ]);

    let fd = socket(libc::AF_INET, libc::SOCK_DGRAM)?;
    bind(&prebinder, fd, "0.0.0.0:5353")?;
    assert_eq!(local_addr(fd)?, supervisor.local_addr()?);
    assert_eq!(option_int(fd, libc::SOL_SOCKET, libc::SO_TYPE), libc::SOCK_DGRAM);

    raw_close(fd);
    Ok(())
}

#[test]
fn test_unconfigured_binds_pass_through() -> Result<()> {
    let tcp = TcpListener::bind("127.0.0.1:0")?;
    let prebinder = prebinder(&[("TCPFD_0", tcp.as_raw_fd().to_string())]);

    // Only TCPFD_0 exists, so a datagram bind to port 0 is left alone.
    let fd = socket(libc::AF_INET, libc::SOCK_DGRAM)?;
    bind(&prebinder, fd, "127.0.0.1:0")?;
    let addr = local_addr(fd)?;
    assert_ne!(addr.port(), 0);
    assert_eq!(option_int(fd, libc::SOL_SOCKET, libc::SO_TYPE), libc::SOCK_DGRAM);
    raw_close(fd);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plain.sock");
    let fd = socket(libc::AF_UNIX, libc::SOCK_STREAM)?;
    let unix = unixbind::config::UnixAddress::new(&path)?;
    unsafe { prebinder.bind(fd, unix.as_ptr(), unix.socklen()) }?;
    assert!(path.exists());
    raw_close(fd);
    Ok(())
}

#[test]
fn test_invalid_descriptor_values() -> Result<()> {
    for value in ["", "abc", "-3", "12x"] {
        let prebinder = prebinder(&[("TCPFD_7002", value.to_string())]);
        let fd = socket(libc::AF_INET, libc::SOCK_STREAM)?;
        match bind(&prebinder, fd, "127.0.0.1:7002") {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("value {:?} gave {:?}", value, other),
        }
        raw_close(fd);
    }

    // A well-formed number that is not an open descriptor.
    let prebinder = prebinder(&[("TCPFD_7003", "999999".to_string())]);
    let fd = socket(libc::AF_INET, libc::SOCK_STREAM)?;
    let err = bind(&prebinder, fd, "127.0.0.1:7003").unwrap_err();
    assert_eq!(err.errno(), libc::EBADF);
    raw_close(fd);
    Ok(())
}

#[test]
fn test_malformed_addresses() -> Result<()> {
    let prebinder = prebinder(&[]);
    let fd = socket(libc::AF_INET, libc::SOCK_STREAM)?;

    let err = unsafe { prebinder.bind(fd, std::ptr::null(), 16) }.unwrap_err();
    assert_eq!(err.errno(), libc::EINVAL);

    let buf = AddressBuffer::from("127.0.0.1:80".parse::<SocketAddr>()?);
    let err = unsafe { prebinder.bind(fd, buf.as_bytes().as_ptr().cast(), 10) }.unwrap_err();
    assert_eq!(err.errno(), libc::EINVAL);

    let err = bind(&prebinder, -1, "127.0.0.1:80").unwrap_err();
    assert_eq!(err.errno(), libc::EBADF);

    raw_close(fd);
    Ok(())
}

#[test]
fn test_supervisor_socket_still_serves() -> Result<()> {
    let supervisor = TcpListener::bind("127.0.0.1:0")?;
    let prebinder = prebinder(&[("TCPFD_7004", supervisor.as_raw_fd().to_string())]);
    let fd = socket(libc::AF_INET, libc::SOCK_STREAM)?;
    bind(&prebinder, fd, "127.0.0.1:7004")?;
    raw_close(fd);

    let mut client = TcpStream::connect(supervisor.local_addr()?)?;
    client.write_all(b"ok")?;
    let (mut server, _) = supervisor.accept()?;
    let mut buf = [0u8; 2];
    server.read_exact(&mut buf)?;
    assert_eq!(&buf, b"ok");
    Ok(())
}
