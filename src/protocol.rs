//! Binary (v2) PROXY protocol preamble decoding.
//!
//! Layout: 12-byte signature, command byte, family/protocol byte, big-endian
//! payload length, then the payload. Only the address block at the start of
//! the payload is interpreted; anything after it is read and discarded.

use crate::error::{Error, Result};
use std::io::Read;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

pub const SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];

/// Fixed header size (signature + command + family + length).
pub const HEADER_LEN: usize = 16;

pub const COMMAND_LOCAL: u8 = 0x00;
pub const COMMAND_PROXY: u8 = 0x01;

/// Minimum payload for an IPv4 address block.
pub const IPV4_BLOCK_LEN: usize = 12;
/// Minimum payload for an IPv6 address block.
pub const IPV6_BLOCK_LEN: usize = 36;

/// Family/protocol byte of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxiedFamily {
    Unspecified,
    Tcp4,
    Udp4,
    Tcp6,
    Udp6,
    Other(u8),
}

impl ProxiedFamily {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => ProxiedFamily::Unspecified,
            0x11 => ProxiedFamily::Tcp4,
            0x12 => ProxiedFamily::Udp4,
            0x21 => ProxiedFamily::Tcp6,
            0x22 => ProxiedFamily::Udp6,
            other => ProxiedFamily::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            ProxiedFamily::Unspecified => 0x00,
            ProxiedFamily::Tcp4 => 0x11,
            ProxiedFamily::Udp4 => 0x12,
            ProxiedFamily::Tcp6 => 0x21,
            ProxiedFamily::Udp6 => 0x22,
            ProxiedFamily::Other(b) => b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: u8,
    pub family: ProxiedFamily,
    pub payload_len: u16,
}

impl Header {
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self> {
        if buf[..SIGNATURE.len()] != SIGNATURE {
            return Err(Error::Protocol("bad preamble signature"));
        }
        Ok(Header {
            command: buf[12],
            family: ProxiedFamily::from_byte(buf[13]),
            payload_len: u16::from_be_bytes([buf[14], buf[15]]),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..SIGNATURE.len()].copy_from_slice(&SIGNATURE);
        buf[12] = self.command;
        buf[13] = self.family.to_byte();
        buf[14..].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }
}

/// Endpoints as carried on the wire, before conversion for the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxiedAddresses {
    V4 {
        source: SocketAddrV4,
        destination: SocketAddrV4,
    },
    V6 {
        source: SocketAddrV6,
        destination: SocketAddrV6,
    },
    Unknown,
}

impl ProxiedAddresses {
    /// Decode the address block for `family`, enforcing its minimum length.
    pub fn decode(family: ProxiedFamily, payload: &[u8]) -> Result<Self> {
        match family {
            ProxiedFamily::Tcp4 | ProxiedFamily::Udp4 => {
                if payload.len() < IPV4_BLOCK_LEN {
                    return Err(Error::Protocol("payload too short for IPv4 addresses"));
                }
                let ip = |at: usize| {
                    Ipv4Addr::new(payload[at], payload[at + 1], payload[at + 2], payload[at + 3])
                };
                Ok(ProxiedAddresses::V4 {
                    source: SocketAddrV4::new(ip(0), be16(payload, 8)),
                    destination: SocketAddrV4::new(ip(4), be16(payload, 10)),
                })
            }
            ProxiedFamily::Tcp6 | ProxiedFamily::Udp6 => {
                if payload.len() < IPV6_BLOCK_LEN {
                    return Err(Error::Protocol("payload too short for IPv6 addresses"));
                }
                let ip = |at: usize| {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(&payload[at..at + 16]);
                    Ipv6Addr::from(octets)
                };
                Ok(ProxiedAddresses::V6 {
                    source: SocketAddrV6::new(ip(0), be16(payload, 32), 0, 0),
                    destination: SocketAddrV6::new(ip(16), be16(payload, 34), 0, 0),
                })
            }
            ProxiedFamily::Unspecified | ProxiedFamily::Other(_) => Ok(ProxiedAddresses::Unknown),
        }
    }
}

fn be16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// A fully read and validated preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub header: Header,
    pub addresses: ProxiedAddresses,
}

/// Fill `buf` completely, retrying short reads.
///
/// End of stream before the buffer is full is a protocol error. Read errors,
/// `Interrupted` included, are returned as-is and not retried.
pub fn read_full<R: Read>(reader: &mut R, mut buf: &mut [u8]) -> Result<()> {
    while !buf.is_empty() {
        match reader.read(buf)? {
            0 => return Err(Error::Protocol("connection closed inside preamble")),
            n => buf = &mut buf[n..],
        }
    }
    Ok(())
}

/// Read the header and its whole payload, then validate and decode it.
///
/// The payload is consumed even when the command is rejected, so the byte
/// stream is never left positioned inside the preamble.
pub fn read_preamble<R: Read>(reader: &mut R) -> Result<Preamble> {
    let mut raw = [0u8; HEADER_LEN];
    read_full(reader, &mut raw)?;
    let header = Header::parse(&raw)?;

    let len = header.payload_len as usize;
    let mut payload = Vec::new();
    payload
        .try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory(len))?;
    payload.resize(len, 0);
    read_full(reader, &mut payload)?;

    if header.command != COMMAND_PROXY {
        return Err(Error::Protocol("preamble command is not PROXY"));
    }

    let addresses = ProxiedAddresses::decode(header.family, &payload)?;
    Ok(Preamble { header, addresses })
}
