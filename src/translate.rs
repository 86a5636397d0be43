//! Conversion of wire addresses into the listener's own address family.

use crate::addr::{AddressBuffer, Family};
use crate::protocol::ProxiedAddresses;
use crate::registry::ClientEntry;
use std::net::{Ipv4Addr, SocketAddrV4, SocketAddrV6};

/// Build the spoofed local/remote pair an accepted connection should report.
///
/// An IPv6 listener sees IPv4 peers as `::ffff:a.b.c.d`. An IPv4 listener
/// cannot represent IPv6 peers, so only their ports survive and the addresses
/// are left unspecified. Unknown families yield no addresses at all.
pub fn translate(listener: Family, proxied: &ProxiedAddresses) -> ClientEntry {
    let (remote, local) = match (listener, *proxied) {
        (_, ProxiedAddresses::Unknown) => (AddressBuffer::Absent, AddressBuffer::Absent),
        (Family::V4, ProxiedAddresses::V4 { source, destination }) => {
            (source.into(), destination.into())
        }
        (Family::V4, ProxiedAddresses::V6 { source, destination }) => (
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, source.port()).into(),
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, destination.port()).into(),
        ),
        (Family::V6, ProxiedAddresses::V4 { source, destination }) => {
            (mapped(source).into(), mapped(destination).into())
        }
        (Family::V6, ProxiedAddresses::V6 { source, destination }) => {
            (source.into(), destination.into())
        }
    };
    ClientEntry { local, remote }
}

fn mapped(addr: SocketAddrV4) -> SocketAddrV6 {
    SocketAddrV6::new(addr.ip().to_ipv6_mapped(), addr.port(), 0, 0)
}
