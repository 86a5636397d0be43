//! unixbind - transparent Unix-domain listeners for unmodified programs
//!
//! This library implements the logic behind the `unixbind` and `prebind`
//! preload libraries: redirecting a TCP `bind` onto a Unix-domain socket
//! chosen by `SOCKET_PATH_<port>`, decoding the binary PROXY preamble of each
//! accepted connection, and answering `getsockname`/`getpeername` with the
//! addresses it carried.

pub mod addr;
pub mod config;
pub mod error;
pub mod interpose;
pub mod prebind;
pub mod preload;
pub mod protocol;
pub mod registry;
pub mod sys;
pub mod translate;

// Re-export commonly used types
pub use addr::{AddressBuffer, Family};
pub use config::{BindConfig, Environment, ProcessEnvironment, SocketKind};
pub use error::{Error, Result};
pub use interpose::Interposer;
pub use prebind::Prebinder;
pub use protocol::{Preamble, ProxiedAddresses, ProxiedFamily};
pub use registry::{ClientEntry, Entry, ListenerEntry, SocketRegistry};
pub use sys::{Libc, SocketCalls};
