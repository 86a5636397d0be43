use libc::c_int;
use std::io;
use thiserror::Error;

/// Failure of an intercepted socket call.
///
/// Every variant maps onto a single `errno` value so the preload libraries can
/// report it through the usual `-1` + `errno` channel.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller-supplied address or length, or an unusable configuration value.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The proxy preamble was malformed, truncated, or carried a disallowed command.
    #[error("proxy protocol error: {0}")]
    Protocol(&'static str),

    /// The preamble payload buffer could not be allocated.
    #[error("out of memory allocating {0}-byte preamble payload")]
    OutOfMemory(usize),

    /// Peer address requested for a socket with no recorded remote address.
    #[error("socket is not connected")]
    NotConnected,

    /// Error from an underlying OS primitive, passed through unchanged.
    #[error(transparent)]
    Os(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Capture the calling thread's current `errno`.
    pub fn last_os_error() -> Self {
        Error::Os(io::Error::last_os_error())
    }

    pub fn errno(&self) -> c_int {
        match self {
            Error::InvalidArgument(_) => libc::EINVAL,
            Error::Protocol(_) => libc::EPROTO,
            Error::OutOfMemory(_) => libc::ENOMEM,
            Error::NotConnected => libc::ENOTCONN,
            Error::Os(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Turn a libc-style return value into a `Result`, reading `errno` on `-1`.
pub fn check(ret: c_int) -> Result<c_int> {
    if ret == -1 {
        Err(Error::last_os_error())
    } else {
        Ok(ret)
    }
}
