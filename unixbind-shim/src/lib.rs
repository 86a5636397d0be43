use lazy_static::lazy_static;
use libc::{c_int, sockaddr, socklen_t};
use tracing::info;
use unixbind::preload::{NextSymbols, to_c_int, to_status};
use unixbind::{Interposer, ProcessEnvironment};

// Global state
lazy_static! {
    static ref INTERPOSER: Interposer<NextSymbols, ProcessEnvironment> =
        Interposer::new(NextSymbols, ProcessEnvironment);
}

// Initialize the shim when loaded
#[ctor::ctor]
fn init_shim() {
    // Logs go to stderr so the host program's stdout stays untouched
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    info!("unixbind shim loaded");
}

// =============================================================================
// Intercepted functions
// =============================================================================

/// Intercept bind() - move configured TCP ports onto Unix-domain sockets
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bind(sockfd: c_int, addr: *const sockaddr, addrlen: socklen_t) -> c_int {
    to_status(unsafe { INTERPOSER.bind(sockfd, addr, addrlen) })
}

/// Intercept accept4() - consume the PROXY preamble on redirected listeners
#[unsafe(no_mangle)]
pub unsafe extern "C" fn accept4(
    sockfd: c_int,
    addr: *mut sockaddr,
    addrlen: *mut socklen_t,
    flags: c_int,
) -> c_int {
    to_c_int(unsafe { INTERPOSER.accept4(sockfd, addr, addrlen, flags) })
}

/// Intercept accept() - same as accept4() without flags
#[unsafe(no_mangle)]
pub unsafe extern "C" fn accept(sockfd: c_int, addr: *mut sockaddr, addrlen: *mut socklen_t) -> c_int {
    unsafe { accept4(sockfd, addr, addrlen, 0) }
}

/// Intercept getsockname() - report the address the program asked for
#[unsafe(no_mangle)]
pub unsafe extern "C" fn getsockname(
    sockfd: c_int,
    addr: *mut sockaddr,
    addrlen: *mut socklen_t,
) -> c_int {
    to_status(unsafe { INTERPOSER.getsockname(sockfd, addr, addrlen) })
}

/// Intercept getpeername() - report the proxied client address
#[unsafe(no_mangle)]
pub unsafe extern "C" fn getpeername(
    sockfd: c_int,
    addr: *mut sockaddr,
    addrlen: *mut socklen_t,
) -> c_int {
    to_status(unsafe { INTERPOSER.getpeername(sockfd, addr, addrlen) })
}

/// Intercept close() to drop FD tracking
#[unsafe(no_mangle)]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    to_status(INTERPOSER.close(fd))
}
