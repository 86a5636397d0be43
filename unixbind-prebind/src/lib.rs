use lazy_static::lazy_static;
use libc::{c_int, sockaddr, socklen_t};
use tracing::info;
use unixbind::preload::{NextSymbols, to_status};
use unixbind::{Prebinder, ProcessEnvironment};

lazy_static! {
    static ref PREBINDER: Prebinder<NextSymbols, ProcessEnvironment> =
        Prebinder::new(NextSymbols, ProcessEnvironment);
}

#[ctor::ctor]
fn init_shim() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    info!("prebind shim loaded");
}

/// Intercept bind() - swap in the descriptor named by TCPFD_<port> / UDPFD_<port>
#[unsafe(no_mangle)]
pub unsafe extern "C" fn bind(sockfd: c_int, addr: *const sockaddr, addrlen: socklen_t) -> c_int {
    to_status(unsafe { PREBINDER.bind(sockfd, addr, addrlen) })
}
