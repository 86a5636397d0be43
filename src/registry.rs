use crate::addr::{AddressBuffer, Family};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// A listening socket whose transport was replaced by a Unix-domain socket.
#[derive(Debug, Clone, Copy)]
pub struct ListenerEntry {
    /// Family the application believes it bound.
    pub family: Family,
    /// Address the application passed to bind.
    pub bound: AddressBuffer,
}

/// An accepted connection with addresses taken from its proxy preamble.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientEntry {
    pub local: AddressBuffer,
    pub remote: AddressBuffer,
}

#[derive(Debug, Clone, Copy)]
pub enum Entry {
    Listener(ListenerEntry),
    Client(ClientEntry),
}

impl Entry {
    pub fn local(&self) -> AddressBuffer {
        match self {
            Entry::Listener(l) => l.bound,
            Entry::Client(c) => c.local,
        }
    }

    /// Listeners have no peer, so their remote address is always absent.
    pub fn remote(&self) -> AddressBuffer {
        match self {
            Entry::Listener(_) => AddressBuffer::Absent,
            Entry::Client(c) => c.remote,
        }
    }
}

/// Process-wide map from descriptor number to its spoofed socket state.
///
/// Each method takes the lock once and only for the map operation itself.
#[derive(Debug, Default)]
pub struct SocketRegistry {
    entries: Mutex<HashMap<RawFd, Entry>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic elsewhere must not wedge every later socket call in the process.
    fn lock(&self) -> MutexGuard<'_, HashMap<RawFd, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_listener(&self, fd: RawFd, listener: ListenerEntry) {
        self.lock().insert(fd, Entry::Listener(listener));
        debug!("Registered listener: fd={}, family={:?}", fd, listener.family);
    }

    pub fn register_client(&self, fd: RawFd, client: ClientEntry) {
        self.lock().insert(fd, Entry::Client(client));
        debug!(
            "Registered client: fd={}, remote={:?}, local={:?}",
            fd, client.remote, client.local
        );
    }

    pub fn get(&self, fd: RawFd) -> Option<Entry> {
        self.lock().get(&fd).copied()
    }

    pub fn listener_family(&self, fd: RawFd) -> Option<Family> {
        match self.lock().get(&fd) {
            Some(Entry::Listener(l)) => Some(l.family),
            _ => None,
        }
    }

    pub fn forget(&self, fd: RawFd) -> Option<Entry> {
        let removed = self.lock().remove(&fd);
        if removed.is_some() {
            debug!("Forgot socket: fd={}", fd);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
