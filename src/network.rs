use std::sync::atomic::{AtomicBool, Ordering};

/// Reports OS-level connectivity. Transitions are delivered separately through
/// `SfuSocket::on_network_lost` / `on_network_available`.
pub trait NetworkStateProvider: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// For platforms without a connectivity signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl NetworkStateProvider for AlwaysOnline {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Connectivity flag flipped by the embedding application.
#[derive(Debug)]
pub struct SharedNetworkState {
    online: AtomicBool,
}

impl SharedNetworkState {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for SharedNetworkState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkStateProvider for SharedNetworkState {
    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
