//! Interface-card monitor (spec §4.11): observes OS link-state notifications for each
//! interface hosting a configured local address and gates endpoint open/close on the
//! transition. Grounded on `neutronium::net::endpoint::Endpoint`'s `changes` drain pattern —
//! link transitions accumulate in a queue the reactor drains each tick, the same way
//! `Endpoint::changes()` drains `ConnectionChange`s, rather than firing callbacks synchronously
//! from inside the OS-notification handler.

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LinkState {
    Up,
    Down,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LinkChange {
    pub interface: String,
    pub state: LinkState,
}

/// Tracks the last-known state of every interface the daemon has heard about and queues
/// transitions for the endpoint manager to act on.
pub struct InterfaceMonitor {
    states: std::collections::HashMap<String, LinkState>,
    changes: Vec<LinkChange>,
}

impl InterfaceMonitor {
    pub fn new() -> InterfaceMonitor {
        InterfaceMonitor { states: std::collections::HashMap::new(), changes: Vec::new() }
    }

    /// Registers interest in `interface` and returns its current state — `Up` if nothing has
    /// been heard about it yet, since an interface with no negative signal is assumed healthy
    /// until an OS notification says otherwise. Late subscribers calling this after the
    /// interface has already gone down see `Down` immediately rather than waiting for the next
    /// transition.
    pub fn observe(&mut self, interface: &str) -> LinkState {
        *self.states.entry(interface.to_string()).or_insert(LinkState::Up)
    }

    #[inline]
    pub fn is_up(&self, interface: &str) -> bool {
        self.states.get(interface).copied().unwrap_or(LinkState::Up) == LinkState::Up
    }

    /// Called from the OS-notification collaborator (posted into the reactor queue, spec §5)
    /// when an interface's link state changes. A no-op if the state didn't actually change —
    /// spurious repeated notifications don't generate spurious open/close cycles downstream.
    pub fn on_notification(&mut self, interface: &str, state: LinkState) {
        let previous = self.states.insert(interface.to_string(), state);
        if previous != Some(state) {
            self.changes.push(LinkChange { interface: interface.to_string(), state });
        }
    }

    /// Drains all transitions accumulated since the last call.
    pub fn changes(&mut self) -> impl Iterator<Item = LinkChange> + '_ {
        self.changes.drain(..)
    }
}

impl Default for InterfaceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
