//! `TlsProvider`: the opaque record-layer capability object consumed through §6's narrow
//! interface. The actual cryptographic/TLS implementation is an external collaborator (spec
//! §1); this crate only ever holds an owning reference to one, swapped in at startup (spec
//! §9 "Opaque provider plugin").

/// Connectivity events a provider reports as its handshake state machine progresses. Modeled
/// as a drainable queue (spec §9's "capability object" pattern, matching the `changes()` drain
/// used throughout this crate) rather than as registered callback closures — idiomatic Rust
/// favors pull-based draining over owning `Box<dyn Fn>` callbacks here.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TlsEvent {
    Connected,
    Disconnected,
}

/// The record-layer provider interface from spec §4.10. A provider owns the handshake state
/// machine and all key material; the bridge that wraps it knows nothing about either.
pub trait TlsProvider {
    /// Feeds ciphertext received from the transport socket into the provider.
    fn submit_ciphertext(&mut self, bytes: &[u8]);

    /// Drains ciphertext the provider wants written to the transport socket, in order.
    fn take_outbound_ciphertext(&mut self) -> Option<Vec<u8>>;

    /// Feeds plaintext from upstream (the connection's message writer) into the provider for
    /// encryption. Only meaningful once the provider has reported `TlsEvent::Connected`.
    fn submit_plaintext(&mut self, bytes: &[u8]);

    /// Drains plaintext the provider has decrypted, ready to feed into the stream/datagram
    /// reader.
    fn take_inbound_plaintext(&mut self) -> Option<Vec<u8>>;

    /// Drains connectivity events since the last call.
    fn take_events(&mut self) -> Vec<TlsEvent>;
}

impl TlsProvider for Box<dyn TlsProvider> {
    fn submit_ciphertext(&mut self, bytes: &[u8]) {
        (**self).submit_ciphertext(bytes)
    }

    fn take_outbound_ciphertext(&mut self) -> Option<Vec<u8>> {
        (**self).take_outbound_ciphertext()
    }

    fn submit_plaintext(&mut self, bytes: &[u8]) {
        (**self).submit_plaintext(bytes)
    }

    fn take_inbound_plaintext(&mut self) -> Option<Vec<u8>> {
        (**self).take_inbound_plaintext()
    }

    fn take_events(&mut self) -> Vec<TlsEvent> {
        (**self).take_events()
    }
}

/// A pass-through provider used in tests and for plaintext endpoints that are wired through
/// the same bridge code path as secured ones. Reports `Connected` the first time ciphertext
/// (really just plaintext, here) is submitted.
#[derive(Default)]
pub struct NullTlsProvider {
    inbound: std::collections::VecDeque<Vec<u8>>,
    outbound: std::collections::VecDeque<Vec<u8>>,
    events: Vec<TlsEvent>,
    connected: bool,
}

impl NullTlsProvider {
    pub fn new() -> NullTlsProvider {
        NullTlsProvider::default()
    }

    fn ensure_connected(&mut self) {
        if !self.connected {
            self.connected = true;
            self.events.push(TlsEvent::Connected);
        }
    }
}

impl TlsProvider for NullTlsProvider {
    fn submit_ciphertext(&mut self, bytes: &[u8]) {
        self.ensure_connected();
        self.inbound.push_back(bytes.to_vec());
    }

    fn take_outbound_ciphertext(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    fn submit_plaintext(&mut self, bytes: &[u8]) {
        self.ensure_connected();
        self.outbound.push_back(bytes.to_vec());
    }

    fn take_inbound_plaintext(&mut self) -> Option<Vec<u8>> {
        self.inbound.pop_front()
    }

    fn take_events(&mut self) -> Vec<TlsEvent> {
        std::mem::take(&mut self.events)
    }
}
