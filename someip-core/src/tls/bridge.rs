//! The bridge itself: sits between a transport connection and a `TlsProvider`, pumping bytes
//! in both directions and tracking the `Handshaking -> Connected -> Disconnected` state
//! machine from spec §4.10. Has no knowledge of the handshake itself — it only reacts to
//! `TlsEvent`s the provider reports.

use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::tls::provider::{TlsEvent, TlsProvider};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TlsBridgeState {
    Handshaking,
    Connected,
    Disconnected,
}

/// Each secured UDP peer gets its own `TlsBridge` instance wrapping its own provider (spec
/// §4.10 "DTLS specifics"); TCP connections get exactly one.
pub struct TlsBridge<T: TlsProvider> {
    provider: T,
    state: TlsBridgeState,
    /// When set, the first datagram from a new peer is held until cookie verification
    /// completes (spec §4.10 "a cookie-verification option gates the first datagram from a new
    /// peer when configured"). Plain TCP/TLS bridges leave this `false`.
    cookie_verification: bool,
    cookie_verified: bool,
}

impl<T: TlsProvider> TlsBridge<T> {
    pub fn new(provider: T) -> TlsBridge<T> {
        TlsBridge {
            provider,
            state: TlsBridgeState::Handshaking,
            cookie_verification: false,
            cookie_verified: false,
        }
    }

    pub fn with_cookie_verification(provider: T) -> TlsBridge<T> {
        TlsBridge {
            provider,
            state: TlsBridgeState::Handshaking,
            cookie_verification: true,
            cookie_verified: false,
        }
    }

    #[inline]
    pub fn state(&self) -> TlsBridgeState {
        self.state
    }

    /// Marks the DTLS cookie exchange complete for this peer, allowing its datagrams to reach
    /// the provider. A no-op for bridges without cookie verification enabled.
    pub fn mark_cookie_verified(&mut self) {
        self.cookie_verified = true;
    }

    fn cookie_gate_open(&self) -> bool {
        !self.cookie_verification || self.cookie_verified
    }

    /// Receive path: ciphertext arrived on the socket. Feeds the provider and drains any
    /// connectivity events and decrypted plaintext produced as a result. Returns the plaintext
    /// chunks ready to feed into the stream/datagram reader, in order.
    pub fn on_ciphertext_received(&mut self, bytes: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
        if !self.cookie_gate_open() {
            return Ok(Vec::new());
        }

        self.provider.submit_ciphertext(bytes);
        self.apply_events();

        if self.state == TlsBridgeState::Disconnected {
            return Err(ErrorKind::TlsDisconnected.into());
        }

        let mut plaintext = Vec::new();
        while let Some(chunk) = self.provider.take_inbound_plaintext() {
            plaintext.push(chunk);
        }
        Ok(plaintext)
    }

    /// Send path: upstream wants to send `message_bytes`. Rejected with `NotConnected`
    /// (modeled as `CoreError::Wait`, the "try later" signal) while still handshaking (spec
    /// §4.10). Returns the ciphertext chunks ready to write to the transport socket.
    pub fn write(&mut self, message_bytes: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
        if self.state != TlsBridgeState::Connected {
            return Err(CoreError::Wait);
        }

        self.provider.submit_plaintext(message_bytes);
        self.apply_events();
        Ok(self.drain_outbound())
    }

    /// Drains any ciphertext the provider wants written out even without a new upstream
    /// `write` — a handshake in progress produces its own traffic.
    pub fn pump_outbound(&mut self) -> Vec<Vec<u8>> {
        self.apply_events();
        self.drain_outbound()
    }

    fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.provider.take_outbound_ciphertext() {
            out.push(chunk);
        }
        out
    }

    fn apply_events(&mut self) {
        for event in self.provider.take_events() {
            self.state = match event {
                TlsEvent::Connected => TlsBridgeState::Connected,
                TlsEvent::Disconnected => TlsBridgeState::Disconnected,
            };
        }
    }
}
