//! The message-authentication extension, treated as an opaque verify/generate filter (spec
//! §1, §6). The core never looks at MAC bytes itself; it calls through this trait and trusts
//! the result.

use crate::header::SomeIpHeader;

/// One protocol variant a filter instance is scoped to (spec §6: "exposed per protocol (PDU or
/// SOME/IP) variant").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProtocolVariant {
    SomeIp,
    Pdu,
}

/// `verify`/`generate` over a decoded message, keyed by the service/instance/event identity so
/// an implementation can look up the right key material. `message` is the header plus payload
/// bytes as received or about to be sent; the filter returns the (possibly re-framed) bytes
/// that continue down the pipeline.
pub trait MessageAuthenticationFilter {
    /// Verifies `payload` for `(service_id, instance_id, event_id)` on receipt. Returns the
    /// payload to forward (typically unchanged, with any MAC trailer stripped) or `None` if
    /// verification failed and the message must be dropped.
    fn verify(
        &self,
        variant: ProtocolVariant,
        service_id: u16,
        instance_id: u16,
        event_id: u16,
        header: &SomeIpHeader,
        payload: &[u8],
    ) -> Option<Vec<u8>>;

    /// Generates (appends) authentication data before `payload` is sent.
    fn generate(
        &self,
        variant: ProtocolVariant,
        service_id: u16,
        instance_id: u16,
        event_id: u16,
        header: &SomeIpHeader,
        payload: &[u8],
    ) -> Vec<u8>;
}

/// The null filter: passes every message through unchanged, matching "a null implementation
/// passes through" from spec §6.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMessageAuthenticationFilter;

impl MessageAuthenticationFilter for NullMessageAuthenticationFilter {
    #[inline]
    fn verify(
        &self,
        _variant: ProtocolVariant,
        _service_id: u16,
        _instance_id: u16,
        _event_id: u16,
        _header: &SomeIpHeader,
        payload: &[u8],
    ) -> Option<Vec<u8>> {
        Some(payload.to_vec())
    }

    #[inline]
    fn generate(
        &self,
        _variant: ProtocolVariant,
        _service_id: u16,
        _instance_id: u16,
        _event_id: u16,
        _header: &SomeIpHeader,
        payload: &[u8],
    ) -> Vec<u8> {
        payload.to_vec()
    }
}
