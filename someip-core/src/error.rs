//! Shared error plumbing for the core, grounded on `flux::shared::NetworkError` /
//! `neutronium::net::shared::NetworkError`: a `Wait` status for non-blocking I/O's normal
//! "nothing to do" signal, and a `Fatal` variant carrying the concrete taxonomy from spec §7.

use daemon_support::ErrorUtils;
use std::io;
use std::net::AddrParseError;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Eq, PartialEq)]
pub enum CoreError {
    /// Non-blocking I/O would have blocked, or a partial read/write left work pending.
    /// Never surfaced to a caller as a failure.
    Wait,
    Fatal(ErrorKind),
}

/// The peer-fault / resource-fault taxonomy from spec §7.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum ErrorKind {
    MalformedHeader,
    PayloadTooLarge,
    TpOffsetInvalid,
    TpMessageTooLarge,
    MalformedDatagram,
    Disconnected,
    AddressInUse,
    PermissionDenied,
    Unreachable,
    UnknownService,
    WrongInterface,
    UnknownMethod,
    TlsHandshakeFailed,
    TlsDisconnected,
    ProtocolError,
    Io(io::ErrorKind),
}

impl From<io::Error> for CoreError {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => CoreError::Wait,
            kind => CoreError::Fatal(ErrorKind::Io(kind)),
        }
    }
}

impl From<AddrParseError> for CoreError {
    #[inline]
    fn from(_: AddrParseError) -> Self {
        CoreError::Fatal(ErrorKind::Io(io::ErrorKind::InvalidInput))
    }
}

impl From<ErrorKind> for CoreError {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        CoreError::Fatal(kind)
    }
}

impl<T> ErrorUtils for CoreResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(CoreError::Wait))
    }
}

impl CoreError {
    /// Whether this error should count against a TCP connection's `invalid_count` threshold
    /// (spec §4.7) — `Wait` never does, and transport-level disconnects are handled through the
    /// state machine directly rather than the error counter.
    #[inline]
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            CoreError::Fatal(ErrorKind::MalformedHeader)
                | CoreError::Fatal(ErrorKind::PayloadTooLarge)
                | CoreError::Fatal(ErrorKind::TpOffsetInvalid)
                | CoreError::Fatal(ErrorKind::TpMessageTooLarge)
                | CoreError::Fatal(ErrorKind::MalformedDatagram)
                | CoreError::Fatal(ErrorKind::UnknownService)
                | CoreError::Fatal(ErrorKind::WrongInterface)
                | CoreError::Fatal(ErrorKind::UnknownMethod)
        )
    }
}
