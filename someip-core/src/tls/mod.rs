//! (D)TLS record-layer bridge (spec §4.10): a shim between a transport socket and an opaque
//! record-layer provider. The core treats the handshake state machine as a black box (spec
//! §1) and only pumps ciphertext/plaintext across the boundary the provider exposes.

pub mod bridge;
pub mod provider;

pub use bridge::{TlsBridge, TlsBridgeState};
pub use provider::{NullTlsProvider, TlsEvent, TlsProvider};
