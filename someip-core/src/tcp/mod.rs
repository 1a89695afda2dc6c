//! TCP connection management: framing, back-pressure and the per-connection error-threshold
//! state machine (spec §4.7).

pub mod connection;

pub use connection::{ConnectionState, TcpConnection};
