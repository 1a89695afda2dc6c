//! Small ambient-stack crate shared by the SOME/IP daemon core: structured logging setup and
//! monotonic/wall-clock time helpers. Kept separate from `someip-core` so the protocol engine
//! does not have to know how its host process wires up logging.

pub mod logging;
pub mod time;

/// Classifies a `Result` coming out of a non-blocking I/O path: did it actually fail, or is
/// `Wait`/`WouldBlock` just the normal "nothing to do yet" signal.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}
