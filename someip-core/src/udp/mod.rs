//! UDP endpoint: per-local-address/port datagram dispatch, peer demux, bulk read scheduling
//! and outbound accumulation (spec §4.8).

pub mod endpoint;
pub mod peer;

pub use endpoint::UdpEndpoint;
pub use peer::PeerRecord;
