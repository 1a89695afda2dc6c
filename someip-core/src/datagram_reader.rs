//! Splits a single UDP datagram into zero or more SOME/IP messages (spec §4.3). UDP permits
//! several back-to-back messages per datagram, unlike the single-message-per-buffer framing of
//! the stream reader.

use crate::error::{CoreError, ErrorKind};
use crate::header::{SomeIpHeader, SOMEIP_HEADER_SIZE};

/// A message decoded out of a datagram, borrowing its payload from the original datagram
/// buffer — no allocation happens on the UDP receive path.
pub struct DatagramMessage<'a> {
    pub header: SomeIpHeader,
    pub payload: &'a [u8],
}

/// Frames zero or more messages out of `datagram`. On a malformed header or a short read, the
/// remainder of the datagram is discarded (but not the peer state that owns it) and
/// `MalformedDatagram` is returned alongside whatever messages were already framed.
pub fn frame_datagram(datagram: &[u8]) -> (Vec<DatagramMessage<'_>>, Option<CoreError>) {
    let mut messages = Vec::new();
    let mut offset = 0;

    if datagram.is_empty() {
        return (messages, None);
    }

    loop {
        if offset == datagram.len() {
            return (messages, None);
        }

        let remaining = &datagram[offset..];

        let header = match SomeIpHeader::decode(remaining) {
            Ok(header) => header,
            Err(_) => return (messages, Some(ErrorKind::MalformedDatagram.into())),
        };

        let total_len = SOMEIP_HEADER_SIZE + header.payload_len() as usize;
        if total_len > remaining.len() {
            return (messages, Some(ErrorKind::MalformedDatagram.into()));
        }

        let payload = &remaining[SOMEIP_HEADER_SIZE..total_len];
        messages.push(DatagramMessage { header, payload });
        offset += total_len;
    }
}
