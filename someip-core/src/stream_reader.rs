//! Incremental SOME/IP framing over a continuous byte stream (TCP or TLS plaintext), spec
//! §4.2. Grounded on `neutronium::net::channel::Channel::read_unpack`'s header-then-payload
//! state machine, generalized from a fixed encrypted frame to the plain SOME/IP wire format
//! and given an explicit `feed`/`take_messages` interface instead of being baked into the
//! channel.

use crate::error::{CoreResult, ErrorKind};
use crate::header::{SomeIpHeader, SOMEIP_HEADER_SIZE};
use crate::payload_pool::PayloadPool;
use std::collections::VecDeque;

/// A fully framed SOME/IP message: header plus an owned payload buffer.
pub struct Message {
    pub header: SomeIpHeader,
    pub payload: Vec<u8>,
}

#[derive(Debug, Eq, PartialEq)]
enum ReadState {
    Header { filled: usize },
    Payload { filled: usize },
}

/// Reassembles a continuous byte stream into complete SOME/IP messages. One instance per TCP
/// (or TLS-bridged) connection.
pub struct StreamMessageReader {
    header_buf: [u8; SOMEIP_HEADER_SIZE],
    header: Option<SomeIpHeader>,
    payload: Vec<u8>,
    state: ReadState,
    max_payload: usize,
    pool: PayloadPool,
    ready: VecDeque<Message>,
}

impl StreamMessageReader {
    pub fn new(max_payload: usize) -> StreamMessageReader {
        StreamMessageReader {
            header_buf: [0u8; SOMEIP_HEADER_SIZE],
            header: None,
            payload: Vec::new(),
            state: ReadState::Header { filled: 0 },
            max_payload,
            pool: PayloadPool::new(),
            ready: VecDeque::new(),
        }
    }

    /// Feeds newly received bytes into the reader. Returns the number of bytes consumed from
    /// `bytes` (always all of them, unless a fatal framing error is hit first — the stream is
    /// then unrecoverable and the caller must disconnect). Completed messages are pushed to the
    /// internal ready queue; drain it with `take_messages`.
    pub fn feed(&mut self, bytes: &[u8]) -> CoreResult<usize> {
        let mut consumed = 0;

        while consumed < bytes.len() {
            match self.state {
                ReadState::Header { filled } => {
                    let take = (SOMEIP_HEADER_SIZE - filled).min(bytes.len() - consumed);
                    self.header_buf[filled..filled + take]
                        .copy_from_slice(&bytes[consumed..consumed + take]);
                    consumed += take;
                    let filled = filled + take;

                    if filled < SOMEIP_HEADER_SIZE {
                        self.state = ReadState::Header { filled };
                        continue;
                    }

                    let header = SomeIpHeader::decode(&self.header_buf)?;
                    let payload_len = header.payload_len() as usize;

                    if payload_len > self.max_payload {
                        return Err(ErrorKind::PayloadTooLarge.into());
                    }

                    self.payload = self.pool.alloc(payload_len);
                    self.header = Some(header);

                    if payload_len == 0 {
                        self.complete_message();
                    } else {
                        self.state = ReadState::Payload { filled: 0 };
                    }
                }
                ReadState::Payload { filled } => {
                    let remaining = self.payload.len() - filled;
                    let take = remaining.min(bytes.len() - consumed);
                    self.payload[filled..filled + take]
                        .copy_from_slice(&bytes[consumed..consumed + take]);
                    consumed += take;
                    let filled = filled + take;

                    if filled < self.payload.len() {
                        self.state = ReadState::Payload { filled };
                        continue;
                    }

                    self.complete_message();
                }
            }
        }

        Ok(consumed)
    }

    fn complete_message(&mut self) {
        let header = self.header.take().expect("header set before payload completes");
        let payload = std::mem::take(&mut self.payload);
        self.ready.push_back(Message { header, payload });
        self.state = ReadState::Header { filled: 0 };
    }

    /// Drains all messages completed since the last call.
    pub fn take_messages(&mut self) -> impl Iterator<Item = Message> + '_ {
        self.ready.drain(..)
    }

    /// Releases buffered partial-message state (used when the owning connection is torn down
    /// mid-message, spec §8 scenario 6).
    pub fn reset(&mut self) {
        if let ReadState::Payload { .. } = self.state {
            self.pool.reclaim(std::mem::take(&mut self.payload));
        }
        self.header = None;
        self.state = ReadState::Header { filled: 0 };
        self.ready.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::header::{E_OK, MSG_TYPE_REQUEST};
    use byteorder::{BigEndian, WriteBytesExt};
    use std::io::Write;

    fn encode_message(service_id: u16, method_id: u16, payload: &[u8]) -> Vec<u8> {
        let header = SomeIpHeader {
            service_id,
            method_id,
            length: 8 + payload.len() as u32,
            client_id: 1,
            session_id: 1,
            protocol_version: 1,
            interface_version: 1,
            message_type: MSG_TYPE_REQUEST,
            return_code: E_OK,
        };
        let mut buf = vec![0u8; SOMEIP_HEADER_SIZE];
        header.encode(&mut buf).unwrap();
        buf.write_all(payload).unwrap();
        buf
    }

    #[test]
    fn reads_single_message_fed_whole() {
        let mut reader = StreamMessageReader::new(65536);
        let wire = encode_message(0x1234, 0x0010, &[0xAA; 8]);

        let consumed = reader.feed(&wire).unwrap();
        assert_eq!(consumed, wire.len());

        let messages: Vec<_> = reader.take_messages().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].header.service_id, 0x1234);
        assert_eq!(messages[0].payload, vec![0xAA; 8]);
    }

    #[test]
    fn holds_and_waits_on_header_only() {
        let mut reader = StreamMessageReader::new(65536);
        let wire = encode_message(0x1234, 0x0010, &[0xAA; 8]);

        reader.feed(&wire[..SOMEIP_HEADER_SIZE]).unwrap();
        assert_eq!(reader.take_messages().count(), 0);

        reader.feed(&wire[SOMEIP_HEADER_SIZE..]).unwrap();
        assert_eq!(reader.take_messages().count(), 1);
    }

    #[test]
    fn feeds_byte_at_a_time() {
        let mut reader = StreamMessageReader::new(65536);
        let wire = encode_message(0x1234, 0x0010, &[1, 2, 3, 4]);

        for byte in &wire {
            reader.feed(std::slice::from_ref(byte)).unwrap();
        }

        let messages: Vec<_> = reader.take_messages().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn splits_multiple_messages_in_one_feed() {
        let mut reader = StreamMessageReader::new(65536);
        let mut wire = encode_message(1, 1, &[1]);
        wire.extend(encode_message(2, 2, &[2, 2]));

        reader.feed(&wire).unwrap();
        let messages: Vec<_> = reader.take_messages().collect();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].payload, vec![1]);
        assert_eq!(messages[1].payload, vec![2, 2]);
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut reader = StreamMessageReader::new(4);
        let wire = encode_message(1, 1, &[0u8; 8]);

        let err = reader.feed(&wire).unwrap_err();
        assert_eq!(err, CoreError::Fatal(ErrorKind::PayloadTooLarge));
    }

    #[test]
    fn rejects_malformed_header() {
        let mut reader = StreamMessageReader::new(65536);
        let mut wire = vec![0u8; SOMEIP_HEADER_SIZE];
        BigEndian::write_u32(&mut wire[4..8], 2); // below LENGTH_FIELD_TAIL

        let err = reader.feed(&wire).unwrap_err();
        assert_eq!(err, CoreError::Fatal(ErrorKind::MalformedHeader));
    }

    #[test]
    fn reset_releases_partial_state() {
        let mut reader = StreamMessageReader::new(65536);
        let wire = encode_message(1, 1, &[9; 16]);
        reader.feed(&wire[..SOMEIP_HEADER_SIZE + 4]).unwrap();

        reader.reset();
        assert_eq!(reader.state, ReadState::Header { filled: 0 });
        assert_eq!(reader.take_messages().count(), 0);
    }
}
