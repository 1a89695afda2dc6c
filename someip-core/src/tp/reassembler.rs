//! Reassembles SOME/IP-TP segments back into a complete message, spec §4.6. One state machine
//! per `(peer, ServiceId, MethodOrEventId, ClientId, SessionId)` tuple; `peer` is left generic
//! so the same engine serves both the TCP path (keyed by connection) and the UDP path (keyed by
//! remote address/port).
//!
//! The protocol is in-order only (spec §5): there is no retransmission and no out-of-order
//! buffering. A segment whose offset does not match `expected_next_offset` discards all state
//! for that key rather than being buffered for later — `o == 0` then starts a fresh assembly,
//! anything else is simply dropped.
//!
//! Per SPEC_FULL.md's Open Question decision, a segment's TP offset is validated for 16-byte
//! alignment (in `header::TpHeader::decode`, before this module ever sees it) strictly before
//! this module's running-size cap is checked.

use crate::error::{CoreResult, ErrorKind};
use crate::header::{SomeIpHeader, TpHeader, LENGTH_FIELD_TAIL};
use indexmap::IndexMap;
use std::hash::Hash;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ReassemblyKey<P> {
    pub peer: P,
    pub service_id: u16,
    pub method_or_event_id: u16,
    pub client_id: u16,
    pub session_id: u16,
}

struct Assembly {
    template: SomeIpHeader,
    buffer: Vec<u8>,
    expected_next_offset: u32,
}

impl Assembly {
    fn new(template: SomeIpHeader, first_payload: &[u8]) -> Assembly {
        Assembly {
            template,
            buffer: first_payload.to_vec(),
            expected_next_offset: first_payload.len() as u32,
        }
    }
}

/// Outcome of feeding one segment into the reassembler.
#[derive(Debug, Eq, PartialEq)]
pub enum ReassemblyOutcome {
    /// Appended to an in-progress assembly; more segments are expected.
    Pending,
    /// The reassembled message is complete (TP flag cleared, `length` recomputed).
    Complete(SomeIpHeader, Vec<u8>),
    /// The segment's offset did not match `expected_next_offset`; any prior state for this key
    /// was discarded. The caller should log a reassembly error (spec §4.6 step 3).
    OutOfSequence,
}

/// Reassembles segmented messages, bounding both the number of concurrently in-flight messages
/// (`max_keys`, evicted oldest-touched-first) and the size any single message may grow to
/// (`max_size`, spec §4.6).
pub struct TpReassembler<P: Eq + Hash + Clone> {
    assemblies: IndexMap<ReassemblyKey<P>, Assembly>,
    max_keys: usize,
    max_size: usize,
}

impl<P: Eq + Hash + Clone> TpReassembler<P> {
    pub fn new(max_keys: usize, max_size: usize) -> TpReassembler<P> {
        TpReassembler { assemblies: IndexMap::new(), max_keys, max_size }
    }

    /// Feeds one TP segment in, following the exact step order from spec §4.6:
    /// 1. no state + `offset == 0` → start a new assembly.
    /// 2. state exists + `offset == expected_next_offset` → append.
    /// 3. anything else → discard state for the key (and, if `offset == 0`, start fresh).
    /// 4. size-cap check after appending.
    /// 5. `more == 0` → emit and drop state.
    pub fn feed(
        &mut self,
        peer: P,
        header: SomeIpHeader,
        tp: TpHeader,
        payload: &[u8],
    ) -> CoreResult<ReassemblyOutcome> {
        let key = ReassemblyKey {
            peer,
            service_id: header.service_id,
            method_or_event_id: header.method_id,
            client_id: header.client_id,
            session_id: header.session_id,
        };

        let out_of_sequence = match self.assemblies.get(&key) {
            None => tp.offset != 0,
            Some(assembly) => tp.offset != assembly.expected_next_offset,
        };

        if out_of_sequence {
            self.assemblies.shift_remove(&key);
            if tp.offset != 0 {
                return Ok(ReassemblyOutcome::OutOfSequence);
            }
        }

        if !self.assemblies.contains_key(&key) {
            if self.assemblies.len() >= self.max_keys {
                self.assemblies.shift_remove_index(0);
            }
            self.assemblies.insert(key.clone(), Assembly::new(header, payload));
        } else {
            let assembly = self.assemblies.get_mut(&key).expect("just checked present");
            assembly.buffer.extend_from_slice(payload);
            assembly.expected_next_offset += payload.len() as u32;
        }

        let assembly = self.assemblies.get(&key).expect("inserted or updated above");
        if assembly.buffer.len() > self.max_size {
            self.assemblies.shift_remove(&key);
            return Err(ErrorKind::TpMessageTooLarge.into());
        }

        if !tp.more {
            let assembly = self.assemblies.shift_remove(&key).expect("present");
            let mut out_header = assembly.template;
            out_header.clear_tp_flag();
            out_header.length = LENGTH_FIELD_TAIL + assembly.buffer.len() as u32;
            return Ok(ReassemblyOutcome::Complete(out_header, assembly.buffer));
        }

        if out_of_sequence {
            Ok(ReassemblyOutcome::OutOfSequence)
        } else {
            Ok(ReassemblyOutcome::Pending)
        }
    }

    /// Drops all reassembly state tied to `peer`, used when a connection disconnects so
    /// partially reassembled messages do not linger (spec §8 scenario 6).
    pub fn drop_peer(&mut self, peer: &P) {
        self.assemblies.retain(|key, _| &key.peer != peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::header::{E_OK, MSG_TYPE_NOTIFICATION, TP_FLAG};

    fn header_with_tp_flag() -> SomeIpHeader {
        SomeIpHeader {
            service_id: 0x1111,
            method_id: 0x8001,
            length: 0,
            client_id: 0x10,
            session_id: 0x20,
            protocol_version: 1,
            interface_version: 1,
            message_type: MSG_TYPE_NOTIFICATION | TP_FLAG,
            return_code: E_OK,
        }
    }

    #[test]
    fn reassembles_in_order_segments() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(16, 1024);
        let header = header_with_tp_flag();

        let first = reassembler
            .feed(1, header, TpHeader { offset: 0, more: true }, &[1; 16])
            .unwrap();
        assert_eq!(first, ReassemblyOutcome::Pending);

        let second = reassembler
            .feed(1, header, TpHeader { offset: 16, more: false }, &[2; 8])
            .unwrap();
        let (out_header, body) = match second {
            ReassemblyOutcome::Complete(h, b) => (h, b),
            other => panic!("expected Complete, got {:?}", other),
        };
        assert!(!out_header.is_tp());
        assert_eq!(body.len(), 24);
        assert_eq!(&body[..16], &[1; 16][..]);
        assert_eq!(&body[16..], &[2; 8][..]);
    }

    #[test]
    fn single_terminal_segment_at_offset_zero_delivers_immediately() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(16, 1024);
        let header = header_with_tp_flag();

        let result = reassembler
            .feed(1, header, TpHeader { offset: 0, more: false }, &[9; 4])
            .unwrap();
        assert!(matches!(result, ReassemblyOutcome::Complete(_, _)));
    }

    #[test]
    fn out_of_order_segment_is_rejected_and_resets_state() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(16, 1024);
        let header = header_with_tp_flag();

        // Arriving out of order (offset 16 before offset 0 was ever seen) is not buffered.
        let result = reassembler
            .feed(1, header, TpHeader { offset: 16, more: false }, &[2; 8])
            .unwrap();
        assert_eq!(result, ReassemblyOutcome::OutOfSequence);

        // A correct start from offset 0 afterwards works cleanly.
        let result = reassembler
            .feed(1, header, TpHeader { offset: 0, more: true }, &[1; 16])
            .unwrap();
        assert_eq!(result, ReassemblyOutcome::Pending);
    }

    #[test]
    fn more_flag_after_terminator_is_rejected_and_resets() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(16, 1024);
        let header = header_with_tp_flag();

        let result = reassembler
            .feed(1, header, TpHeader { offset: 0, more: false }, &[1; 16])
            .unwrap();
        assert!(matches!(result, ReassemblyOutcome::Complete(_, _)));

        // A further "more=1" segment for the same key with offset 0 again is treated as a new
        // message (no prior state survived the completed delivery).
        let result = reassembler
            .feed(1, header, TpHeader { offset: 16, more: true }, &[2; 16])
            .unwrap();
        assert_eq!(result, ReassemblyOutcome::OutOfSequence);
    }

    #[test]
    fn oversized_message_is_rejected_and_state_dropped() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(16, 20);
        let header = header_with_tp_flag();

        let err = reassembler
            .feed(1, header, TpHeader { offset: 0, more: true }, &[0; 32])
            .unwrap_err();
        assert_eq!(err, CoreError::Fatal(ErrorKind::TpMessageTooLarge));

        // State for this key was dropped; a fresh small segment starts clean.
        let fresh = reassembler
            .feed(1, header, TpHeader { offset: 0, more: false }, &[0; 4])
            .unwrap();
        assert!(matches!(fresh, ReassemblyOutcome::Complete(_, _)));
    }

    #[test]
    fn max_keys_evicts_oldest_in_flight_assembly() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(1, 1024);
        let header = header_with_tp_flag();

        reassembler
            .feed(1, header, TpHeader { offset: 0, more: true }, &[0; 16])
            .unwrap();
        // A second peer's message evicts peer 1's in-flight state.
        reassembler
            .feed(2, header, TpHeader { offset: 0, more: true }, &[0; 16])
            .unwrap();

        // Completing peer 1's original message now starts a brand new assembly (offset 16
        // is not 0, so it's rejected as out-of-sequence rather than silently completing).
        let result = reassembler
            .feed(1, header, TpHeader { offset: 16, more: false }, &[0; 8])
            .unwrap();
        assert_eq!(result, ReassemblyOutcome::OutOfSequence);
    }

    #[test]
    fn drop_peer_discards_in_flight_state() {
        let mut reassembler: TpReassembler<u32> = TpReassembler::new(16, 1024);
        let header = header_with_tp_flag();

        reassembler
            .feed(1, header, TpHeader { offset: 0, more: true }, &[0; 16])
            .unwrap();
        reassembler.drop_peer(&1);

        let result = reassembler
            .feed(1, header, TpHeader { offset: 16, more: false }, &[0; 8])
            .unwrap();
        assert_eq!(result, ReassemblyOutcome::OutOfSequence);
    }
}
