//! SOME/IP, SOME/IP-TP and PDU header encode/decode (spec §4.1, §6).
//!
//! All multi-byte fields are network byte order. Validation never mutates state: a malformed
//! header yields `CoreError::Fatal(ErrorKind::MalformedHeader)` and the caller decides what to
//! do with the bytes that produced it.

use crate::error::{CoreError, CoreResult, ErrorKind};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub const SOMEIP_HEADER_SIZE: usize = 16;
pub const TP_HEADER_SIZE: usize = 4;
pub const PDU_HEADER_SIZE: usize = 8;

/// Fixed tail of the SOME/IP header counted by `length_field` (RequestId + ProtocolVersion +
/// InterfaceVersion + MessageType + ReturnCode).
pub const LENGTH_FIELD_TAIL: u32 = 8;

/// `u32::MAX - 16`: the upper bound on `length_field` that prevents overflow when computing
/// `16 + length_field` as a total message size (spec §4.1, grounded on
/// `someip_stream_packet_limits.h::kMaximumHeaderLengthField`).
pub const LENGTH_MAX: u32 = u32::MAX - SOMEIP_HEADER_SIZE as u32;

/// Bit of `MessageType` that marks a message as a SOME/IP-TP segment.
pub const TP_FLAG: u8 = 0x20;

pub const MSG_TYPE_REQUEST: u8 = 0x00;
pub const MSG_TYPE_REQUEST_NO_RETURN: u8 = 0x01;
pub const MSG_TYPE_NOTIFICATION: u8 = 0x02;
pub const MSG_TYPE_RESPONSE: u8 = 0x80;
pub const MSG_TYPE_ERROR: u8 = 0x81;

pub const E_OK: u8 = 0x00;
pub const E_UNKNOWN_SERVICE: u8 = 0x02;
pub const E_UNKNOWN_METHOD: u8 = 0x01;
pub const E_WRONG_INTERFACE: u8 = 0x09;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SomeIpHeader {
    pub service_id: u16,
    pub method_id: u16,
    pub length: u32,
    pub client_id: u16,
    pub session_id: u16,
    pub protocol_version: u8,
    pub interface_version: u8,
    pub message_type: u8,
    pub return_code: u8,
}

impl SomeIpHeader {
    #[inline]
    pub fn is_tp(&self) -> bool {
        self.message_type & TP_FLAG != 0
    }

    /// Number of payload bytes implied by `length` (the part of the header after `length`
    /// itself, 8 bytes, is always present).
    #[inline]
    pub fn payload_len(&self) -> u32 {
        self.length - LENGTH_FIELD_TAIL
    }

    #[inline]
    pub fn request_id(&self) -> u32 {
        (u32::from(self.client_id) << 16) | u32::from(self.session_id)
    }

    /// Decode a 16-byte SOME/IP header from the front of `buf`. Does not touch any bytes past
    /// the header.
    pub fn decode(buf: &[u8]) -> CoreResult<SomeIpHeader> {
        if buf.len() < SOMEIP_HEADER_SIZE {
            return Err(ErrorKind::MalformedHeader.into());
        }

        let mut cursor = Cursor::new(buf);
        let message_id = cursor.read_u32::<BigEndian>()?;
        let length = cursor.read_u32::<BigEndian>()?;
        let request_id = cursor.read_u32::<BigEndian>()?;
        let protocol_version = cursor.read_u8()?;
        let interface_version = cursor.read_u8()?;
        let message_type = cursor.read_u8()?;
        let return_code = cursor.read_u8()?;

        if length < LENGTH_FIELD_TAIL || length > LENGTH_MAX {
            return Err(ErrorKind::MalformedHeader.into());
        }

        Ok(SomeIpHeader {
            service_id: (message_id >> 16) as u16,
            method_id: (message_id & 0xFFFF) as u16,
            length,
            client_id: (request_id >> 16) as u16,
            session_id: (request_id & 0xFFFF) as u16,
            protocol_version,
            interface_version,
            message_type,
            return_code,
        })
    }

    /// Encode the header into exactly 16 bytes at the front of `out`.
    pub fn encode(&self, out: &mut [u8]) -> CoreResult<()> {
        if out.len() < SOMEIP_HEADER_SIZE {
            return Err(CoreError::Wait);
        }

        let mut cursor = Cursor::new(out);
        let message_id = (u32::from(self.service_id) << 16) | u32::from(self.method_id);
        cursor.write_u32::<BigEndian>(message_id)?;
        cursor.write_u32::<BigEndian>(self.length)?;
        cursor.write_u32::<BigEndian>(self.request_id())?;
        cursor.write_u8(self.protocol_version)?;
        cursor.write_u8(self.interface_version)?;
        cursor.write_u8(self.message_type)?;
        cursor.write_u8(self.return_code)?;
        Ok(())
    }

    /// Build the header for a method-type error response to `self`, per spec §4.9: same
    /// `RequestId`, `MessageType = 0x81`, no payload.
    pub fn error_response(&self, return_code: u8) -> SomeIpHeader {
        SomeIpHeader {
            service_id: self.service_id,
            method_id: self.method_id,
            length: LENGTH_FIELD_TAIL,
            client_id: self.client_id,
            session_id: self.session_id,
            protocol_version: self.protocol_version,
            interface_version: self.interface_version,
            message_type: MSG_TYPE_ERROR,
            return_code,
        }
    }

    /// Clear the TP flag, used when delivering a reassembled message to the router (spec
    /// §4.6 step 5).
    #[inline]
    pub fn clear_tp_flag(&mut self) {
        self.message_type &= !TP_FLAG;
    }
}

/// The 4-byte SOME/IP-TP header: 28-bit byte offset (multiple of 16) + 3 reserved bits + the
/// `more` flag in the lowest bit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TpHeader {
    pub offset: u32,
    pub more: bool,
}

impl TpHeader {
    /// Decodes only when `message_type & TP_FLAG != 0`; the offset must be a multiple of 16.
    pub fn decode(buf: &[u8], message_type: u8) -> CoreResult<TpHeader> {
        if message_type & TP_FLAG == 0 {
            return Err(ErrorKind::MalformedHeader.into());
        }
        if buf.len() < TP_HEADER_SIZE {
            return Err(ErrorKind::MalformedHeader.into());
        }

        let raw = BigEndian::read_u32(buf);
        let more = raw & 0x1 != 0;
        let offset = raw & 0xFFFF_FFF0;

        if offset % 16 != 0 {
            return Err(ErrorKind::TpOffsetInvalid.into());
        }

        Ok(TpHeader { offset, more })
    }

    pub fn encode(&self, out: &mut [u8]) -> CoreResult<()> {
        if out.len() < TP_HEADER_SIZE {
            return Err(CoreError::Wait);
        }
        if self.offset % 16 != 0 {
            return Err(ErrorKind::TpOffsetInvalid.into());
        }

        let raw = (self.offset & 0xFFFF_FFF0) | if self.more { 1 } else { 0 };
        BigEndian::write_u32(out, raw);
        Ok(())
    }
}

/// The reduced PDU header: `(PduId, Length)`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PduHeader {
    pub pdu_id: u32,
    pub length: u32,
}

impl PduHeader {
    pub fn decode(buf: &[u8]) -> CoreResult<PduHeader> {
        if buf.len() < PDU_HEADER_SIZE {
            return Err(ErrorKind::MalformedHeader.into());
        }
        let mut cursor = Cursor::new(buf);
        let pdu_id = cursor.read_u32::<BigEndian>()?;
        let length = cursor.read_u32::<BigEndian>()?;

        if length > LENGTH_MAX {
            return Err(ErrorKind::MalformedHeader.into());
        }

        Ok(PduHeader { pdu_id, length })
    }

    pub fn encode(&self, out: &mut [u8]) -> CoreResult<()> {
        if out.len() < PDU_HEADER_SIZE {
            return Err(CoreError::Wait);
        }
        let mut cursor = Cursor::new(out);
        cursor.write_u32::<BigEndian>(self.pdu_id)?;
        cursor.write_u32::<BigEndian>(self.length)?;
        Ok(())
    }
}

/// Remaps PDU IDs to/from `(ServiceId, EventId)`, populated once at configuration time (see
/// SPEC_FULL.md "PDU remapping detail").
#[derive(Debug, Default, Clone)]
pub struct PduIdRemapper {
    to_pdu: std::collections::HashMap<(u16, u16), u32>,
    from_pdu: std::collections::HashMap<u32, (u16, u16)>,
}

impl PduIdRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, service_id: u16, event_id: u16, pdu_id: u32) {
        self.to_pdu.insert((service_id, event_id), pdu_id);
        self.from_pdu.insert(pdu_id, (service_id, event_id));
    }

    pub fn to_pdu_id(&self, service_id: u16, event_id: u16) -> Option<u32> {
        self.to_pdu.get(&(service_id, event_id)).copied()
    }

    pub fn from_pdu_id(&self, pdu_id: u32) -> Option<(u16, u16)> {
        self.from_pdu.get(&pdu_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> SomeIpHeader {
        SomeIpHeader {
            service_id: 0x1234,
            method_id: 0x0010,
            length: 16,
            client_id: 0x0001,
            session_id: 0x0001,
            protocol_version: 0x01,
            interface_version: 0x01,
            message_type: MSG_TYPE_REQUEST,
            return_code: E_OK,
        }
    }

    #[test]
    fn roundtrip_someip_header() {
        let header = sample_header();
        let mut buf = [0u8; SOMEIP_HEADER_SIZE];
        header.encode(&mut buf).unwrap();
        let decoded = SomeIpHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_length_below_tail() {
        let mut header = sample_header();
        header.length = 4;
        let mut buf = [0u8; SOMEIP_HEADER_SIZE];
        // Hand-craft bytes since encode() doesn't validate length itself.
        BigEndian::write_u32(&mut buf[4..8], header.length);
        let err = SomeIpHeader::decode(&buf);
        assert_eq!(err.unwrap_err(), CoreError::Fatal(ErrorKind::MalformedHeader));
    }

    #[test]
    fn rejects_length_above_max() {
        let mut buf = [0u8; SOMEIP_HEADER_SIZE];
        BigEndian::write_u32(&mut buf[4..8], u32::MAX);
        let err = SomeIpHeader::decode(&buf);
        assert_eq!(err.unwrap_err(), CoreError::Fatal(ErrorKind::MalformedHeader));
    }

    #[test]
    fn decode_fails_on_short_buffer() {
        let buf = [0u8; SOMEIP_HEADER_SIZE - 1];
        assert_eq!(
            SomeIpHeader::decode(&buf).unwrap_err(),
            CoreError::Fatal(ErrorKind::MalformedHeader)
        );
    }

    #[test]
    fn roundtrip_tp_header() {
        let tp = TpHeader { offset: 1392, more: true };
        let mut buf = [0u8; TP_HEADER_SIZE];
        tp.encode(&mut buf).unwrap();
        let decoded = TpHeader::decode(&buf, MSG_TYPE_NOTIFICATION | TP_FLAG).unwrap();
        assert_eq!(decoded, tp);
    }

    #[test]
    fn tp_header_requires_tp_message_type() {
        let buf = [0u8; TP_HEADER_SIZE];
        let err = TpHeader::decode(&buf, MSG_TYPE_NOTIFICATION);
        assert_eq!(err.unwrap_err(), CoreError::Fatal(ErrorKind::MalformedHeader));
    }

    #[test]
    fn tp_offset_must_be_multiple_of_16() {
        let mut buf = [0u8; TP_HEADER_SIZE];
        BigEndian::write_u32(&mut buf, 17);
        let err = TpHeader::decode(&buf, MSG_TYPE_NOTIFICATION | TP_FLAG);
        assert_eq!(err.unwrap_err(), CoreError::Fatal(ErrorKind::TpOffsetInvalid));
    }

    #[test]
    fn pdu_remapper_roundtrip() {
        let mut remapper = PduIdRemapper::new();
        remapper.insert(0x1234, 0x8001, 0x12348001);
        assert_eq!(remapper.to_pdu_id(0x1234, 0x8001), Some(0x12348001));
        assert_eq!(remapper.from_pdu_id(0x12348001), Some((0x1234, 0x8001)));
        assert_eq!(remapper.to_pdu_id(0x1234, 0x9999), None);
    }

    #[test]
    fn error_response_matches_request_id() {
        let request = sample_header();
        let response = request.error_response(E_UNKNOWN_SERVICE);
        assert_eq!(response.request_id(), request.request_id());
        assert_eq!(response.message_type, MSG_TYPE_ERROR);
        assert_eq!(response.length, LENGTH_FIELD_TAIL);
    }
}
