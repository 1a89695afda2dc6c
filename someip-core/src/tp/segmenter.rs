//! Splits an oversized outbound message into SOME/IP-TP segments, spec §4.5. Grounded on the
//! offset/more-flag shape decoded in `header::TpHeader`; the pacing knobs (`burst_size`) mirror
//! the batching the stream writer already applies to whole messages, just one level up at the
//! segment grain.

use crate::error::{CoreResult, ErrorKind};
use crate::header::{SomeIpHeader, TP_FLAG, TP_HEADER_SIZE, LENGTH_FIELD_TAIL, TpHeader};
use std::collections::VecDeque;

/// One wire-ready TP segment: a SOME/IP header with the TP flag set and a correctly sized
/// `length` field, its TP header, and the payload slice it carries.
pub struct Segment {
    pub header: SomeIpHeader,
    pub tp: TpHeader,
    pub payload: Vec<u8>,
}

/// Computes the per-segment payload capacity and cuts a message into `Segment`s.
pub struct TpSegmenter {
    effective_payload: usize,
    max_message_length: usize,
}

impl TpSegmenter {
    /// `segment_length` is the maximum wire size (SOME/IP header + TP header + payload) allowed
    /// per segment. Only the length-field tail (RequestId + ProtocolVersion + InterfaceVersion +
    /// MessageType + ReturnCode, 8 bytes) plus the TP header counts against that budget — the
    /// leading 8 bytes of the SOME/IP header (ServiceId/MethodId + `length` itself) aren't part
    /// of what `length` measures. The effective payload capacity is rounded down to a multiple
    /// of 16, per the TP offset field's alignment requirement. `max_message_length` bounds the
    /// total payload a single call to `segment` will accept (spec §4.5's per-(service,
    /// method/event, direction) configuration).
    pub fn new(segment_length: usize, max_message_length: usize) -> CoreResult<TpSegmenter> {
        let reserved = LENGTH_FIELD_TAIL as usize + TP_HEADER_SIZE;
        let effective_payload = segment_length.saturating_sub(reserved) & !0xF;

        if effective_payload == 0 {
            return Err(ErrorKind::TpMessageTooLarge.into());
        }

        Ok(TpSegmenter { effective_payload, max_message_length })
    }

    /// Splits `payload` into segments carrying `header`'s identity (ServiceId/MethodId/
    /// ClientId/SessionId are copied unchanged onto every segment, per spec §4.5). Rejects
    /// messages whose payload exceeds `max_message_length` before emitting anything.
    pub fn segment(&self, header: &SomeIpHeader, payload: &[u8]) -> CoreResult<VecDeque<Segment>> {
        if payload.len() > self.max_message_length {
            return Err(ErrorKind::TpMessageTooLarge.into());
        }

        let mut segments = VecDeque::new();
        let mut offset = 0usize;

        if payload.is_empty() {
            let tp = TpHeader { offset: 0, more: false };
            let mut segment_header = *header;
            segment_header.message_type |= TP_FLAG;
            segment_header.length = LENGTH_FIELD_TAIL + TP_HEADER_SIZE as u32;
            segments.push_back(Segment { header: segment_header, tp, payload: Vec::new() });
            return Ok(segments);
        }

        while offset < payload.len() {
            let take = self.effective_payload.min(payload.len() - offset);
            let more = offset + take < payload.len();

            let tp = TpHeader { offset: offset as u32, more };
            let mut segment_header = *header;
            segment_header.message_type |= TP_FLAG;
            segment_header.length =
                LENGTH_FIELD_TAIL + TP_HEADER_SIZE as u32 + take as u32;

            segments.push_back(Segment {
                header: segment_header,
                tp,
                payload: payload[offset..offset + take].to_vec(),
            });

            offset += take;
        }

        Ok(segments)
    }
}

/// A single in-flight segmentation job, consumed burst by burst so the reactor can pace
/// transmission with a separation time between bursts (spec §4.5). Dropping the job mid-flight
/// cancels it: no further segments are produced.
pub struct SegmentationJob {
    segments: VecDeque<Segment>,
    burst_size: usize,
}

impl SegmentationJob {
    pub fn new(segments: VecDeque<Segment>, burst_size: usize) -> SegmentationJob {
        SegmentationJob { segments, burst_size: burst_size.max(1) }
    }

    /// Pops up to `burst_size` segments for immediate transmission. An empty burst with
    /// `is_done()` true means the job has finished.
    pub fn next_burst(&mut self) -> Vec<Segment> {
        let take = self.burst_size.min(self.segments.len());
        self.segments.drain(..take).collect()
    }

    pub fn is_done(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{E_OK, MSG_TYPE_REQUEST_NO_RETURN};

    fn sample_header() -> SomeIpHeader {
        SomeIpHeader {
            service_id: 0x1111,
            method_id: 0x2222,
            length: 0,
            client_id: 0x10,
            session_id: 0x20,
            protocol_version: 1,
            interface_version: 1,
            message_type: MSG_TYPE_REQUEST_NO_RETURN,
            return_code: E_OK,
        }
    }

    #[test]
    fn splits_into_aligned_segments() {
        let segmenter = TpSegmenter::new(36, 65536).unwrap(); // reserved 12, effective 16
        let header = sample_header();
        let payload = vec![0xAB; 40];

        let segments = segmenter.segment(&header, &payload).unwrap();
        assert_eq!(segments.len(), 3);

        let offsets: Vec<u32> = segments.iter().map(|s| s.tp.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32]);

        assert!(segments[0].tp.more);
        assert!(segments[1].tp.more);
        assert!(!segments[2].tp.more);
        assert_eq!(segments[2].payload.len(), 8);
    }

    #[test]
    fn matches_the_spec_worked_example_for_segment_length_1408() {
        // reserved = LENGTH_FIELD_TAIL(8) + TP_HEADER_SIZE(4) = 12, effective = (1408-12) & !0xF = 1392
        let segmenter = TpSegmenter::new(1408, 1 << 20).unwrap();
        let header = sample_header();
        let payload = vec![0xCDu8; 2800];

        let segments = segmenter.segment(&header, &payload).unwrap();
        let offsets: Vec<u32> = segments.iter().map(|s| s.tp.offset).collect();
        assert_eq!(offsets, vec![0, 1392, 2784]);

        assert!(segments[0].tp.more);
        assert!(segments[1].tp.more);
        assert!(!segments[2].tp.more);
        assert_eq!(segments[2].payload.len(), 2800 - 2784);
    }

    #[test]
    fn every_segment_carries_the_tp_flag_and_identity() {
        let segmenter = TpSegmenter::new(36, 65536).unwrap();
        let header = sample_header();
        let payload = vec![1u8; 20];

        let segments = segmenter.segment(&header, &payload).unwrap();
        for segment in &segments {
            assert!(segment.header.is_tp());
            assert_eq!(segment.header.service_id, header.service_id);
            assert_eq!(segment.header.method_id, header.method_id);
            assert_eq!(segment.header.request_id(), header.request_id());
        }
    }

    #[test]
    fn rejects_segment_length_too_small_to_carry_anything() {
        let err = TpSegmenter::new(20, 65536).unwrap_err();
        assert_eq!(err, ErrorKind::TpMessageTooLarge.into());
    }

    #[test]
    fn burst_pacing_drains_in_fixed_size_groups() {
        let segmenter = TpSegmenter::new(36, 65536).unwrap();
        let header = sample_header();
        let payload = vec![0u8; 80]; // 5 segments of 16 bytes

        let segments = segmenter.segment(&header, &payload).unwrap();
        let mut job = SegmentationJob::new(segments, 2);

        assert_eq!(job.next_burst().len(), 2);
        assert_eq!(job.next_burst().len(), 2);
        assert_eq!(job.next_burst().len(), 1);
        assert!(job.is_done());
        assert_eq!(job.next_burst().len(), 0);
    }

    #[test]
    fn rejects_payload_exceeding_max_message_length() {
        let segmenter = TpSegmenter::new(36, 32).unwrap();
        let header = sample_header();
        let err = segmenter.segment(&header, &vec![0u8; 33]).unwrap_err();
        assert_eq!(err, ErrorKind::TpMessageTooLarge.into());
    }

    #[test]
    fn empty_payload_still_produces_one_terminal_segment() {
        let segmenter = TpSegmenter::new(36, 65536).unwrap();
        let header = sample_header();

        let segments = segmenter.segment(&header, &[]).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(!segments[0].tp.more);
    }
}
