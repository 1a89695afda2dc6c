//! SOME/IP-TP segmentation and reassembly (spec §4.5, §4.6).

pub mod reassembler;
pub mod segmenter;

pub use reassembler::{ReassemblyKey, ReassemblyOutcome, TpReassembler};
pub use segmenter::{Segment, SegmentationJob, TpSegmenter};
