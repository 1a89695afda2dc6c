//! A dynamically sized, double-ended, buffered FIFO byte queue. Data is appended at the tail
//! and read from the head. Grounded on `neutronium::net::buffer::Buffer`; generalized to a
//! caller-chosen size instead of requiring a multiple of a fixed increment, since TCP read/
//! write buffer sizes here come from `ConfigurationProvider`, not a compiled-in constant.

use slice_deque::SliceDeque;
use std::io;

type ByteDeque = SliceDeque<u8>;

/// A FIFO byte buffer backed by a `SliceDeque`, giving contiguous read and write slices without
/// shifting data on every `move_head`.
pub struct Buffer {
    data: ByteDeque,
    capacity: usize,
}

impl Buffer {
    #[inline]
    pub fn new(capacity: usize) -> Buffer {
        let mut data = ByteDeque::new();
        data.reserve(capacity);
        Buffer { data, capacity }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remaining free capacity before `ingress` would report a buffer overrun.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    #[inline]
    pub fn move_head(&mut self, count: usize) {
        unsafe { self.data.move_head(count as isize) }
    }

    #[inline]
    pub fn move_tail(&mut self, count: usize) {
        unsafe { self.data.move_tail(count as isize) }
    }

    /// Slice containing the data currently buffered, oldest-first.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn clear(&mut self) {
        let len = self.len();
        self.move_head(len);
    }

    /// Slice of free capacity available to be written into.
    #[inline]
    pub fn write_slice(&mut self) -> &mut [u8] {
        unsafe { self.data.tail_head_slice() }
    }

    /// Writes the buffered data to `writer`, advancing the head as bytes leave. Stops at the
    /// first short write (`WouldBlock` bubbles up as `Ok` with however many bytes made it out,
    /// per the stream writer's partial-write cursor; any other I/O error propagates).
    #[inline]
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.data.len();

        while !self.data.is_empty() {
            let write_count = match writer.write(&self.data) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(count) => count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err),
            };

            self.move_head(write_count);
        }

        Ok(orig_len - self.data.len())
    }

    /// Reads as much as is available from `reader` into the buffer, up to its configured
    /// capacity. Returns the number of bytes read; a `WouldBlock` with zero bytes read so far
    /// propagates as an error so the caller's non-blocking loop can distinguish "drained" from
    /// "nothing new".
    #[inline]
    pub fn ingress<R: io::Read>(&mut self, mut reader: R) -> io::Result<usize> {
        let orig_capacity = self.free_capacity();

        while self.data.len() < self.capacity {
            let read_count = match reader.read(unsafe { self.data.tail_head_slice() }) {
                Ok(0) => return Ok(orig_capacity - self.free_capacity()),
                Ok(count) => count,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(orig_capacity - self.free_capacity());
                }
                Err(err) => return Err(err),
            };

            unsafe { self.data.move_tail(read_count as isize) };
        }

        Err(io::Error::new(io::ErrorKind::Other, "buffer overrun"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ingress_then_egress_roundtrips() {
        let mut buffer = Buffer::new(65536);
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);

        buffer.ingress(&mut cursor).unwrap();
        assert_eq!(buffer.read_slice(), &[1, 2, 3]);

        let mut sink = Cursor::new(Vec::<u8>::new());
        let sent = buffer.egress(&mut sink).unwrap();

        assert_eq!(sent, 3);
        assert_eq!(buffer.len(), 0);
        assert_eq!(sink.get_ref(), &[1, 2, 3]);
    }

    #[test]
    fn egress_reports_write_zero() {
        let mut buffer = Buffer::new(65536);
        buffer.write_slice()[0] = 1;
        buffer.move_tail(1);

        let mut zero_sink: &mut [u8] = &mut [];
        let err = buffer.egress(&mut zero_sink).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn ingress_reports_buffer_overrun() {
        let mut buffer = Buffer::new(4);
        let data = [0u8; 8];
        let err = buffer.ingress(&data[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn free_capacity_tracks_usage() {
        let mut buffer = Buffer::new(16);
        assert_eq!(buffer.free_capacity(), 16);
        buffer.write_slice()[..4].copy_from_slice(&[1, 2, 3, 4]);
        buffer.move_tail(4);
        assert_eq!(buffer.free_capacity(), 12);
        buffer.move_head(4);
        assert_eq!(buffer.free_capacity(), 16);
    }
}
