//! Outbound SOME/IP message queue for a stream socket, spec §4.4. Grounded on
//! `neutronium::net::buffer::Buffer::egress`'s tolerance for partial writes and `WouldBlock`,
//! generalized to a message-level queue (rather than one flat byte buffer) so a message at the
//! head can retain its own write cursor and the total queued size can be bounded independently
//! of socket buffer sizing.

use std::collections::VecDeque;
use std::io;

#[derive(Debug, Eq, PartialEq)]
pub enum EnqueueOutcome {
    /// The whole message was written synchronously.
    Ok,
    /// Accepted into the in-flight queue; write-ready interest should be enabled.
    Queued,
    /// The queue was full; the message was not accepted.
    Dropped,
}

/// Accepts outbound messages and writes them to a stream socket, tolerating partial writes and
/// `WouldBlock`.
pub struct StreamMessageWriter {
    queue: VecDeque<Vec<u8>>,
    head_cursor: usize,
    queued_bytes: usize,
    max_queued_bytes: usize,
}

impl StreamMessageWriter {
    pub fn new(max_queued_bytes: usize) -> StreamMessageWriter {
        StreamMessageWriter {
            queue: VecDeque::new(),
            head_cursor: 0,
            queued_bytes: 0,
            max_queued_bytes,
        }
    }

    #[inline]
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Attempts to write `message` immediately if the queue is currently empty; otherwise
    /// enqueues it if there is room.
    pub fn enqueue<W: io::Write>(&mut self, writer: &mut W, message: Vec<u8>) -> io::Result<EnqueueOutcome> {
        if self.queue.is_empty() {
            match writer.write(&message) {
                Ok(n) if n == message.len() => return Ok(EnqueueOutcome::Ok),
                Ok(n) => {
                    self.push(message, n)?;
                    return Ok(EnqueueOutcome::Queued);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.push(message, 0)?;
                    return Ok(EnqueueOutcome::Queued);
                }
                Err(err) => return Err(err),
            }
        }

        self.push(message, 0)
    }

    fn push(&mut self, message: Vec<u8>, already_sent: usize) -> io::Result<EnqueueOutcome> {
        if self.queued_bytes + message.len() > self.max_queued_bytes {
            return Ok(EnqueueOutcome::Dropped);
        }

        self.queued_bytes += message.len();
        self.queue.push_back(message);

        if already_sent > 0 {
            // The first partial write already happened on this message before it was queued.
            self.head_cursor = already_sent;
        }

        Ok(EnqueueOutcome::Queued)
    }

    /// Drains the queue until empty or a `WouldBlock` is hit. Returns `true` if the queue is
    /// now empty (write interest can be disabled).
    pub fn on_writable<W: io::Write>(&mut self, writer: &mut W) -> io::Result<bool> {
        while let Some(message) = self.queue.front() {
            let remaining = &message[self.head_cursor..];

            match writer.write(remaining) {
                Ok(0) if !remaining.is_empty() => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.head_cursor += n;
                    if self.head_cursor >= message.len() {
                        let sent = self.queue.pop_front().expect("front just peeked");
                        self.queued_bytes -= sent.len();
                        self.head_cursor = 0;
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(err) => return Err(err),
            }
        }

        Ok(true)
    }

    /// Drops everything queued, as happens on disconnect (spec §8 invariant 5): no further
    /// writes to the socket occur and every queued message is released.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.head_cursor = 0;
        self.queued_bytes = 0;
    }
}
