//! Reactor integration (spec §4's "Reactor integration", §5 concurrency model): a single
//! `mio::Poll` owns every socket's readiness interest, plus a cooperative timer wheel for the
//! things spec §5 calls out as cooperative callbacks rather than blocking waits — TP
//! `separation_time` pacing and the UDP `bulk_read_receive_period`. Grounded on
//! `neutronium::net::endpoint::Endpoint`'s `mio::Poll`/`mio::Events` pair, collapsed from three
//! per-phase polls into one process-wide reactor since this core has no handshake phase of its
//! own (that belongs to the (D)TLS bridge, which sits above the transport, not beside it).

use mio::{Events, Poll, Registry, Token};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::time::{Duration, Instant};

/// Identifies one armed timer. Returned by `Reactor::arm_timer`; pass back to `cancel_timer`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct TimerId(u64);

struct ArmedTimer {
    due: Instant,
    id: TimerId,
    token: Token,
}

impl Eq for ArmedTimer {}
impl PartialEq for ArmedTimer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}
impl Ord for ArmedTimer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due)
    }
}
impl PartialOrd for ArmedTimer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One event delivered by `Reactor::poll`: either a readiness notification for a registered
/// fd, or a timer that came due.
pub enum ReactorEvent {
    Io { token: Token, readable: bool, writable: bool },
    Timer { token: Token, id: TimerId },
}

/// Owns the process's one `mio::Poll` plus a min-heap of pending timers. Cancelled timers are
/// lazily skipped at fire time (`cancelled` set) rather than removed from the heap, since
/// `BinaryHeap` has no efficient arbitrary-element removal.
pub struct Reactor {
    poll: Poll,
    events: Events,
    timers: BinaryHeap<Reverse<ArmedTimer>>,
    cancelled: std::collections::HashSet<TimerId>,
    next_timer_id: u64,
}

impl Reactor {
    pub fn new(events_capacity: usize) -> io::Result<Reactor> {
        Ok(Reactor {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
            timers: BinaryHeap::new(),
            cancelled: std::collections::HashSet::new(),
            next_timer_id: 0,
        })
    }

    #[inline]
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Arms a one-shot timer that fires no earlier than `delay` from now, delivered as a
    /// `ReactorEvent::Timer` carrying `token` and the returned `TimerId`.
    pub fn arm_timer(&mut self, delay: Duration, token: Token) -> TimerId {
        let id = TimerId(self.next_timer_id);
        self.next_timer_id += 1;
        self.timers.push(Reverse(ArmedTimer { due: Instant::now() + delay, id, token }));
        id
    }

    pub fn cancel_timer(&mut self, id: TimerId) {
        self.cancelled.insert(id);
    }

    fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.timers
            .peek()
            .map(|Reverse(timer)| timer.due.saturating_duration_since(now))
    }

    /// Runs one poll iteration: waits for I/O readiness (bounded by the earliest pending
    /// timer, if any) and drains timers that have come due. Returns every event observed,
    /// I/O first, then fired timers in due order.
    pub fn poll(&mut self) -> io::Result<Vec<ReactorEvent>> {
        let now = Instant::now();
        let timeout = self.next_timeout(now);
        self.poll.poll(&mut self.events, timeout)?;

        let mut out: Vec<ReactorEvent> = self
            .events
            .iter()
            .map(|event| ReactorEvent::Io {
                token: event.token(),
                readable: event.is_readable(),
                writable: event.is_writable(),
            })
            .collect();

        let now = Instant::now();
        while let Some(Reverse(timer)) = self.timers.peek() {
            if timer.due > now {
                break;
            }
            let Reverse(timer) = self.timers.pop().expect("just peeked");
            if self.cancelled.remove(&timer.id) {
                continue;
            }
            out.push(ReactorEvent::Timer { token: timer.token, id: timer.id });
        }

        Ok(out)
    }
}
