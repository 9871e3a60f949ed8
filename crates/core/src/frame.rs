//! Frames and the per-leg consumer queue.
//!
//! Each stream leg owns exactly one bounded FIFO of [`Frame`]s with exactly
//! one producer (the engine thread, through the leg's [`FrameSink`]) and
//! exactly one consumer (an external thread, through the [`StreamReader`]).
//! Mutex + condvar is sufficient: concurrency is bounded to those two
//! parties, so nothing lock-free is needed.
//!
//! Every teardown path finishes the queue with a sentinel frame, so a
//! consumer blocked in [`StreamReader::pop`] always unblocks and observes a
//! deterministic end-of-stream instead of hanging.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One unit of received payload.
///
/// The payload is opaque to this library — interpreting it as a particular
/// codec's bitstream is the decoder's job. `sync_point` carries the RTP
/// marker bit (last packet of an access unit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
    /// Presentation timestamp in microseconds on the leg's rebased clock.
    pub timestamp_us: u64,
    pub sync_point: bool,
}

impl Frame {
    pub fn new(payload: Vec<u8>, timestamp_us: u64, sync_point: bool) -> Self {
        Self {
            payload,
            timestamp_us,
            sync_point,
        }
    }

    /// The end-of-stream sentinel: an empty payload with no timestamp.
    pub fn end_of_stream() -> Self {
        Self {
            payload: Vec::new(),
            timestamp_us: u64::MAX,
            sync_point: false,
        }
    }

    /// True for the sentinel delivered as the final item of every session.
    pub fn is_end_of_stream(&self) -> bool {
        self.payload.is_empty() && self.timestamp_us == u64::MAX
    }
}

struct QueueState {
    frames: VecDeque<Frame>,
    finished: bool,
}

struct QueueInner {
    state: Mutex<QueueState>,
    available: Condvar,
    capacity: usize,
    /// Latest timestamp handed to the consumer, minus the target latency.
    play_position_us: AtomicU64,
    /// Times the controller has asked this leg to resynchronize.
    baseline_resets: AtomicU64,
    /// Microseconds subtracted from delivered timestamps for the position.
    latency_us: u64,
}

/// Bounded SPSC frame queue, split into its producer and consumer halves.
pub struct FrameQueue;

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames.
    ///
    /// `target_latency` is subtracted from delivered timestamps when
    /// reporting [`StreamReader::current_play_position_us`], making the
    /// reported position the conservative estimate reconnect recovery needs.
    pub fn bounded(capacity: usize, target_latency: Duration) -> (FrameSink, StreamReader) {
        let inner = Arc::new(QueueInner {
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity.min(64)),
                finished: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
            play_position_us: AtomicU64::new(0),
            baseline_resets: AtomicU64::new(0),
            latency_us: target_latency.as_micros() as u64,
        });
        (
            FrameSink {
                inner: inner.clone(),
            },
            StreamReader { inner },
        )
    }
}

/// Producer half, held by the engine thread inside a stream leg.
pub struct FrameSink {
    inner: Arc<QueueInner>,
}

impl FrameSink {
    /// Push a frame. Never blocks: when the queue is full the oldest frame
    /// is dropped to make room, since stalling the engine thread would stall
    /// every leg. Pushes after [`finish`](Self::finish) are discarded.
    pub fn push(&self, frame: Frame) {
        let mut state = self.inner.state.lock();
        if state.finished {
            tracing::trace!("frame after finish discarded");
            return;
        }
        if state.frames.len() >= self.inner.capacity {
            state.frames.pop_front();
            tracing::warn!(capacity = self.inner.capacity, "queue full, dropped oldest frame");
        }
        state.frames.push_back(frame);
        self.inner.available.notify_one();
    }

    /// Push the end-of-stream sentinel as the final item. Idempotent: only
    /// the first call appends the sentinel, so every teardown path may call
    /// it without risking a duplicate.
    pub fn finish(&self) {
        let mut state = self.inner.state.lock();
        if state.finished {
            return;
        }
        state.finished = true;
        state.frames.push_back(Frame::end_of_stream());
        self.inner.available.notify_one();
    }

    /// Whether the sentinel has been pushed.
    pub fn is_finished(&self) -> bool {
        self.inner.state.lock().finished
    }

    /// Reset the consumer-visible timestamp baseline. Called by the
    /// controller at reconnect so post-reconnect positions resynchronize
    /// independently of pre-reconnect values.
    pub fn reset_time_baseline(&self) {
        self.inner.play_position_us.store(0, Ordering::Release);
        self.inner.baseline_resets.fetch_add(1, Ordering::AcqRel);
    }

    /// Conservative play position of the consumer, in microseconds.
    pub fn current_play_position_us(&self) -> u64 {
        self.inner.play_position_us.load(Ordering::Acquire)
    }
}

/// Consumer half, handed to exactly one external thread.
pub struct StreamReader {
    inner: Arc<QueueInner>,
}

impl StreamReader {
    /// Pop the next frame, blocking until one is available. A frame whose
    /// [`Frame::is_end_of_stream`] is true is the final item; every pop
    /// after that returns the sentinel again rather than blocking.
    pub fn pop(&self) -> Frame {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                if frame.is_end_of_stream() {
                    // Leave the queue finished; repeat the sentinel forever.
                    state.frames.push_front(frame.clone());
                } else {
                    let position = frame.timestamp_us.saturating_sub(self.inner.latency_us);
                    self.inner
                        .play_position_us
                        .store(position, Ordering::Release);
                }
                return frame;
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<Frame> {
        let mut state = self.inner.state.lock();
        match state.frames.pop_front() {
            Some(frame) if frame.is_end_of_stream() => {
                state.frames.push_front(frame.clone());
                Some(frame)
            }
            Some(frame) => {
                let position = frame.timestamp_us.saturating_sub(self.inner.latency_us);
                self.inner
                    .play_position_us
                    .store(position, Ordering::Release);
                Some(frame)
            }
            None => None,
        }
    }

    /// Latest timestamp handed to this consumer, adjusted by the target
    /// latency. Monotonic within one baseline epoch; reset to zero by
    /// [`FrameSink::reset_time_baseline`].
    pub fn current_play_position_us(&self) -> u64 {
        self.inner.play_position_us.load(Ordering::Acquire)
    }

    /// How many times the controller has reset this leg's time baseline.
    pub fn baseline_resets(&self) -> u64 {
        self.inner.baseline_resets.load(Ordering::Acquire)
    }

    /// Frames currently buffered (sentinel included once finished).
    pub fn len(&self) -> usize {
        self.inner.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn frame(ts: u64) -> Frame {
        Frame::new(vec![0xAB], ts, false)
    }

    #[test]
    fn fifo_order_preserved() {
        let (sink, reader) = FrameQueue::bounded(8, Duration::ZERO);
        for ts in [10, 20, 30] {
            sink.push(frame(ts));
        }
        assert_eq!(reader.pop().timestamp_us, 10);
        assert_eq!(reader.pop().timestamp_us, 20);
        assert_eq!(reader.pop().timestamp_us, 30);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let (sink, reader) = FrameQueue::bounded(2, Duration::ZERO);
        sink.push(frame(1));
        sink.push(frame(2));
        sink.push(frame(3));
        assert_eq!(reader.pop().timestamp_us, 2, "oldest frame must be dropped");
        assert_eq!(reader.pop().timestamp_us, 3);
    }

    #[test]
    fn sentinel_is_final_and_repeats() {
        let (sink, reader) = FrameQueue::bounded(8, Duration::ZERO);
        sink.push(frame(1));
        sink.finish();
        sink.finish();
        sink.push(frame(2));

        assert_eq!(reader.pop().timestamp_us, 1);
        assert!(reader.pop().is_end_of_stream());
        assert!(reader.pop().is_end_of_stream(), "sentinel must repeat");
        assert_eq!(reader.len(), 1, "exactly one sentinel buffered");
    }

    #[test]
    fn pop_unblocks_on_finish() {
        let (sink, reader) = FrameQueue::bounded(8, Duration::ZERO);
        let consumer = thread::spawn(move || reader.pop());
        thread::sleep(Duration::from_millis(20));
        sink.finish();
        assert!(consumer.join().unwrap().is_end_of_stream());
    }

    #[test]
    fn play_position_tracks_delivery_minus_latency() {
        let (sink, reader) = FrameQueue::bounded(8, Duration::from_micros(500));
        sink.push(frame(2_000));
        assert_eq!(reader.current_play_position_us(), 0, "nothing delivered yet");
        reader.pop();
        assert_eq!(reader.current_play_position_us(), 1_500);
    }

    #[test]
    fn play_position_saturates_below_latency() {
        let (sink, reader) = FrameQueue::bounded(8, Duration::from_millis(1));
        sink.push(frame(100));
        reader.pop();
        assert_eq!(reader.current_play_position_us(), 0);
    }

    #[test]
    fn baseline_reset_zeroes_position_and_counts() {
        let (sink, reader) = FrameQueue::bounded(8, Duration::ZERO);
        sink.push(frame(5_000));
        reader.pop();
        assert_eq!(reader.current_play_position_us(), 5_000);

        sink.reset_time_baseline();
        assert_eq!(reader.current_play_position_us(), 0);
        assert_eq!(reader.baseline_resets(), 1);
    }
}
