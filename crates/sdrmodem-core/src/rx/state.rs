//! State shared between the RX consumer and its interrupt worker.
//!
//! Everything lives behind one mutex; the condition variable only carries
//! wake-ups and every waiter re-checks the state after waking. The worker
//! records a frame's slot before the visible frame count moves, so a count
//! of `n` always has `n` slots behind it.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::error::RxError;

/// Location of one received frame in the DMA buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    /// Buffer offset of the frame
    pub offset: usize,
    /// Frame length reported by the RX core
    pub len: usize,
}

/// Fixed-capacity table of received frame slots
#[derive(Debug)]
pub(crate) struct OffsetTable {
    slots: Vec<FrameSlot>,
    capacity: usize,
}

impl OffsetTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a slot; `false` when the table is full
    fn push(&mut self, slot: FrameSlot) -> bool {
        if self.slots.len() >= self.capacity {
            return false;
        }
        self.slots.push(slot);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&mut self) {
        self.slots.clear();
    }
}

#[derive(Debug)]
struct Reception {
    table: OffsetTable,
    frame_count: usize,
    fault: Option<RxError>,
    done: bool,
    worker_running: bool,
}

/// Outcome of waiting for frames
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    /// At least the requested number of frames is available
    Ready(usize),
    /// Deadline passed; carries the frame count at that time
    TimedOut(usize),
    /// Worker stopped with an error
    Fault(RxError),
    /// Worker exited without reaching the requested count
    WorkerExited(usize),
}

/// Why the worker could not publish a frame
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PublishError {
    /// Consumer has finished with this cycle
    Done,
    /// Table is full
    Full(usize),
}

/// Shared reception state plus its wake-up signal
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<Reception>,
    signal: Condvar,
}

impl Shared {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(Reception {
                table: OffsetTable::with_capacity(capacity),
                frame_count: 0,
                fault: None,
                done: true,
                worker_running: false,
            }),
            signal: Condvar::new(),
        }
    }

    /// Reset for a new cycle and mark the worker running.
    ///
    /// Fails with `RxError::Busy` if the previous worker has not exited.
    pub(crate) fn arm(&self) -> Result<(), RxError> {
        let mut state = self.state.lock();
        if state.worker_running {
            return Err(RxError::Busy);
        }
        state.table.clear();
        state.frame_count = 0;
        state.fault = None;
        state.done = false;
        state.worker_running = true;
        Ok(())
    }

    /// Undo `arm` when the worker could not be started
    pub(crate) fn disarm(&self) {
        let mut state = self.state.lock();
        state.done = true;
        state.worker_running = false;
    }

    /// Tell the worker to stop
    pub(crate) fn finish(&self) {
        self.state.lock().done = true;
        self.signal.notify_all();
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.lock().done
    }

    /// Record a frame, then make it visible and wake the consumer
    pub(crate) fn publish(&self, slot: FrameSlot) -> Result<usize, PublishError> {
        let mut state = self.state.lock();
        if state.done {
            return Err(PublishError::Done);
        }
        if !state.table.push(slot) {
            return Err(PublishError::Full(state.table.capacity()));
        }
        state.frame_count += 1;
        let count = state.frame_count;
        drop(state);
        self.signal.notify_all();
        Ok(count)
    }

    /// Worker exit: store its error, if any, and wake everyone
    pub(crate) fn worker_exited(&self, fault: Option<RxError>) {
        let mut state = self.state.lock();
        if state.fault.is_none() {
            state.fault = fault;
        }
        state.worker_running = false;
        drop(state);
        self.signal.notify_all();
    }

    /// Wait until `target` frames are visible, the worker fails, or `deadline` passes
    pub(crate) fn wait_frames(&self, target: usize, deadline: Instant) -> WaitOutcome {
        let mut state = self.state.lock();
        loop {
            if state.frame_count >= target {
                return WaitOutcome::Ready(state.frame_count);
            }
            if let Some(fault) = state.fault.take() {
                return WaitOutcome::Fault(fault);
            }
            if !state.worker_running {
                return WaitOutcome::WorkerExited(state.frame_count);
            }
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                if state.frame_count >= target {
                    return WaitOutcome::Ready(state.frame_count);
                }
                return WaitOutcome::TimedOut(state.frame_count);
            }
        }
    }

    /// Wait for the worker to exit; `false` if it is still running at `deadline`
    pub(crate) fn wait_worker_exit(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.worker_running {
            if self.signal.wait_until(&mut state, deadline).timed_out() {
                return !state.worker_running;
            }
        }
        true
    }

    pub(crate) fn worker_running(&self) -> bool {
        self.state.lock().worker_running
    }

    /// Visible frame count
    pub(crate) fn frame_count(&self) -> usize {
        self.state.lock().frame_count
    }

    /// Slot of frame `index`, if visible
    pub(crate) fn slot(&self, index: usize) -> Option<FrameSlot> {
        let state = self.state.lock();
        if index < state.frame_count {
            state.table.slots.get(index).copied()
        } else {
            None
        }
    }

    /// Visible slots in `range`
    pub(crate) fn slots(&self, start: usize, end: usize) -> Vec<FrameSlot> {
        let state = self.state.lock();
        let end = end.min(state.frame_count);
        state.table.slots.get(start..end).map(<[FrameSlot]>::to_vec).unwrap_or_default()
    }

    /// Frame count and table length observed together
    #[cfg(test)]
    pub(crate) fn observe(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.frame_count, state.table.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn slot(i: usize) -> FrameSlot {
        FrameSlot {
            offset: i * 100,
            len: 48,
        }
    }

    #[test]
    fn test_table_capacity() {
        let shared = Shared::new(2);
        shared.arm().unwrap();
        assert_eq!(shared.publish(slot(0)), Ok(1));
        assert_eq!(shared.publish(slot(1)), Ok(2));
        assert_eq!(shared.publish(slot(2)), Err(PublishError::Full(2)));
        assert_eq!(shared.frame_count(), 2);
    }

    #[test]
    fn test_publish_after_finish_rejected() {
        let shared = Shared::new(4);
        shared.arm().unwrap();
        shared.finish();
        assert_eq!(shared.publish(slot(0)), Err(PublishError::Done));
        assert_eq!(shared.frame_count(), 0);
    }

    #[test]
    fn test_arm_busy_while_worker_runs() {
        let shared = Shared::new(4);
        shared.arm().unwrap();
        assert!(matches!(shared.arm(), Err(RxError::Busy)));

        shared.worker_exited(None);
        assert!(!shared.worker_running());
        shared.arm().unwrap();
        assert_eq!(shared.frame_count(), 0);
    }

    #[test]
    fn test_wait_timeout_and_fault() {
        let shared = Shared::new(4);
        shared.arm().unwrap();
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(matches!(shared.wait_frames(1, deadline), WaitOutcome::TimedOut(0)));

        shared.worker_exited(Some(RxError::FrameInvalid("len 0".into())));
        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(matches!(
            shared.wait_frames(1, deadline),
            WaitOutcome::Fault(RxError::FrameInvalid(_))
        ));
        assert!(matches!(shared.wait_frames(1, deadline), WaitOutcome::WorkerExited(0)));
    }

    #[test]
    fn test_slots_visible_only_after_count() {
        let shared = Shared::new(8);
        shared.arm().unwrap();
        shared.publish(slot(0)).unwrap();
        shared.publish(slot(1)).unwrap();

        assert_eq!(shared.slot(1), Some(slot(1)));
        assert_eq!(shared.slot(2), None);
        assert_eq!(shared.slots(0, 10), vec![slot(0), slot(1)]);
        assert_eq!(shared.slots(1, 2), vec![slot(1)]);
        assert!(shared.slots(3, 5).is_empty());
    }

    #[test]
    fn test_count_never_exceeds_table_under_concurrency() {
        const FRAMES: usize = 2000;
        let shared = Arc::new(Shared::new(FRAMES));
        shared.arm().unwrap();

        let producer = {
            let shared = shared.clone();
            thread::spawn(move || {
                for i in 0..FRAMES {
                    shared.publish(slot(i)).unwrap();
                    if i % 64 == 0 {
                        thread::yield_now();
                    }
                }
                shared.worker_exited(None);
            })
        };

        let mut seen = 0;
        while seen < FRAMES {
            let deadline = Instant::now() + Duration::from_secs(5);
            match shared.wait_frames(seen + 1, deadline) {
                WaitOutcome::Ready(count) => {
                    let (observed, table_len) = shared.observe();
                    assert!(observed <= table_len);
                    assert!(count <= observed);
                    assert_eq!(shared.slot(count - 1), Some(slot(count - 1)));
                    seen = count;
                }
                other => panic!("unexpected wait outcome: {other:?}"),
            }
        }
        producer.join().unwrap();
    }
}
