use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::signal::{CancelCause, CancelSignal};

/// State polled by the QuickJS interrupt handler.
///
/// The handler only acts while an evaluation is armed; outside of one it never
/// interrupts, so engine setup and snapshotting always run to completion.
#[derive(Debug)]
pub(crate) struct InterruptState {
    signal: CancelSignal,
    armed: AtomicBool,
    fired: AtomicBool,
    deadline: spin::Mutex<Option<Instant>>,
}

impl InterruptState {
    pub(crate) fn new(signal: CancelSignal) -> Self {
        Self {
            signal,
            armed: AtomicBool::new(false),
            fired: AtomicBool::new(false),
            deadline: spin::Mutex::new(None),
        }
    }

    pub(crate) fn signal(&self) -> &CancelSignal {
        &self.signal
    }

    /// Arm the handler until the returned guard drops.
    pub(crate) fn arm(&self, ceiling: Option<Duration>) -> Armed<'_> {
        *self.deadline.lock() = ceiling.map(|ceiling| Instant::now() + ceiling);
        self.fired.store(false, Ordering::Release);
        self.armed.store(true, Ordering::Release);
        Armed { state: self }
    }

    /// Called by QuickJS periodically while script runs.
    pub(crate) fn should_interrupt(&self) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        let expired = matches!(*self.deadline.lock(), Some(deadline) if Instant::now() >= deadline);
        if expired {
            self.signal.cancel_with(CancelCause::DeadlineExceeded);
        }
        if self.signal.is_cancelled() {
            self.fired.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// The cause of the interrupt raised during the last armed evaluation, if any.
    pub(crate) fn fired(&self) -> Option<CancelCause> {
        if self.fired.load(Ordering::Acquire) {
            self.signal.cause()
        } else {
            None
        }
    }
}

/// Disarms the interrupt handler on drop.
pub(crate) struct Armed<'a> {
    state: &'a InterruptState,
}

impl Drop for Armed<'_> {
    fn drop(&mut self) {
        self.state.armed.store(false, Ordering::Release);
        *self.state.deadline.lock() = None;
    }
}
