//! Per-stream idle timers
//!
//! A [`TimeoutController`] is a single-shot, resettable idle timer. Arming
//! replaces any pending arming (reset semantics, no stacking); an elapsed
//! countdown fires its callback exactly once and disarms. Once the owning
//! stream closes the controller is sealed: late arming is a tolerated no-op
//! and a pending firing is swallowed.

use std::time::{Duration, Instant};

/// Callback invoked when an armed countdown elapses
pub type TimeoutCallback = Box<dyn FnMut()>;

/// Single-shot, resettable idle timer
pub struct TimeoutController {
    duration: Option<Duration>,
    deadline: Option<Instant>,
    callback: Option<TimeoutCallback>,
    sealed: bool,
}

impl TimeoutController {
    /// Create a disarmed controller
    pub fn new() -> Self {
        TimeoutController {
            duration: None,
            deadline: None,
            callback: None,
            sealed: false,
        }
    }

    /// Arm the timer, cancelling any previous arming
    ///
    /// The previous callback is dropped without firing. Arming a sealed
    /// controller is a no-op.
    pub fn arm<F: FnMut() + 'static>(&mut self, duration: Duration, callback: F) {
        if self.sealed {
            return;
        }
        self.duration = Some(duration);
        self.deadline = Some(Instant::now() + duration);
        self.callback = Some(Box::new(callback));
    }

    /// Disarm the timer; no-op if already disarmed
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.callback = None;
    }

    /// Restart the countdown from now, keeping the armed callback
    ///
    /// Called on meaningful I/O progress. No-op when disarmed.
    pub fn on_activity(&mut self) {
        if self.sealed || self.deadline.is_none() {
            return;
        }
        if let Some(duration) = self.duration {
            self.deadline = Some(Instant::now() + duration);
        }
    }

    /// Whether a countdown is pending
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some() && !self.sealed
    }

    /// Pending deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        if self.sealed {
            None
        } else {
            self.deadline
        }
    }

    /// Fire the callback if the countdown elapsed by `now`
    ///
    /// Fires at most once per arming, then disarms. Returns whether it
    /// fired. Sealed controllers never fire.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        if self.sealed {
            return false;
        }
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                if let Some(mut callback) = self.callback.take() {
                    callback();
                }
                true
            }
            _ => false,
        }
    }

    /// Seal the controller: the owning stream closed
    ///
    /// Cancels any pending countdown and turns all later arming into no-ops.
    pub fn seal(&mut self) {
        self.sealed = true;
        self.cancel();
    }

    /// Whether the controller has been sealed
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}

impl Default for TimeoutController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TimeoutController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutController")
            .field("duration", &self.duration)
            .field("deadline", &self.deadline)
            .field("armed", &self.deadline.is_some())
            .field("sealed", &self.sealed)
            .finish()
    }
}
