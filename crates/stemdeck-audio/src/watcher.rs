//! End-of-track detection.

/// Waits for the projected track length, then for the audio to actually go quiet.
#[derive(Debug, Clone)]
pub struct EndOfTrackWatcher {
    remaining: f64,
    fired: bool,
}

impl EndOfTrackWatcher {
    /// Watch a track expected to last `duration` more seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            remaining: duration.max(0.0),
            fired: false,
        }
    }

    /// Seconds left before the watcher starts checking for silence.
    pub const fn remaining(&self) -> f64 {
        self.remaining
    }

    /// Advance by one frame of scaled time.
    ///
    /// Returns true exactly once: on the first tick after the duration has elapsed
    /// where `still_sounding` is false.
    pub fn tick(&mut self, delta: f64, still_sounding: bool) -> bool {
        if self.fired {
            return false;
        }

        self.remaining = (self.remaining - delta.max(0.0)).max(0.0);
        if self.remaining > 0.0 || still_sounding {
            return false;
        }

        self.fired = true;
        true
    }
}
