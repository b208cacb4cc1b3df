//! Dirty flag with a flush rate limit.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State {
    dirty: bool,
    next_flush: Instant,
}

/// Tracks unsaved mutations and how often an on-demand flush may run.
#[derive(Debug)]
pub struct DirtyTracker {
    state: Mutex<State>,
    window: Duration,
}

impl DirtyTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                dirty: false,
                next_flush: Instant::now(),
            }),
            window,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_dirty(&self) {
        self.lock().dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Clear the flag, returning whether it was set.
    pub fn take_dirty(&self) -> bool {
        std::mem::replace(&mut self.lock().dirty, false)
    }

    /// Whether a flush may run now.
    ///
    /// Allowed at most once per window. An allowed call clears the dirty
    /// flag and opens a new window; a refused call marks the data dirty so
    /// the periodic saver picks it up.
    pub fn can_flush(&self) -> bool {
        self.can_flush_at(Instant::now())
    }

    fn can_flush_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if now >= state.next_flush {
            state.next_flush = now + self.window;
            state.dirty = false;
            true
        } else {
            state.dirty = true;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_dirty_clears() {
        let tracker = DirtyTracker::new(Duration::from_secs(30));
        assert!(!tracker.is_dirty());
        tracker.set_dirty();
        assert!(tracker.take_dirty());
        assert!(!tracker.take_dirty());
    }

    #[test]
    fn can_flush_once_per_window() {
        let tracker = DirtyTracker::new(Duration::from_secs(30));
        let start = Instant::now();

        assert!(tracker.can_flush_at(start));
        assert!(!tracker.is_dirty());

        // Refused inside the window, and left dirty for the saver
        assert!(!tracker.can_flush_at(start + Duration::from_secs(10)));
        assert!(tracker.is_dirty());

        assert!(tracker.can_flush_at(start + Duration::from_secs(31)));
        assert!(!tracker.is_dirty());
    }
}
