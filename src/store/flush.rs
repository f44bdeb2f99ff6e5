//! Background flusher.
//!
//! Writes signal the flusher thread; it waits for a quiet period before
//! saving, but never longer than `max_delay` after the first unsaved write.
//!
//! ```text
//!  set ─► Dirty ─┐
//!  set ─► Dirty ─┼─► Debounce ──(quiet 200ms or 1s since first)──► core.flush()
//!  set ─► Dirty ─┘
//! ```

use super::Core;
use crate::log;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        mpsc::{self, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Coalescing window of the flusher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushTiming {
    /// Quiet period after the latest write
    pub debounce: Duration,
    /// Upper bound measured from the first unsaved write
    pub max_delay: Duration,
}

impl Default for FlushTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            max_delay: Duration::from_millis(1000),
        }
    }
}

enum Signal {
    Dirty,
    Shutdown,
}

// =============================================================================
// Debounce State
// =============================================================================

/// Tracks the unsaved window between flushes.
struct Debounce {
    timing: FlushTiming,
    first: Option<Instant>,
    last: Option<Instant>,
}

impl Debounce {
    fn new(timing: FlushTiming) -> Self {
        Self {
            timing,
            first: None,
            last: None,
        }
    }

    fn touch(&mut self) {
        let now = Instant::now();
        self.first.get_or_insert(now);
        self.last = Some(now);
    }

    fn ready(&self) -> bool {
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                last.elapsed() >= self.timing.debounce || first.elapsed() >= self.timing.max_delay
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.first = None;
        self.last = None;
    }

    fn timeout(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                let quiet = self.timing.debounce.saturating_sub(last.elapsed());
                let bound = self.timing.max_delay.saturating_sub(first.elapsed());
                quiet.min(bound)
            }
            _ => Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Flusher Thread
// =============================================================================

pub(super) struct Flusher {
    tx: Sender<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Flusher {
    pub(super) fn spawn(core: Arc<Core>, timing: FlushTiming) -> Self {
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("sheetblocks-flush".into())
            .spawn(move || {
                let mut debounce = Debounce::new(timing);
                loop {
                    match rx.recv_timeout(debounce.timeout()) {
                        Ok(Signal::Dirty) => debounce.touch(),
                        Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }
                    if debounce.ready() {
                        debounce.reset();
                        if !core.flush_logged() {
                            // Still dirty; try again after another quiet period.
                            debounce.touch();
                        }
                    }
                }
            });

        // Without a thread every write is flushed by `KvStore::flush` or on drop.
        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                log!("store"; "flusher thread unavailable: {e}");
                None
            }
        };

        Self {
            tx,
            handle: Mutex::new(handle),
        }
    }

    pub(super) fn notify(&self) {
        self.tx.send(Signal::Dirty).ok();
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.tx.send(Signal::Shutdown).ok();
        if let Some(handle) = self.handle.lock().take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(debounce: u64, max_delay: u64) -> FlushTiming {
        FlushTiming {
            debounce: Duration::from_millis(debounce),
            max_delay: Duration::from_millis(max_delay),
        }
    }

    #[test]
    fn test_idle_debounce_is_never_ready() {
        let debounce = Debounce::new(FlushTiming::default());
        assert!(!debounce.ready());
        assert_eq!(debounce.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_ready_after_quiet_period() {
        let mut debounce = Debounce::new(timing(10, 10_000));
        debounce.touch();
        assert!(!debounce.ready());
        thread::sleep(Duration::from_millis(20));
        assert!(debounce.ready());

        debounce.reset();
        assert!(!debounce.ready());
    }

    #[test]
    fn test_max_delay_bounds_a_steady_stream() {
        let mut debounce = Debounce::new(timing(50, 30));
        debounce.touch();
        thread::sleep(Duration::from_millis(40));
        debounce.touch();
        // Still inside the quiet window of the latest write, but past max_delay.
        assert!(debounce.ready());
    }

    #[test]
    fn test_timeout_shrinks_towards_deadline() {
        let mut debounce = Debounce::new(timing(200, 1000));
        debounce.touch();
        assert!(debounce.timeout() <= Duration::from_millis(200));
    }
}
