//! Wakeable stop signal for threads that wait on a timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Cloneable handle; every clone observes the same signal.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake all waiters. Idempotent.
    pub fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `timeout` unless stopped first; returns true if stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock();
        while !*stopped {
            if cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn wait_times_out_without_stop() {
        let signal = StopSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stop_wakes_waiter_early() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || {
            let start = Instant::now();
            let stopped = waiter.wait_timeout(Duration::from_secs(5));
            (stopped, start.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        signal.stop();
        signal.stop();
        let (stopped, elapsed) = handle.join().expect("waiter panicked");
        assert!(stopped);
        assert!(elapsed < Duration::from_secs(5));
        assert!(signal.is_stopped());
    }
}
