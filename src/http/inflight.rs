//! Lock-free in-flight request accounting.
//!
//! Mirrors the `http.server.active_requests` counter so the current value
//! can be sampled without a metric export.

use std::sync::atomic::{AtomicU64, Ordering};

/// Requests currently inside the instrumented stack.
#[derive(Debug, Default)]
pub struct InFlightGauge {
    current: AtomicU64,
    peak: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
}

impl InFlightGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request as started.
    ///
    /// Returns the new in-flight count.
    pub fn enter(&self) -> u64 {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        now
    }

    /// Count a request as completed.
    ///
    /// Returns false, leaving the gauge untouched, if nothing was in flight.
    pub fn leave(&self) -> bool {
        loop {
            let current = self.current.load(Ordering::SeqCst);
            if current == 0 {
                return false;
            }
            if self
                .current
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.completed.fetch_add(1, Ordering::SeqCst);
                return true;
            }
            // CAS failed, retry
        }
    }

    /// Current in-flight count.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed.
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_starts_at_zero() {
        let gauge = InFlightGauge::new();
        assert_eq!(gauge.current(), 0);
        assert_eq!(gauge.peak(), 0);
    }

    #[test]
    fn test_enter_and_leave() {
        let gauge = InFlightGauge::new();
        assert_eq!(gauge.enter(), 1);
        assert_eq!(gauge.enter(), 2);
        assert!(gauge.leave());
        assert_eq!(gauge.current(), 1);
        assert_eq!(gauge.peak(), 2);
        assert_eq!(gauge.started(), 2);
        assert_eq!(gauge.completed(), 1);
    }

    #[test]
    fn test_leave_never_goes_negative() {
        let gauge = InFlightGauge::new();
        assert!(!gauge.leave());
        assert_eq!(gauge.current(), 0);
        assert_eq!(gauge.completed(), 0);
    }

    #[test]
    fn test_concurrent_balance() {
        let gauge = Arc::new(InFlightGauge::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let gauge = Arc::clone(&gauge);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        gauge.enter();
                        assert!(gauge.leave());
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(gauge.current(), 0);
        assert_eq!(gauge.started(), 8000);
        assert_eq!(gauge.completed(), 8000);
        assert!(gauge.peak() <= 8);
    }
}
