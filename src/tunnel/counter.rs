//! Session accounting
//!
//! Each service instance owns one [`SessionCounter`]. Opening a session hands
//! out a [`SessionGuard`] carrying the session id; dropping the guard is the
//! only way the active count goes down, so a pair is released exactly once.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Active session count and id generator for one service
#[derive(Debug)]
pub struct SessionCounter {
    /// Service label used in logs and metrics ("local" or "remote")
    service: &'static str,
    /// Last issued session id
    last_id: AtomicU64,
    /// Sessions currently open
    active: AtomicUsize,
}

impl SessionCounter {
    /// Create a counter for the named service
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            last_id: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        }
    }

    /// Open a session: bump the active count and assign the next id
    ///
    /// Ids start at 1 and are never reused within the process.
    pub fn open(self: &Arc<Self>) -> SessionGuard {
        self.open_since(Instant::now())
    }

    /// Open a session whose clock started at `started`
    ///
    /// Servers pass the accept time so the elapsed time includes the dial.
    pub fn open_since(self: &Arc<Self>, started: Instant) -> SessionGuard {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;

        gauge!("tunnel.sessions.active", "service" => self.service).set(active as f64);
        counter!("tunnel.sessions.total", "service" => self.service).increment(1);

        SessionGuard {
            id,
            started,
            counter: Arc::clone(self),
        }
    }

    /// Number of sessions currently open
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of sessions opened since start
    pub fn issued(&self) -> u64 {
        self.last_id.load(Ordering::SeqCst)
    }

    /// Service label
    pub fn service(&self) -> &'static str {
        self.service
    }
}

/// An open session
///
/// Holds one slot of the active count until dropped.
#[derive(Debug)]
pub struct SessionGuard {
    id: u64,
    started: Instant,
    counter: Arc<SessionCounter>,
}

impl SessionGuard {
    /// Session id, unique per service instance
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Time since the session's clock started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Active sessions of the owning service, this one included
    pub fn active(&self) -> usize {
        self.counter.active()
    }

    /// Service label of the owning counter
    pub fn service(&self) -> &'static str {
        self.counter.service
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let active = self.counter.active.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("tunnel.sessions.active", "service" => self.counter.service).set(active as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_and_count_tracks_guards() {
        let counter = Arc::new(SessionCounter::new("local"));
        assert_eq!(counter.active(), 0);

        let first = counter.open();
        let second = counter.open();
        assert_eq!(first.id(), 1);
        assert_eq!(second.id(), 2);
        assert_eq!(counter.active(), 2);
        assert_eq!(second.active(), 2);

        drop(first);
        assert_eq!(counter.active(), 1);

        let third = counter.open();
        assert_eq!(third.id(), 3, "ids are never reused");
        drop(second);
        drop(third);

        assert_eq!(counter.active(), 0);
        assert_eq!(counter.issued(), 3);
    }

    #[test]
    fn test_clock_starts_at_accept() {
        let counter = Arc::new(SessionCounter::new("local"));
        let accepted = Instant::now() - Duration::from_millis(50);

        let guard = counter.open_since(accepted);
        assert!(guard.elapsed() >= Duration::from_millis(50));
        assert_eq!(guard.id(), 1);
        assert_eq!(counter.active(), 1);
    }

    #[test]
    fn test_concurrent_open_and_drop() {
        let counter = Arc::new(SessionCounter::new("remote"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let guard = counter.open();
                        assert!(guard.active() >= 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.active(), 0);
        assert_eq!(counter.issued(), 8 * 500);
    }
}
