//! Tracking of deferred fixture writes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts fixture writes that were scheduled but have not completed
#[derive(Debug, Clone, Default)]
pub struct PendingWrites {
    active_count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl PendingWrites {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a write; it is pending until the guard drops
    #[must_use]
    pub fn track(&self) -> WriteGuard {
        self.active_count.fetch_add(1, Ordering::AcqRel);
        WriteGuard {
            active_count: Arc::clone(&self.active_count),
            idle: Arc::clone(&self.idle),
        }
    }

    /// Number of writes in flight
    #[must_use]
    pub fn pending(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Wait until no write is in flight
    pub async fn flush(&self) {
        loop {
            // Registered before the check so a concurrent final drop is not missed
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one write as pending until dropped
#[derive(Debug)]
pub struct WriteGuard {
    active_count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.active_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_flush_without_writes() {
        let pending = PendingWrites::new();
        pending.flush().await;
        assert_eq!(pending.pending(), 0);
    }

    #[tokio::test]
    async fn test_guard_release() {
        let pending = PendingWrites::new();

        {
            let _guard1 = pending.track();
            let _guard2 = pending.track();
            assert_eq!(pending.pending(), 2);
        }

        assert_eq!(pending.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_waits_for_spawned_write() {
        let pending = PendingWrites::new();
        let guard = pending.track();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        tokio::time::timeout(Duration::from_secs(2), pending.flush())
            .await
            .unwrap();
        assert_eq!(pending.pending(), 0);
    }
}
