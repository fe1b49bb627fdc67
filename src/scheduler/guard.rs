//! Skip-if-running guard for periodic tasks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Idle/Running flag shared by every tick of one task
#[derive(Debug, Clone, Default)]
pub struct TaskGuard {
    running: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl TaskGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Running. `None` if a run is already active.
    pub fn try_begin(&self) -> Option<RunningToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningToken {
                running: self.running.clone(),
                idle: self.idle.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Resolve once no run is active
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // register before checking so a release in between is not missed
            notified.as_mut().enable();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Running -> Idle when dropped, including on panic unwind
#[derive(Debug)]
pub struct RunningToken {
    running: Arc<AtomicBool>,
    idle: Arc<Notify>,
}

impl Drop for RunningToken {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_fails_until_token_dropped() {
        let guard = TaskGuard::new();
        let token = guard.try_begin().unwrap();
        assert!(guard.is_running());
        assert!(guard.clone().try_begin().is_none());

        drop(token);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_when_token_dropped() {
        let guard = TaskGuard::new();
        guard.wait_idle().await;

        let token = guard.try_begin().unwrap();
        let waiter = tokio::spawn({
            let guard = guard.clone();
            async move { guard.wait_idle().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(token);
        waiter.await.unwrap();
        assert!(!guard.is_running());
    }
}
