//! Owned, cancelable timers backed by Tokio tasks.
//!
//! DESIGN
//! ======
//! A timer lives exactly as long as its handle. Dropping the handle aborts the
//! task, so a component that owns its handles cannot be called back after it
//! has been torn down.

#[cfg(test)]
#[path = "timer_test.rs"]
mod timer_test;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a scheduled callback. Dropping it cancels the callback.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Run `f` once after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn after<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        Self { task }
    }

    /// Run `f` every `period`, starting one period from now.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn every<F>(period: Duration, mut f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                f();
            }
        });
        Self { task }
    }

    /// Cancel the callback. Equivalent to dropping the handle.
    pub fn cancel(self) {}

    /// True once a one-shot callback has run or the timer was aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
