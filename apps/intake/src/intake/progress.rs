//! Synthetic upload progress.
//!
//! The transport reports nothing until it resolves, so the simulator emits a
//! UI-only signal: +step every interval, starting from 0, holding at
//! `PROGRESS_CAP` until the controller stops it. The terminal 100 is never
//! emitted here; only a successful upload sets it.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Highest value the simulator reports while an upload is in flight.
pub const PROGRESS_CAP: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
    pub step: u8,
    pub interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            step: 10,
            interval: Duration::from_millis(100),
        }
    }
}

/// One simulator emission, tagged with the upload attempt it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTick {
    pub attempt: u64,
    pub progress: u8,
}

pub fn next_progress(current: u8, step: u8) -> u8 {
    current.saturating_add(step).min(PROGRESS_CAP)
}

/// Periodic task bound to one upload attempt. Stopping is idempotent and also
/// happens on drop, so a simulator never outlives its owner.
#[derive(Debug)]
pub struct ProgressSimulator {
    attempt: u64,
    task: Option<JoinHandle<()>>,
}

impl ProgressSimulator {
    /// Spawns the ticking task. `emit` returning `false` ends it early
    /// (e.g. the receiving side is gone).
    pub fn start<F>(config: ProgressConfig, attempt: u64, mut emit: F) -> Self
    where
        F: FnMut(ProgressTick) -> bool + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + config.interval, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut progress = 0u8;
            loop {
                ticker.tick().await;
                progress = next_progress(progress, config.step);
                if !emit(ProgressTick { attempt, progress }) {
                    break;
                }
                if progress >= PROGRESS_CAP {
                    break;
                }
            }
        });

        debug!(attempt, "Progress simulator started");
        Self {
            attempt,
            task: Some(task),
        }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Returns `true` only for the call that actually stopped the task.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                debug!(attempt = self.attempt, "Progress simulator stopped");
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
