//! Synthetic progress shown while the model runs.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineOptions;
use crate::generation::GenerationToken;

/// Highest percentage published in the current phase. Shared by real progress
/// reports and the animation so that neither can move the bar backwards.
#[derive(Debug, Clone, Default)]
pub struct ProgressLevel(Arc<Mutex<f32>>);

impl ProgressLevel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> f32 {
        *self.0.lock()
    }

    /// Record `value` if it is above the current level. Returns whether it was.
    pub fn raise(&self, value: f32) -> bool {
        let mut level = self.0.lock();
        if value > *level {
            *level = value;
            true
        } else {
            false
        }
    }

    /// Start a new phase at `value`.
    pub fn reset(&self, value: f32) {
        *self.0.lock() = value;
    }
}

/// Percentage the animation shows `elapsed` into a run of `duration` that eases from
/// `start` to `cap`.
pub fn animated_value(elapsed: Duration, duration: Duration, start: f32, cap: f32) -> f32 {
    if duration.is_zero() || start >= cap {
        return cap;
    }
    let fraction = (elapsed.as_secs_f32() / duration.as_secs_f32()).min(1.0);
    (start + fraction * (cap - start)).min(cap)
}

pub type Publish = Arc<dyn Fn(f32) + Send + Sync>;

/// Ticking task that eases progress toward the cap. It stops once the cap is reached,
/// once its generation goes stale, or when the handle is stopped or dropped.
#[derive(Debug)]
pub struct ProgressAnimation {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressAnimation {
    /// Spawn the animation on the current runtime. It eases up from the level the
    /// current phase has reached.
    pub fn start(
        options: &PipelineOptions,
        level: ProgressLevel,
        token: GenerationToken,
        publish: Publish,
    ) -> Self {
        let cancel = CancellationToken::new();
        let interval = options.animation_interval;
        let duration = options.animation_duration;
        let cap = options.animation_cap;
        let start = level.get();

        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if !token.is_current() {
                    tracing::debug!(generation = token.id(), "stale animation stopped");
                    break;
                }

                let value = animated_value(started.elapsed(), duration, start, cap);
                if level.raise(value) {
                    publish(value);
                }
                if value >= cap {
                    break;
                }
            }
        });

        Self { cancel, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the animation. Dropping the handle does the same.
    pub fn stop(self) {}
}

impl Drop for ProgressAnimation {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}
