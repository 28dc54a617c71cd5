//! Recurring timers behind a trait so the scheduler never touches the
//! runtime clock directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub type TickFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Handle on one recurring timer. Cancelling is idempotent.
pub struct TimerHandle {
    id: String,
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn new(id: impl Into<String>, cancelled: Arc<AtomicBool>, task: Option<AbortHandle>) -> Self {
        Self {
            id: id.into(),
            cancelled,
            task,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub trait TimerService: Send + Sync {
    /// Call `on_tick(id)` every `interval`, first firing one interval from now.
    fn schedule_recurring(&self, id: &str, interval: Duration, on_tick: TickFn) -> TimerHandle;
}

/// Tokio-backed timers. Missed ticks are skipped, never burst.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimerService;

impl TimerService for TokioTimerService {
    fn schedule_recurring(&self, id: &str, interval: Duration, on_tick: TickFn) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let timer_id = id.to_string();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                debug!(watchlist_id = timer_id.as_str(), "Timer tick");
                on_tick(&timer_id);
            }
        });
        TimerHandle::new(id, cancelled, Some(task.abort_handle()))
    }
}
