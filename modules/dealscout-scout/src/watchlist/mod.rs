//! Watchlist monitoring: scheduled, non-overlapping re-runs of saved queries
//! that alert only on changes since the last snapshot.

pub mod notify;
pub mod schedule;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod timer;
pub mod worker;

pub use notify::{build_alert, AlertSink, Notifier, WebhookSink};
pub use schedule::{interval_for, parse_schedule};
pub use scheduler::{JobQueue, JobReceiver, WatchlistScheduler};
pub use snapshot::{diff, FileSnapshotStore, MemorySnapshotStore, SnapshotError, SnapshotStore};
pub use store::{FileWatchlistStore, MemoryWatchlistStore, WatchlistSource};
pub use timer::{TimerHandle, TimerService, TokioTimerService};
pub use worker::{CycleReport, WatchlistWorker, WorkerConfig};
