//! Watchlist Scheduler: one recurring timer per enabled watchlist, all
//! feeding a single-consumer FIFO of cycle jobs.
//!
//! A job for an id that is already waiting in the queue is coalesced, so a
//! manual trigger can never stack up behind (or race) a scheduled tick.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dealscout_common::Watchlist;

use super::schedule::interval_for;
use super::snapshot::{SnapshotError, SnapshotStore};
use super::timer::{TimerHandle, TimerService};
use super::worker::WatchlistWorker;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Producer side of the cycle queue. Cheap to clone into timer callbacks.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<String>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl JobQueue {
    pub fn new() -> (Self, JobReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Mutex::new(HashSet::new()));
        (
            Self {
                tx,
                pending: pending.clone(),
            },
            JobReceiver { rx, pending },
        )
    }

    /// Enqueue a cycle for `id`. Returns false when one is already pending.
    pub fn enqueue(&self, id: &str) -> bool {
        let mut pending = lock(&self.pending);
        if !pending.insert(id.to_string()) {
            info!(watchlist_id = id, "Cycle already queued, coalesced");
            return false;
        }
        if self.tx.send(id.to_string()).is_err() {
            pending.remove(id);
            warn!(watchlist_id = id, "Cycle queue closed, job dropped");
            return false;
        }
        true
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// Consumer side. There is exactly one.
pub struct JobReceiver {
    rx: mpsc::UnboundedReceiver<String>,
    pending: Arc<Mutex<HashSet<String>>>,
}

impl JobReceiver {
    /// Next job in FIFO order. The id leaves the pending set as it is taken,
    /// so a trigger arriving mid-cycle queues exactly one follow-up.
    pub async fn next(&mut self) -> Option<String> {
        let id = self.rx.recv().await?;
        lock(&self.pending).remove(&id);
        Some(id)
    }

    pub fn try_next(&mut self) -> Option<String> {
        let id = self.rx.try_recv().ok()?;
        lock(&self.pending).remove(&id);
        Some(id)
    }
}

struct Registration {
    handle: TimerHandle,
    interval: Duration,
}

pub struct WatchlistScheduler {
    timers: Arc<dyn TimerService>,
    snapshots: Arc<dyn SnapshotStore>,
    default_interval: Duration,
    queue: JobQueue,
    receiver: Mutex<Option<JobReceiver>>,
    registrations: Mutex<HashMap<String, Registration>>,
    /// Every id present in the last synced definition list.
    known: Mutex<HashSet<String>>,
}

impl WatchlistScheduler {
    pub fn new(
        timers: Arc<dyn TimerService>,
        snapshots: Arc<dyn SnapshotStore>,
        default_interval: Duration,
    ) -> Self {
        let (queue, receiver) = JobQueue::new();
        Self {
            timers,
            snapshots,
            default_interval,
            queue,
            receiver: Mutex::new(Some(receiver)),
            registrations: Mutex::new(HashMap::new()),
            known: Mutex::new(HashSet::new()),
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Take the single consumer. `None` once taken.
    pub fn take_receiver(&self) -> Option<JobReceiver> {
        lock(&self.receiver).take()
    }

    /// Spawn the consumer loop: one cycle at a time, in queue order. Cycle
    /// errors are logged and never stop the loop.
    pub fn spawn_consumer(&self, worker: Arc<WatchlistWorker>) -> Option<JoinHandle<()>> {
        let mut receiver = self.take_receiver()?;
        Some(tokio::spawn(async move {
            while let Some(id) = receiver.next().await {
                if let Err(e) = worker.run_cycle(&id).await {
                    warn!(watchlist_id = id.as_str(), error = %e, "Watchlist cycle skipped");
                }
            }
            info!("Watchlist queue closed, consumer exiting");
        }))
    }

    /// Start (or restart) the timer for a watchlist. Disabled watchlists are
    /// cancelled instead.
    pub fn register(&self, watchlist: &Watchlist) {
        if !watchlist.enabled {
            self.disable(&watchlist.id);
            return;
        }
        let interval = interval_for(&watchlist.id, &watchlist.schedule, self.default_interval);

        let mut registrations = lock(&self.registrations);
        if let Some(existing) = registrations.remove(&watchlist.id) {
            existing.handle.cancel();
        }

        let queue = self.queue.clone();
        let handle = self.timers.schedule_recurring(
            &watchlist.id,
            interval,
            Arc::new(move |id: &str| {
                queue.enqueue(id);
            }),
        );
        registrations.insert(watchlist.id.clone(), Registration { handle, interval });
        info!(
            watchlist_id = watchlist.id.as_str(),
            interval_secs = interval.as_secs(),
            "Watchlist scheduled"
        );
    }

    /// Cancel a watchlist's timer. Returns false if none was registered.
    pub fn disable(&self, id: &str) -> bool {
        match lock(&self.registrations).remove(id) {
            Some(registration) => {
                registration.handle.cancel();
                info!(watchlist_id = id, "Watchlist timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel the timer and drop the watchlist's snapshot.
    pub async fn delete(&self, id: &str) -> Result<(), SnapshotError> {
        self.disable(id);
        self.snapshots.delete(id).await?;
        info!(watchlist_id = id, "Watchlist deleted");
        Ok(())
    }

    /// Reconcile timers against a freshly loaded definition list: new or
    /// re-timed watchlists are (re)registered and disabled ones cancelled.
    /// Ids that vanished from the list are deleted along with their
    /// snapshot. Unchanged timers keep their phase.
    pub async fn sync(&self, watchlists: &[Watchlist]) {
        let present: HashSet<String> = watchlists.iter().map(|w| w.id.clone()).collect();
        let wanted: HashMap<&str, &Watchlist> = watchlists
            .iter()
            .filter(|w| w.enabled)
            .map(|w| (w.id.as_str(), w))
            .collect();

        let removed: Vec<String> = {
            let mut known = lock(&self.known);
            let registered = lock(&self.registrations);
            let gone = known
                .iter()
                .chain(registered.keys())
                .filter(|id| !present.contains(id.as_str()))
                .cloned()
                .collect::<HashSet<_>>();
            *known = present;
            gone.into_iter().collect()
        };
        for id in removed {
            if let Err(e) = self.delete(&id).await {
                warn!(watchlist_id = id.as_str(), error = %e, "Failed to drop snapshot of removed watchlist");
            }
        }

        let disabled: Vec<String> = lock(&self.registrations)
            .keys()
            .filter(|id| !wanted.contains_key(id.as_str()))
            .cloned()
            .collect();
        for id in disabled {
            self.disable(&id);
        }

        for watchlist in wanted.values() {
            let interval = interval_for(&watchlist.id, &watchlist.schedule, self.default_interval);
            let unchanged = lock(&self.registrations)
                .get(&watchlist.id)
                .is_some_and(|r| r.interval == interval && !r.handle.is_cancelled());
            if !unchanged {
                self.register(watchlist);
            }
        }
    }

    /// Queue an immediate cycle. Returns false when coalesced.
    pub fn trigger_now(&self, id: &str) -> bool {
        info!(watchlist_id = id, "Manual cycle trigger");
        self.queue.enqueue(id)
    }

    /// Ids with a live timer, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.registrations).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn interval_of(&self, id: &str) -> Option<Duration> {
        lock(&self.registrations).get(id).map(|r| r.interval)
    }

    pub fn shutdown(&self) {
        for (_, registration) in lock(&self.registrations).drain() {
            registration.handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualTimer;
    use crate::watchlist::snapshot::MemorySnapshotStore;
    use chrono::Utc;
    use dealscout_common::Snapshot;

    fn watchlist(id: &str, schedule: &str, enabled: bool) -> Watchlist {
        serde_json::from_value(serde_json::json!({
            "id": id, "label": id, "query": "dollar general",
            "schedule": schedule, "enabled": enabled
        }))
        .unwrap()
    }

    fn scheduler(timer: Arc<ManualTimer>) -> (WatchlistScheduler, Arc<MemorySnapshotStore>) {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        (
            WatchlistScheduler::new(timer, snapshots.clone(), Duration::from_secs(600)),
            snapshots,
        )
    }

    #[test]
    fn queue_coalesces_pending_ids_and_keeps_fifo() {
        let (queue, mut rx) = JobQueue::new();
        assert!(queue.enqueue("a"));
        assert!(queue.enqueue("b"));
        assert!(!queue.enqueue("a"));
        assert_eq!(queue.pending(), 2);

        assert_eq!(rx.try_next().as_deref(), Some("a"));
        assert!(queue.enqueue("a"));
        assert_eq!(rx.try_next().as_deref(), Some("b"));
        assert_eq!(rx.try_next().as_deref(), Some("a"));
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn timer_ticks_enqueue_jobs() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, _) = scheduler(timer.clone());
        let mut rx = scheduler.take_receiver().unwrap();

        scheduler.register(&watchlist("w1", "@hourly", true));
        assert_eq!(scheduler.interval_of("w1"), Some(Duration::from_secs(3600)));

        timer.fire("w1");
        timer.fire("w1");
        assert!(!scheduler.trigger_now("w1"));
        assert_eq!(rx.try_next().as_deref(), Some("w1"));
        assert!(rx.try_next().is_none());
    }

    #[test]
    fn reregistering_cancels_previous_timer() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, _) = scheduler(timer.clone());

        scheduler.register(&watchlist("w1", "@hourly", true));
        scheduler.register(&watchlist("w1", "@daily", true));
        assert_eq!(timer.active("w1"), 1);
        assert_eq!(timer.scheduled("w1"), 2);
        assert_eq!(scheduler.interval_of("w1"), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn disabled_watchlists_are_not_scheduled() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, _) = scheduler(timer.clone());

        scheduler.register(&watchlist("w1", "@hourly", true));
        scheduler.register(&watchlist("w1", "@hourly", false));
        assert!(scheduler.registered().is_empty());
        assert_eq!(timer.active("w1"), 0);
    }

    #[test]
    fn unparseable_schedule_uses_default() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, _) = scheduler(timer);
        scheduler.register(&watchlist("w1", "whenever", true));
        assert_eq!(scheduler.interval_of("w1"), Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn sync_reconciles_against_definitions() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, _) = scheduler(timer.clone());
        scheduler
            .sync(&[
                watchlist("a", "@hourly", true),
                watchlist("b", "@hourly", true),
                watchlist("c", "@hourly", false),
            ])
            .await;
        assert_eq!(scheduler.registered(), vec!["a", "b"]);

        scheduler
            .sync(&[
                watchlist("a", "@hourly", true),
                watchlist("b", "@daily", true),
                watchlist("c", "@hourly", true),
            ])
            .await;
        assert_eq!(scheduler.registered(), vec!["a", "b", "c"]);
        assert_eq!(timer.scheduled("a"), 1);
        assert_eq!(timer.scheduled("b"), 2);

        scheduler.sync(&[watchlist("c", "@hourly", true)]).await;
        assert_eq!(scheduler.registered(), vec!["c"]);
        assert_eq!(timer.active("a"), 0);
    }

    fn snapshot_of(id: &str) -> Snapshot {
        Snapshot {
            watchlist_id: id.into(),
            taken_at: Utc::now(),
            items: vec![],
        }
    }

    #[tokio::test]
    async fn sync_drops_snapshots_of_removed_ids_only() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, snapshots) = scheduler(timer.clone());
        scheduler
            .sync(&[
                watchlist("a", "@hourly", true),
                watchlist("b", "@hourly", true),
                watchlist("c", "@hourly", false),
            ])
            .await;
        for id in ["a", "b", "c"] {
            snapshots.save(&snapshot_of(id)).await.unwrap();
        }

        // b disabled, c (never registered) removed
        scheduler
            .sync(&[watchlist("a", "@hourly", true), watchlist("b", "@hourly", false)])
            .await;
        assert_eq!(scheduler.registered(), vec!["a"]);
        assert!(snapshots.load("b").await.unwrap().is_some());
        assert!(snapshots.load("c").await.unwrap().is_none());

        scheduler.sync(&[watchlist("b", "@hourly", false)]).await;
        assert!(scheduler.registered().is_empty());
        assert_eq!(timer.active("a"), 0);
        assert!(snapshots.load("a").await.unwrap().is_none());
        assert!(snapshots.load("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_cancels_and_drops_snapshot() {
        let timer = Arc::new(ManualTimer::new());
        let (scheduler, snapshots) = scheduler(timer.clone());
        scheduler.register(&watchlist("w1", "@hourly", true));
        snapshots.save(&snapshot_of("w1")).await.unwrap();

        scheduler.delete("w1").await.unwrap();
        assert!(scheduler.registered().is_empty());
        assert!(snapshots.load("w1").await.unwrap().is_none());
    }
}
