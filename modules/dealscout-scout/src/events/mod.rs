//! Event Channel: per-run publish/subscribe with pull-based subscriptions.
//!
//! `publish` stamps `seq` and `ts` and fans out under one lock, so every
//! subscriber of a run sees the same order. Nothing is buffered for late
//! subscribers. Runs with at least one subscriber get a periodic heartbeat.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use dealscout_common::{EventKind, ProgressEvent};

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(15);

struct RunChannel {
    next_seq: u64,
    last_ts: Option<DateTime<Utc>>,
    next_subscriber: u64,
    subscribers: Vec<(u64, mpsc::UnboundedSender<ProgressEvent>)>,
    heartbeat: Option<JoinHandle<()>>,
}

impl RunChannel {
    fn new() -> Self {
        Self {
            next_seq: 0,
            last_ts: None,
            next_subscriber: 0,
            subscribers: Vec::new(),
            heartbeat: None,
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
    }
}

type Channels = Arc<Mutex<HashMap<String, RunChannel>>>;

#[derive(Clone)]
pub struct EventBus {
    channels: Channels,
    heartbeat: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HEARTBEAT)
    }
}

fn lock(channels: &Mutex<HashMap<String, RunChannel>>) -> MutexGuard<'_, HashMap<String, RunChannel>> {
    channels.lock().unwrap_or_else(|e| e.into_inner())
}

impl EventBus {
    pub fn new(heartbeat: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            heartbeat,
        }
    }

    /// Stamp and deliver one event to every current subscriber of `run_id`,
    /// in call order. Closed subscribers are pruned. Returns the stamped event.
    pub fn publish(&self, run_id: &str, kind: EventKind) -> ProgressEvent {
        let mut channels = lock(&self.channels);
        let channel = channels
            .entry(run_id.to_string())
            .or_insert_with(RunChannel::new);

        let now = Utc::now();
        let ts = match channel.last_ts {
            Some(last) if last > now => last,
            _ => now,
        };
        let event = ProgressEvent {
            run_id: run_id.to_string(),
            seq: channel.next_seq,
            ts,
            kind,
        };
        channel.next_seq += 1;
        channel.last_ts = Some(ts);

        channel
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
        if channel.subscribers.is_empty() {
            channel.stop_heartbeat();
        }
        event
    }

    /// Register a live subscriber. Dropping the subscription unsubscribes.
    pub fn subscribe(&self, run_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channels = lock(&self.channels);
        let channel = channels
            .entry(run_id.to_string())
            .or_insert_with(RunChannel::new);

        let id = channel.next_subscriber;
        channel.next_subscriber += 1;
        channel.subscribers.push((id, tx));

        let heartbeat_running = channel
            .heartbeat
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        if !heartbeat_running {
            channel.heartbeat = self.spawn_heartbeat(run_id);
        }
        debug!(run_id, subscriber = id, "Subscribed to run events");

        Subscription {
            run_id: run_id.to_string(),
            id,
            rx,
            channels: self.channels.clone(),
        }
    }

    pub fn subscriber_count(&self, run_id: &str) -> usize {
        lock(&self.channels)
            .get(run_id)
            .map(|c| c.subscribers.iter().filter(|(_, tx)| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Drop all state for a finished run. Open subscriptions end after
    /// draining what was already delivered.
    pub fn close(&self, run_id: &str) {
        if let Some(mut channel) = lock(&self.channels).remove(run_id) {
            channel.stop_heartbeat();
        }
    }

    fn spawn_heartbeat(&self, run_id: &str) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let bus = self.clone();
        let run_id = run_id.to_string();
        let period = self.heartbeat;
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if bus.subscriber_count(&run_id) == 0 {
                    break;
                }
                bus.publish(&run_id, EventKind::Heartbeat);
            }
        }))
    }
}

/// Pull-based handle on one run's events. Usable via `recv().await` or as a
/// `futures::Stream`.
pub struct Subscription {
    run_id: String,
    id: u64,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    channels: Channels,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Stream for Subscription {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut channels = lock(&self.channels);
        if let Some(channel) = channels.get_mut(&self.run_id) {
            channel.subscribers.retain(|(id, _)| *id != self.id);
            if channel.subscribers.is_empty() {
                channel.stop_heartbeat();
                // Nothing was ever published: the run already closed or never started.
                if channel.next_seq == 0 {
                    channels.remove(&self.run_id);
                }
            }
        }
    }
}
