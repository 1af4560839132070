//! Global loading tracker
//!
//! Aggregates in-flight requests into a single busy signal. Every dispatched
//! request registers a [`RequestRecord`]; the tracker is loading iff at least
//! one record exists. Records whose completion never arrives are reclaimed by
//! a periodic sweep.

use papaya::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of a tracked request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub id: RequestId,
    pub url: String,
    pub method: String,
    pub started_at: Instant,
}

/// Aggregate state published to subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingState {
    pub in_flight: usize,
    pub loading: bool,
}

/// Thread-safe tracker of in-flight requests
#[derive(Clone)]
pub struct LoadingTracker {
    requests: Arc<HashMap<RequestId, RequestRecord>>,
    state: Arc<watch::Sender<LoadingState>>,
}

impl LoadingTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LoadingState::default());
        Self {
            requests: Arc::new(HashMap::new()),
            state: Arc::new(state),
        }
    }

    /// Start tracking a request and return its fresh id
    pub fn start_request(&self, url: &str, method: &str) -> RequestId {
        let id = RequestId::generate();
        let record = RequestRecord {
            id: id.clone(),
            url: url.to_string(),
            method: method.to_ascii_uppercase(),
            started_at: Instant::now(),
        };
        self.requests.pin().insert(id.clone(), record);
        self.publish();
        id
    }

    /// Stop tracking a request. Unknown or already ended ids are ignored.
    pub fn end_request(&self, id: &RequestId) {
        if self.requests.pin().remove(id).is_some() {
            self.publish();
        }
    }

    /// Start tracking and return a guard that ends the request when dropped
    pub fn track(&self, url: &str, method: &str) -> LoadingGuard {
        LoadingGuard {
            tracker: self.clone(),
            id: Some(self.start_request(url, method)),
        }
    }

    /// Drop every tracked request
    pub fn force_complete(&self) {
        self.requests.pin().clear();
        self.publish();
    }

    /// Remove requests older than `max_age`, returning how many were dropped
    pub fn clear_stale_requests(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let requests = self.requests.pin();
        let stale: Vec<RequestId> = requests
            .iter()
            .filter(|(_, record)| now.duration_since(record.started_at) > max_age)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            requests.remove(id);
        }
        drop(requests);

        if !stale.is_empty() {
            debug!(count = stale.len(), "Dropped stale requests");
            self.publish();
        }
        stale.len()
    }

    pub fn is_loading(&self) -> bool {
        self.request_count() > 0
    }

    pub fn request_count(&self) -> usize {
        self.requests.pin().len()
    }

    /// Snapshot of the tracked requests (for debugging)
    pub fn active_requests(&self) -> Vec<RequestRecord> {
        self.requests
            .pin()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.state.subscribe()
    }

    /// Spawn the periodic stale-request sweep
    pub fn spawn_sweeper(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                max_age_secs = max_age.as_secs(),
                "Started stale request sweeper"
            );
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tracker.clear_stale_requests(max_age);
            }
        })
    }

    // Recomputed under the watch lock so the last publisher always sees the
    // latest map contents.
    fn publish(&self) {
        self.state.send_if_modified(|state| {
            let in_flight = self.requests.pin().len();
            let next = LoadingState {
                in_flight,
                loading: in_flight > 0,
            };
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
    }
}

impl Default for LoadingTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends its request on drop, covering every exit path of a call
pub struct LoadingGuard {
    tracker: LoadingTracker,
    id: Option<RequestId>,
}

impl LoadingGuard {
    pub fn id(&self) -> Option<&RequestId> {
        self.id.as_ref()
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.tracker.end_request(&id);
        }
    }
}

const PROGRESS_CEILING: u8 = 90;
const PROGRESS_COMPLETE: u8 = 100;
const PROGRESS_FIRST_STEP: Duration = Duration::from_millis(100);
const PROGRESS_STEP: Duration = Duration::from_millis(200);
const PROGRESS_HIDE_AFTER: Duration = Duration::from_millis(200);

/// Progress value (0..=100) animated from the tracker's loading state.
///
/// While requests are in flight the value creeps towards 90, slowing down as
/// it goes. When the tracker empties it jumps to 100 and resets to 0 shortly
/// after.
pub struct ProgressIndicator {
    value: watch::Receiver<u8>,
    task: JoinHandle<()>,
}

impl ProgressIndicator {
    pub fn spawn(tracker: &LoadingTracker) -> Self {
        let (tx, value) = watch::channel(0u8);
        let loading = tracker.subscribe();
        let task = tokio::spawn(animate(loading, tx));
        Self { value, task }
    }

    pub fn value(&self) -> u8 {
        *self.value.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.value.clone()
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn progress_increment(value: u8) -> u8 {
    if value < 30 {
        10
    } else if value < 60 {
        5
    } else {
        2
    }
}

async fn animate(mut loading: watch::Receiver<LoadingState>, progress: watch::Sender<u8>) {
    loop {
        // Wait for a request to start
        while !loading.borrow_and_update().loading {
            if loading.changed().await.is_err() {
                return;
            }
        }

        progress.send_replace(0);
        let mut next_tick = Instant::now() + PROGRESS_FIRST_STEP;
        loop {
            tokio::select! {
                changed = loading.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !loading.borrow_and_update().loading {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    progress.send_modify(|value| {
                        if *value < PROGRESS_CEILING {
                            *value = (*value + progress_increment(*value)).min(PROGRESS_CEILING);
                        }
                    });
                    next_tick = Instant::now() + PROGRESS_STEP;
                }
            }
        }

        progress.send_replace(PROGRESS_COMPLETE);
        tokio::time::sleep(PROGRESS_HIDE_AFTER).await;
        progress.send_replace(0);
    }
}
