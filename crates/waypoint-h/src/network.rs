use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct NetworkState {
    in_flight: HashSet<String>,
    last_activity: Option<Instant>,
}

/// Counts requests between `requestWillBeSent` and `loadingFinished`/`loadingFailed`.
///
/// The page is idle once nothing has been in flight for the quiet window.
#[derive(Debug, Clone)]
pub struct NetworkTracker {
    state: Arc<Mutex<NetworkState>>,
    quiet: Duration,
}

impl NetworkTracker {
    pub fn new(quiet: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState::default())),
            quiet,
        }
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        // A panicking listener cannot leave the set half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn started(&self, request_id: &str) {
        let mut state = self.lock();
        state.in_flight.insert(request_id.to_string());
        state.last_activity = Some(Instant::now());
    }

    pub fn finished(&self, request_id: &str) {
        let mut state = self.lock();
        if state.in_flight.remove(request_id) {
            state.last_activity = Some(Instant::now());
        }
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.in_flight.is_empty()
            && state
                .last_activity
                .is_none_or(|at| at.elapsed() >= self.quiet)
    }

    /// Returns `false` when `timeout` elapsed before the page went quiet.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!("Network still busy: {} request(s) in flight", self.in_flight());
                return false;
            }
            tokio::time::sleep(IDLE_POLL.min(deadline - now)).await;
        }
    }
}
