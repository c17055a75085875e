use std::time::Duration;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, warn};
use waypoint_common::backend::{Backend, ElementHandle};
use waypoint_common::error::backend_error::BackendError;
use waypoint_common::locator::Locator;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found {
        element: ElementHandle,
        /// The candidate that matched.
        locator: Locator,
        /// Its position in the candidate list.
        candidate: usize,
    },
    NotFound {
        /// Every candidate tried, in order.
        attempted: Vec<String>,
    },
}

impl Resolution {
    pub fn element(&self) -> Option<&ElementHandle> {
        match self {
            Resolution::Found { element, .. } => Some(element),
            Resolution::NotFound { .. } => None,
        }
    }
}

/// Turns an ordered list of candidate locators into one interactable element.
///
/// The timeout is split evenly between candidates. Each candidate is queried at
/// least once and re-queried every poll interval until its slice runs out;
/// the first one to report an interactable element wins and later candidates
/// are never queried.
#[derive(Debug, Clone)]
pub struct LocatorResolver {
    poll_interval: Duration,
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl LocatorResolver {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Only engine failures other than a malformed selector are returned as
    /// errors. A malformed candidate is treated as never matching.
    pub async fn resolve<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        candidates: &[Locator],
        timeout: Duration,
    ) -> Result<Resolution, BackendError> {
        let mut attempted = Vec::with_capacity(candidates.len());
        if candidates.is_empty() {
            return Ok(Resolution::NotFound { attempted });
        }

        let slice = timeout / candidates.len() as u32;

        for (index, locator) in candidates.iter().enumerate() {
            attempted.push(locator.to_string());
            let deadline = Instant::now() + slice;
            let mut polls = 0u32;

            loop {
                polls += 1;
                // A hung query must not outlive the slice, but the first query always gets one poll interval.
                let query_deadline = deadline.max(Instant::now() + self.poll_interval);
                match timeout_at(query_deadline, backend.query_interactable(locator)).await {
                    Ok(Ok(Some(element))) => {
                        debug!(
                            "Resolved '{}' with candidate {} after {} poll(s)",
                            locator, index, polls
                        );
                        return Ok(Resolution::Found {
                            element,
                            locator: locator.clone(),
                            candidate: index,
                        });
                    }
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) if e.is_selector_error() => {
                        warn!("Skipping candidate '{}': {}", locator, e);
                        break;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        debug!("Query for '{}' outlived its time slice", locator);
                        break;
                    }
                }

                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                sleep(self.poll_interval.min(deadline - now)).await;
            }

            debug!("Candidate '{}' exhausted after {} poll(s)", locator, polls);
        }

        Ok(Resolution::NotFound { attempted })
    }
}
