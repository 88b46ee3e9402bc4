//! Per-client admission control for generation requests
//!
//! Each client identity gets at most one admission per rate window and at
//! most `max_in_flight` admitted requests running at once. Throttled callers
//! are told when to retry; nothing is queued server-side.
//!
//! State lives only in memory. Idle entries are evicted by [`AdmissionController::sweep`],
//! which [`AdmissionController::spawn_sweeper`] runs on an interval.

pub mod clock;
pub mod identity;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::ClientIdentity;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{RateLimitConfig, RetryHintMode};

/// How the retry hint for a rejected request is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Always the same hint, whatever the actual remaining wait
    Fixed(Duration),
    /// Exact time left in the rate window; concurrency rejections fall back to `fallback`
    Remaining { fallback: Duration },
}

/// Admission policy
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Minimum time between two admissions of the same identity
    pub min_interval: Duration,
    /// Maximum admitted requests running at once per identity
    pub max_in_flight: u32,
    pub retry_hint: RetryHint,
    /// Idle entries older than this are evicted by `sweep`
    pub idle_ttl: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            max_in_flight: 1,
            retry_hint: RetryHint::Fixed(Duration::from_secs(60)),
            idle_ttl: Duration::from_secs(300),
        }
    }
}

impl From<&RateLimitConfig> for AdmissionConfig {
    fn from(config: &RateLimitConfig) -> Self {
        let retry_hint = match config.retry_hint {
            RetryHintMode::Fixed => RetryHint::Fixed(config.retry_after()),
            RetryHintMode::Remaining => RetryHint::Remaining {
                fallback: config.retry_after(),
            },
        };

        Self {
            min_interval: config.min_interval(),
            max_in_flight: config.max_in_flight,
            retry_hint,
            idle_ttl: config.idle_ttl(),
        }
    }
}

/// Mutable state tracked per identity
#[derive(Debug, Clone)]
pub struct ClientLimiterState {
    pub last_admitted: Option<Instant>,
    pub in_flight: u32,
    pub last_seen: Instant,
}

impl ClientLimiterState {
    fn new(now: Instant) -> Self {
        Self {
            last_admitted: None,
            in_flight: 0,
            last_seen: now,
        }
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Previous admission is still inside the rate window
    Interval,
    /// The identity already has `max_in_flight` requests running
    Concurrency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub retry_after: Duration,
}

impl Rejection {
    /// Retry hint in whole seconds, rounded up, never below 1
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let secs = if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        secs.max(1)
    }
}

/// Outcome of [`AdmissionController::admit`]
#[derive(Debug)]
pub enum Decision {
    Admitted(AdmissionPermit),
    Rejected(Rejection),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted(_))
    }
}

struct Inner {
    config: AdmissionConfig,
    clock: Arc<dyn Clock>,
    clients: DashMap<ClientIdentity, ClientLimiterState>,
}

impl Inner {
    fn release(&self, identity: &ClientIdentity) {
        let now = self.clock.now();
        if let Some(mut state) = self.clients.get_mut(identity) {
            state.in_flight = state.in_flight.saturating_sub(1);
            state.last_seen = now;
        }
    }
}

/// Shared admission controller; clones refer to the same state
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Create a controller backed by the system clock
    pub fn new(config: AdmissionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a controller with an explicit time source
    pub fn with_clock(config: AdmissionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                clients: DashMap::new(),
            }),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.inner.config
    }

    /// Decide whether `identity` may start a request now.
    ///
    /// Check and update run under the identity's shard lock, so two
    /// concurrent calls for one identity cannot both take the last slot.
    pub fn admit(&self, identity: &ClientIdentity) -> Decision {
        let config = &self.inner.config;
        let now = self.inner.clock.now();

        let mut entry = self
            .inner
            .clients
            .entry(identity.clone())
            .or_insert_with(|| ClientLimiterState::new(now));
        let state = entry.value_mut();
        state.last_seen = now;

        if state.in_flight >= config.max_in_flight {
            let in_flight = state.in_flight;
            drop(entry);
            debug!(client = %identity, in_flight, "Admission rejected: request already in flight");
            return Decision::Rejected(self.rejection(RejectReason::Concurrency, None));
        }

        if let Some(last) = state.last_admitted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < config.min_interval {
                let remaining = config.min_interval - elapsed;
                drop(entry);
                debug!(
                    client = %identity,
                    remaining_ms = remaining.as_millis() as u64,
                    "Admission rejected: inside rate window"
                );
                return Decision::Rejected(self.rejection(RejectReason::Interval, Some(remaining)));
            }
        }

        state.last_admitted = Some(now);
        state.in_flight += 1;
        drop(entry);

        debug!(client = %identity, "Admitted");
        Decision::Admitted(AdmissionPermit {
            inner: Some(self.inner.clone()),
            identity: identity.clone(),
        })
    }

    fn rejection(&self, reason: RejectReason, remaining: Option<Duration>) -> Rejection {
        let retry_after = match (self.inner.config.retry_hint, remaining) {
            (RetryHint::Fixed(hint), _) => hint,
            (RetryHint::Remaining { .. }, Some(remaining)) => remaining,
            (RetryHint::Remaining { fallback }, None) => fallback,
        };
        Rejection {
            reason,
            retry_after,
        }
    }

    /// Evict identities with nothing in flight whose rate window has passed
    /// and that have been idle for `idle_ttl`. Returns the number evicted.
    ///
    /// Only entries that would be admitted anyway are removed, so a sweep
    /// never changes a later decision.
    pub fn sweep(&self) -> usize {
        let config = &self.inner.config;
        let now = self.inner.clock.now();
        let before = self.inner.clients.len();

        self.inner.clients.retain(|_, state| {
            if state.in_flight > 0 {
                return true;
            }
            let window_open = state
                .last_admitted
                .map_or(true, |last| now.saturating_duration_since(last) >= config.min_interval);
            let idle = now.saturating_duration_since(state.last_seen) >= config.idle_ttl;
            !(window_open && idle)
        });

        before.saturating_sub(self.inner.clients.len())
    }

    /// Run [`sweep`](Self::sweep) every `every` until the task is aborted
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let controller = self.clone();
        info!(interval_secs = every.as_secs(), "Starting admission sweeper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = controller.sweep();
                if evicted > 0 {
                    debug!(
                        evicted,
                        tracked = controller.tracked_clients(),
                        "Evicted idle admission entries"
                    );
                }
            }
        })
    }

    /// Number of identities currently holding state
    pub fn tracked_clients(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn in_flight(&self, identity: &ClientIdentity) -> u32 {
        self.inner
            .clients
            .get(identity)
            .map_or(0, |state| state.in_flight)
    }

    /// Snapshot of one identity's state
    pub fn state(&self, identity: &ClientIdentity) -> Option<ClientLimiterState> {
        self.inner.clients.get(identity).map(|state| state.clone())
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(AdmissionConfig::default())
    }
}

/// One in-flight slot. Dropping the permit gives the slot back.
pub struct AdmissionPermit {
    inner: Option<Arc<Inner>>,
    identity: ClientIdentity,
}

impl AdmissionPermit {
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Give the slot back now instead of at drop
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release(&self.identity);
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("identity", &self.identity)
            .field("released", &self.inner.is_none())
            .finish()
    }
}
