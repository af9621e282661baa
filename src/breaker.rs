//! Circuit breaker guarding the identity authority.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config;
use crate::error::ClassifiedError;
use crate::fallback;
use crate::identity::{
    BearerToken, Credentials, IdentityAuthority, IdentityUpdate, RemoteFailure,
};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls flow through.
    Closed,
    /// Too many failures, calls are rejected immediately.
    Open,
    /// Cooldown elapsed, a single probe is allowed.
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker tunables.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures inside `failure_window` that open the circuit.
    pub failure_threshold: u32,
    /// Window for counting failures.
    pub failure_window: Duration,
    /// Time to stay open before a probe.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        (&config::CircuitBreaker::default()).into()
    }
}

impl From<&config::CircuitBreaker> for CircuitBreakerConfig {
    fn from(config: &config::CircuitBreaker) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            failure_window: Duration::from_secs(config.failure_window_secs),
            open_duration: Duration::from_secs(config.open_duration_secs),
        }
    }
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed.
    Pass,
    /// The single half-open probe.
    Probe,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Thread-safe circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent across a panic: every write is a single
        // assignment.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a call should be attempted.
    pub fn allow_request(&self) -> Result<Admission, RemoteFailure> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(Admission::Pass),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.open_duration);

                if elapsed >= self.config.open_duration {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                } else {
                    let remaining = self.config.open_duration - elapsed;
                    Err(RemoteFailure::CircuitOpen {
                        retry_after_secs: remaining.as_secs().max(1),
                    })
                }
            },
            CircuitState::HalfOpen if inner.probe_in_flight => {
                Err(RemoteFailure::CircuitOpen { retry_after_secs: 1 })
            },
            CircuitState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(Admission::Probe)
            },
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();

        match (inner.state, admission) {
            (CircuitState::Closed, _) => inner.failures.clear(),
            (CircuitState::HalfOpen, Admission::Probe) => {
                inner.probe_in_flight = false;
                inner.failures.clear();
                self.transition(&mut inner, CircuitState::Closed);
            },
            // A call admitted before the circuit opened says nothing about
            // recovery.
            _ => {},
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        let now = Instant::now();

        match (inner.state, admission) {
            (CircuitState::Closed, _) => {
                let window = self.config.failure_window;
                while inner
                    .failures
                    .front()
                    .is_some_and(|at| now.duration_since(*at) > window)
                {
                    inner.failures.pop_front();
                }
                inner.failures.push_back(now);

                if inner.failures.len() >= self.config.failure_threshold as usize
                {
                    tracing::warn!(
                        failures = inner.failures.len(),
                        "circuit breaker open"
                    );
                    inner.failures.clear();
                    inner.opened_at = Some(now);
                    self.transition(&mut inner, CircuitState::Open);
                }
            },
            (CircuitState::HalfOpen, Admission::Probe) => {
                tracing::warn!("circuit breaker reopened after failed probe");
                inner.probe_in_flight = false;
                inner.opened_at = Some(now);
                self.transition(&mut inner, CircuitState::Open);
            },
            _ => {},
        }
    }

    /// Get current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        if inner.state != to {
            tracing::info!(
                from = inner.state.as_str(),
                to = to.as_str(),
                "circuit breaker transition"
            );
            metrics::counter!("identity_breaker_transitions_total", "to" => to.as_str())
                .increment(1);
            inner.state = to;
        }
    }
}

/// Identity authority call wrapped by a [`CircuitBreaker`], a timeout and the
/// fallback classifier.
///
/// Every failure, including short-circuits, comes back as a
/// [`ClassifiedError`].
#[derive(Clone)]
pub struct BreakerGuardedCall {
    authority: Arc<dyn IdentityAuthority>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
}

impl BreakerGuardedCall {
    pub fn new(
        authority: Arc<dyn IdentityAuthority>,
        breaker: Arc<CircuitBreaker>,
        timeout: Duration,
    ) -> Self {
        Self {
            authority,
            breaker,
            timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Call [`IdentityAuthority::update_identity`] through the breaker.
    ///
    /// Dropping the returned future before it resolves counts as a failure.
    pub async fn update_identity(
        &self,
        key: &str,
        fields: &IdentityUpdate,
        bearer: &BearerToken,
    ) -> Result<Credentials, ClassifiedError> {
        let admission = match self.breaker.allow_request() {
            Ok(admission) => admission,
            Err(failure) => {
                metrics::counter!("identity_breaker_short_circuits_total")
                    .increment(1);
                return Err(fallback::classify(&failure));
            },
        };

        let in_flight = InFlight {
            breaker: &self.breaker,
            admission,
            armed: true,
        };

        let outcome = tokio::time::timeout(
            self.timeout,
            self.authority.update_identity(key, fields, bearer),
        )
        .await
        .unwrap_or(Err(RemoteFailure::Timeout));

        match outcome {
            Ok(credentials) => {
                in_flight.finish(true);
                Ok(credentials)
            },
            Err(failure) => {
                in_flight.finish(false);
                Err(fallback::classify(&failure))
            },
        }
    }
}

/// Settles an admitted call on the breaker, also when the call is dropped.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    armed: bool,
}

impl InFlight<'_> {
    fn finish(mut self, healthy: bool) {
        self.armed = false;
        if healthy {
            self.breaker.record_success(self.admission);
        } else {
            self.breaker.record_failure(self.admission);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("identity call cancelled before completion");
            self.breaker.record_failure(self.admission);
        }
    }
}
