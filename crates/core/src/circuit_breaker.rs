use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed - probes and routing proceed normally
    Closed,
    /// Circuit is open - the pool is forced UNAVAILABLE and probes are ignored
    Open,
    /// Circuit is half-open - exactly one trial probe is allowed through
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// How long an open circuit ignores probes
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Outcome of asking the breaker whether a probe may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePermit {
    /// Circuit closed, probe normally
    Allowed,
    /// Cooldown elapsed, this probe decides whether the circuit closes
    Trial,
    /// Circuit open, probe skipped
    Rejected { remaining: Duration },
}

impl ProbePermit {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, ProbePermit::Rejected { .. })
    }
}

/// State change produced by recording an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    None,
    /// Threshold reached from closed state
    Opened,
    /// Trial probe failed, cooldown restarted
    Reopened,
    /// Trial probe succeeded
    Closed,
}

/// Per-pool circuit breaker
///
/// Pure state machine: the caller owns synchronization and passes the
/// current instant, so cooldown behaviour is testable without sleeping.
#[derive(Debug, Clone)]
pub struct PoolCircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    times_opened: u64,
    total_failures: u64,
    total_successes: u64,
}

/// Circuit breaker statistics for serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub times_opened: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    /// Remaining cooldown in milliseconds, only while open
    pub cooldown_remaining_ms: Option<u64>,
}

impl PoolCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            times_opened: 0,
            total_failures: 0,
            total_successes: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_open(&self) -> bool {
        self.state != CircuitState::Closed
    }

    /// Check if a probe should run based on circuit state
    pub fn try_acquire_probe(&mut self, now: Instant) -> ProbePermit {
        match self.state {
            CircuitState::Closed => ProbePermit::Allowed,
            CircuitState::Open => {
                let remaining = self.cooldown_remaining(now);
                if remaining.is_zero() {
                    self.state = CircuitState::HalfOpen;
                    self.trial_in_flight = true;
                    ProbePermit::Trial
                } else {
                    ProbePermit::Rejected { remaining }
                }
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    ProbePermit::Rejected {
                        remaining: Duration::ZERO,
                    }
                } else {
                    self.trial_in_flight = true;
                    ProbePermit::Trial
                }
            }
        }
    }

    /// Record successful probe
    pub fn record_success(&mut self) -> CircuitTransition {
        self.total_successes += 1;

        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                CircuitTransition::None
            }
            // Open circuits ignore outcomes until the trial probe
            CircuitState::Open => CircuitTransition::None,
            CircuitState::HalfOpen => {
                self.state = CircuitState::Closed;
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.trial_in_flight = false;
                CircuitTransition::Closed
            }
        }
    }

    /// Record failed probe or submission
    pub fn record_failure(&mut self, now: Instant) -> CircuitTransition {
        self.total_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.open(now);
                    CircuitTransition::Opened
                } else {
                    CircuitTransition::None
                }
            }
            CircuitState::Open => CircuitTransition::None,
            CircuitState::HalfOpen => {
                // In half-open state, any failure restarts the full cooldown
                self.open(now);
                CircuitTransition::Reopened
            }
        }
    }

    /// Record a failure observed outside the probe path (e.g. a failed submission)
    ///
    /// May open a closed circuit, but never restarts a running cooldown or
    /// interferes with an in-flight trial probe.
    pub fn record_external_failure(&mut self, now: Instant) -> CircuitTransition {
        if self.state == CircuitState::Closed {
            return self.record_failure(now);
        }
        self.total_failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        CircuitTransition::None
    }

    /// Release a trial permit whose probe never produced an outcome
    pub fn abandon_trial(&mut self) {
        self.trial_in_flight = false;
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
        self.times_opened += 1;
    }

    fn cooldown_remaining(&self, now: Instant) -> Duration {
        match self.opened_at {
            Some(opened_at) => self
                .config
                .cooldown
                .saturating_sub(now.saturating_duration_since(opened_at)),
            None => Duration::ZERO,
        }
    }

    pub fn snapshot(&self, now: Instant) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            times_opened: self.times_opened,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            cooldown_remaining_ms: (self.state == CircuitState::Open)
                .then(|| self.cooldown_remaining(now).as_millis() as u64),
        }
    }

    /// Reset circuit breaker to closed state
    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_secs: u64) -> PoolCircuitBreaker {
        PoolCircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    #[test]
    fn test_circuit_breaker_closed_state() {
        let mut cb = breaker(3, 60);
        let now = Instant::now();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.try_acquire_probe(now), ProbePermit::Allowed);

        assert_eq!(cb.record_failure(now), CircuitTransition::None);
        assert_eq!(cb.record_success(), CircuitTransition::None);
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_breaker_opens_at_threshold() {
        let mut cb = breaker(3, 60);
        let now = Instant::now();

        assert_eq!(cb.record_failure(now), CircuitTransition::None);
        assert_eq!(cb.record_failure(now), CircuitTransition::None);
        assert_eq!(cb.record_failure(now), CircuitTransition::Opened);
        assert_eq!(cb.state(), CircuitState::Open);

        // Further probes should be blocked during cooldown
        let permit = cb.try_acquire_probe(now + Duration::from_secs(59));
        assert!(!permit.is_allowed());
    }

    #[test]
    fn test_open_circuit_ignores_success_until_trial() {
        let mut cb = breaker(1, 60);
        let now = Instant::now();

        cb.record_failure(now);
        assert_eq!(cb.record_success(), CircuitTransition::None);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 1);
    }

    #[test]
    fn test_circuit_breaker_recovery() {
        let mut cb = breaker(2, 60);
        let now = Instant::now();

        cb.record_failure(now);
        cb.record_failure(now);

        let after = now + Duration::from_secs(60);
        assert_eq!(cb.try_acquire_probe(after), ProbePermit::Trial);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Only one trial probe at a time
        assert!(!cb.try_acquire_probe(after).is_allowed());

        assert_eq!(cb.record_success(), CircuitTransition::Closed);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_failed_trial_restarts_cooldown() {
        let mut cb = breaker(1, 60);
        let start = Instant::now();
        cb.record_failure(start);

        let trial_at = start + Duration::from_secs(61);
        assert_eq!(cb.try_acquire_probe(trial_at), ProbePermit::Trial);
        assert_eq!(cb.record_failure(trial_at), CircuitTransition::Reopened);

        // Cooldown counts from the failed trial, not from the first opening
        match cb.try_acquire_probe(trial_at + Duration::from_secs(30)) {
            ProbePermit::Rejected { remaining } => assert_eq!(remaining, Duration::from_secs(30)),
            other => panic!("unexpected permit: {other:?}"),
        }
        assert_eq!(
            cb.try_acquire_probe(trial_at + Duration::from_secs(60)),
            ProbePermit::Trial
        );
        assert_eq!(cb.snapshot(trial_at).times_opened, 2);
    }

    #[test]
    fn test_external_failures_never_restart_cooldown() {
        let mut cb = breaker(2, 60);
        let start = Instant::now();

        assert_eq!(cb.record_external_failure(start), CircuitTransition::None);
        assert_eq!(cb.record_external_failure(start), CircuitTransition::Opened);

        let later = start + Duration::from_secs(50);
        assert_eq!(cb.record_external_failure(later), CircuitTransition::None);
        assert_eq!(cb.consecutive_failures(), 3);
        match cb.try_acquire_probe(later) {
            ProbePermit::Rejected { remaining } => assert_eq!(remaining, Duration::from_secs(10)),
            other => panic!("unexpected permit: {other:?}"),
        }

        // A trial in flight is not disturbed either
        let trial_at = start + Duration::from_secs(60);
        assert_eq!(cb.try_acquire_probe(trial_at), ProbePermit::Trial);
        assert_eq!(cb.record_external_failure(trial_at), CircuitTransition::None);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.record_success(), CircuitTransition::Closed);
    }

    #[test]
    fn test_abandon_trial_allows_new_trial() {
        let mut cb = breaker(1, 0);
        let now = Instant::now();
        cb.record_failure(now);

        assert_eq!(cb.try_acquire_probe(now), ProbePermit::Trial);
        cb.abandon_trial();
        assert_eq!(cb.try_acquire_probe(now), ProbePermit::Trial);
    }

    #[test]
    fn test_snapshot_reports_remaining_cooldown() {
        let mut cb = breaker(1, 10);
        let now = Instant::now();
        assert_eq!(cb.snapshot(now).cooldown_remaining_ms, None);

        cb.record_failure(now);
        let snapshot = cb.snapshot(now + Duration::from_secs(4));
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.cooldown_remaining_ms, Some(6000));

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot(now).times_opened, 0);
    }
}
