use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::utils::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls go through
    Closed,
    /// Calls fail fast until `open_for` has elapsed since the last failure
    Open,
    /// Probing: calls go through, enough successes close the circuit again
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,
    /// Cool-down before the first probe
    pub open_for: Duration,
    /// Consecutive half-open successes that close it
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_for: Duration::from_secs(60),
            success_threshold: 3,
        }
    }
}

/// Guards the translation API. While open, requests are refused without
/// touching the network and callers keep the untranslated label.
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
    metrics: Option<Metrics>,
}

struct BreakerState {
    circuit: CircuitState,
    failures: usize,
    probe_successes: usize,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, metrics: Option<Metrics>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState {
                circuit: CircuitState::Closed,
                failures: 0,
                probe_successes: 0,
                opened_at: None,
            })),
            config,
            metrics,
        }
    }

    /// Returns false while the circuit is open. An open circuit whose
    /// cool-down has passed moves to half-open and lets the call through.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match state.circuit {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_for)
                    .unwrap_or(true);
                if cooled {
                    state.circuit = CircuitState::HalfOpen;
                    state.probe_successes = 0;
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.failures = 0;
        if state.circuit != CircuitState::Closed {
            state.probe_successes += 1;
            if state.probe_successes >= self.config.success_threshold {
                state.circuit = CircuitState::Closed;
                state.probe_successes = 0;
                state.opened_at = None;
            }
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failures += 1;
        state.probe_successes = 0;

        let trips = match state.circuit {
            CircuitState::Closed => state.failures >= self.config.failure_threshold,
            // A failed probe reopens immediately
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if trips {
            state.circuit = CircuitState::Open;
            state.opened_at = Some(Instant::now());
            if let Some(ref m) = self.metrics {
                m.record_circuit_breaker_trip();
            }
        } else if state.circuit == CircuitState::Open {
            state.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().circuit
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), None)
    }
}
