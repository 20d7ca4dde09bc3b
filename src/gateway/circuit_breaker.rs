//! Per-service circuit breakers owned by the gateway
//!
//! The half-open transition is evaluated lazily when a request arrives, so
//! there are no timers: the effective state is a pure function of the stored
//! entry and the current instant.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{GatewayError, Result};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Source of the current instant, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Stored breaker bookkeeping for one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerEntry {
    pub failure_count: u32,
    pub state: CircuitState,
    pub last_failure_at: Option<Instant>,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            failure_count: 0,
            state: CircuitState::Closed,
            last_failure_at: None,
        }
    }
}

/// Effective state of `entry` at `now`: an open circuit whose cooldown has
/// elapsed reads as half-open
pub fn evaluate(entry: &BreakerEntry, now: Instant, cooldown: Duration) -> CircuitState {
    match entry.state {
        CircuitState::Open => match entry.last_failure_at {
            Some(at) if now.saturating_duration_since(at) < cooldown => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        },
        state => state,
    }
}

/// Observability view of one breaker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Table of breakers keyed by service name
pub struct CircuitBreakerTable {
    entries: DashMap<String, BreakerEntry>,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerTable {
    /// Create a table using the wall clock
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            failure_threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            clock,
        }
    }

    /// Admit or reject a request for `service`.
    ///
    /// An open circuit past its cooldown admits the request as a trial and is
    /// moved to half-open.
    pub fn check(&self, service: &str) -> Result<()> {
        let now = self.clock.now();
        let Some(mut entry) = self.entries.get_mut(service) else {
            return Ok(());
        };

        match evaluate(&entry, now, self.cooldown) {
            CircuitState::Open => {
                let elapsed = entry
                    .last_failure_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or_default();
                debug!(service = %service, "Circuit open, short-circuiting request");
                Err(GatewayError::CircuitOpen {
                    service: service.to_string(),
                    retry_after: self.cooldown.saturating_sub(elapsed),
                })
            }
            CircuitState::HalfOpen => {
                if entry.state == CircuitState::Open {
                    info!(service = %service, "Circuit half-open, allowing trial request");
                    entry.state = CircuitState::HalfOpen;
                }
                Ok(())
            }
            CircuitState::Closed => Ok(()),
        }
    }

    /// A forwarded call succeeded: close the circuit and reset the counter
    pub fn record_success(&self, service: &str) {
        if let Some(mut entry) = self.entries.get_mut(service) {
            if entry.state != CircuitState::Closed {
                info!(service = %service, "Circuit closed after successful call");
            }
            *entry = BreakerEntry::default();
        }
    }

    /// A forwarded call failed: count it and open the circuit when due
    pub fn record_failure(&self, service: &str) {
        let now = self.clock.now();
        let mut entry = self.entries.entry(service.to_string()).or_default();

        entry.failure_count = entry.failure_count.saturating_add(1);
        entry.last_failure_at = Some(now);

        match entry.state {
            CircuitState::HalfOpen | CircuitState::Open => {
                entry.failure_count = entry.failure_count.max(self.failure_threshold);
                entry.state = CircuitState::Open;
                warn!(service = %service, "Trial request failed, circuit re-opened");
            }
            CircuitState::Closed if entry.failure_count >= self.failure_threshold => {
                entry.state = CircuitState::Open;
                warn!(
                    service = %service,
                    failures = entry.failure_count,
                    cooldown_secs = self.cooldown.as_secs(),
                    "Circuit opened after consecutive failures"
                );
            }
            CircuitState::Closed => {
                debug!(service = %service, failures = entry.failure_count, "Recorded failure");
            }
        }
    }

    /// Stored entry for `service`, if any call has been recorded
    pub fn entry(&self, service: &str) -> Option<BreakerEntry> {
        self.entries.get(service).map(|e| *e)
    }

    /// Effective state for `service` right now
    pub fn state(&self, service: &str) -> CircuitState {
        self.entry(service)
            .map(|e| evaluate(&e, self.clock.now(), self.cooldown))
            .unwrap_or(CircuitState::Closed)
    }

    pub fn snapshot(&self) -> BTreeMap<String, BreakerSnapshot> {
        let now = self.clock.now();
        self.entries
            .iter()
            .map(|item| {
                let entry = item.value();
                let state = evaluate(entry, now, self.cooldown);
                let retry_after_secs = (state == CircuitState::Open).then(|| {
                    let elapsed = entry
                        .last_failure_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or_default();
                    self.cooldown.saturating_sub(elapsed).as_secs()
                });
                (
                    item.key().clone(),
                    BreakerSnapshot {
                        state,
                        failure_count: entry.failure_count,
                        retry_after_secs,
                    },
                )
            })
            .collect()
    }
}
