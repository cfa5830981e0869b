//! Per-adapter connection-health state machine
//!
//! Every source and sink owns exactly one [`HealthTracker`]. Transitions are
//! driven only by connect attempts and operation outcomes of the owning
//! adapter; other components see the state through read-only snapshots.

use std::time::{Duration, Instant};

/// Reachability of an adapter's external transport
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionHealth {
    /// No connection; a reconnect is attempted at the next retry window
    Disconnected,
    /// A connect attempt is in flight
    Connecting,
    /// The transport is usable
    Connected,
    /// Operations are failing; reconnects are attempted until the retry
    /// ceiling is reached
    Degraded {
        /// Description of the most recent failure
        error: String,
        /// Consecutive failed attempts since the last successful operation
        retry_count: u32,
    },
}

impl ConnectionHealth {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionHealth::Connected)
    }

    /// Consecutive failure count (zero unless degraded)
    pub fn retry_count(&self) -> u32 {
        match self {
            ConnectionHealth::Degraded { retry_count, .. } => *retry_count,
            _ => 0,
        }
    }
}

/// Retry ceiling and delay for one adapter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before falling back to `Disconnected`
    pub max_retries: u32,
    /// Delay between reconnect attempts, and the width of the retry window
    /// once disconnected
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }
}

/// Owns the [`ConnectionHealth`] of one adapter and applies its retry policy
///
/// The tracker never terminates retries permanently: once the ceiling is
/// reached the state drops to `Disconnected` and reconnects resume at each
/// subsequent retry window.
#[derive(Debug)]
pub struct HealthTracker {
    state: ConnectionHealth,
    policy: RetryPolicy,
    last_attempt: Option<Instant>,
    /// Failures since the last success; survives the `Connecting` state so a
    /// failed reconnect continues the count instead of restarting it
    consecutive_failures: u32,
}

impl HealthTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionHealth::Disconnected,
            policy,
            last_attempt: None,
            consecutive_failures: 0,
        }
    }

    /// Read-only snapshot of the current state
    pub fn state(&self) -> ConnectionHealth {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// A connect attempt is starting
    pub fn on_connecting(&mut self) {
        self.last_attempt = Some(Instant::now());
        self.state = ConnectionHealth::Connecting;
    }

    /// A connect attempt or operation succeeded
    pub fn on_connected(&mut self) {
        self.consecutive_failures = 0;
        self.state = ConnectionHealth::Connected;
    }

    /// A connect attempt or operation failed
    ///
    /// Moves to `Degraded` with an incremented count, or to `Disconnected`
    /// once the count passes the retry ceiling.
    pub fn on_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(Instant::now());

        if self.consecutive_failures > self.policy.max_retries {
            self.state = ConnectionHealth::Disconnected;
        } else {
            self.state = ConnectionHealth::Degraded {
                error: error.into(),
                retry_count: self.consecutive_failures,
            };
        }
    }

    /// The adapter was closed deliberately
    pub fn on_closed(&mut self) {
        self.consecutive_failures = 0;
        self.state = ConnectionHealth::Disconnected;
    }

    /// Whether a reconnect attempt is due at `now`
    ///
    /// `Connected` never reconnects; `Degraded` and `Disconnected` reconnect
    /// once `retry_delay` has elapsed since the last attempt.
    pub fn reconnect_due(&self, now: Instant) -> bool {
        match self.state {
            ConnectionHealth::Connected | ConnectionHealth::Connecting => false,
            ConnectionHealth::Degraded { .. } | ConnectionHealth::Disconnected => self
                .last_attempt
                .map(|at| now.duration_since(at) >= self.policy.retry_delay)
                .unwrap_or(true),
        }
    }
}
