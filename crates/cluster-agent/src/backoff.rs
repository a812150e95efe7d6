//! Reconnect backoff for the gateway connection.

use std::time::Duration;

use ifox_domain::config::ReconnectConfig;

/// Exponential backoff: `initial × multiplier^attempt`, capped at
/// `max`. The attempt counter resets on every successful connection,
/// so a healthy agent always reconnects quickly. A running agent never
/// gives up — shutdown is signal-driven.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(cfg: &ReconnectConfig) -> Self {
        Self {
            initial: Duration::from_secs(cfg.initial_delay_seconds),
            multiplier: cfg.multiplier,
            max: Duration::from_secs(cfg.max_delay_seconds),
            attempt: 0,
        }
    }

    /// Delay before the next reconnect; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let factor = self.multiplier.powi(self.attempt as i32);
        let delay_ms = (self.initial.as_millis() as f64 * factor)
            .min(self.max.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(delay_ms as u64)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
