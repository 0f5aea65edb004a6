//! Delay between consecutive troubled reloads.
//!
//! A watch that breaks right away, or a reload that keeps failing, would otherwise re-arm the
//! watch in a tight loop. The delay for strike `n` is `first × factor^n`, capped at `max`.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReloadBackoff {
    /// Delay after the first strike.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per strike.
    pub factor: f64,
}

impl Default for ReloadBackoff {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl ReloadBackoff {
    /// Delay before arming the next watch after `strikes` troubled reloads in a row.
    pub fn delay(&self, strikes: u32) -> Duration {
        let Some(attempt) = strikes.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
