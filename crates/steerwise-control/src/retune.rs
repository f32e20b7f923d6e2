//! [`RetunePolicy`] – decides when an evaluation window is over.
//!
//! Tuning cadence is caller policy, not part of the control law.  The policy
//! looks at how many samples the current window holds and at the latest
//! readings, and tells the caller whether to keep going, close the window
//! normally, or abort a run that has gone unstable.
//!
//! # Example
//!
//! ```rust
//! use steerwise_control::retune::{RetuneDecision, RetunePolicy};
//!
//! let policy = RetunePolicy::default();
//!
//! assert_eq!(policy.evaluate(10, 0.2, 25.0), RetuneDecision::Continue);
//! assert_eq!(policy.evaluate(101, 0.2, 25.0), RetuneDecision::EndWindow);
//! // Far off the track after the grace period: give up on this run.
//! assert_eq!(policy.evaluate(60, 5.0, 25.0), RetuneDecision::Abort);
//! ```

use serde::{Deserialize, Serialize};
use steerwise_types::SteerError;

/// What the caller should do after the latest sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetuneDecision {
    /// Keep accumulating samples in the current window.
    Continue,
    /// The window is complete: tune, then reset the error window.
    EndWindow,
    /// The run became unstable: tune, reset the error window and restart the
    /// controlled system.
    Abort,
}

/// Sample-count and stability thresholds that end an evaluation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetunePolicy {
    /// Samples after which a window ends normally.
    #[serde(default = "default_window_length")]
    pub window_length: u64,

    /// Samples during which instability is tolerated, so a fresh run has time
    /// to settle.
    #[serde(default = "default_grace_samples")]
    pub grace_samples: u64,

    /// Absolute error above which the run counts as unstable.
    #[serde(default = "default_instability_threshold")]
    pub instability_threshold: f64,

    /// Speed below which the run counts as stalled.
    #[serde(default = "default_min_speed")]
    pub min_speed: f64,
}

fn default_window_length() -> u64 {
    100
}
fn default_grace_samples() -> u64 {
    50
}
fn default_instability_threshold() -> f64 {
    4.5
}
fn default_min_speed() -> f64 {
    0.5
}

impl Default for RetunePolicy {
    fn default() -> Self {
        Self {
            window_length: default_window_length(),
            grace_samples: default_grace_samples(),
            instability_threshold: default_instability_threshold(),
            min_speed: default_min_speed(),
        }
    }
}

impl RetunePolicy {
    /// Reject thresholds that would make every sample end a window.
    ///
    /// # Errors
    ///
    /// Returns [`SteerError::InvalidConfig`] on a zero window length or a
    /// negative / non-finite threshold.
    pub fn validate(&self) -> Result<(), SteerError> {
        if self.window_length == 0 {
            return Err(SteerError::InvalidConfig(
                "window_length must be at least 1".to_string(),
            ));
        }
        if !self.instability_threshold.is_finite() || self.instability_threshold < 0.0 {
            return Err(SteerError::InvalidConfig(format!(
                "instability_threshold must be finite and non-negative, got {}",
                self.instability_threshold
            )));
        }
        if self.min_speed.is_nan() {
            return Err(SteerError::InvalidConfig("min_speed must be a number".to_string()));
        }
        Ok(())
    }

    /// Classify the latest sample.
    ///
    /// `sample_count` is the number of samples in the current window,
    /// `error` and `speed` are the latest readings.  Instability is ignored
    /// until `sample_count` exceeds [`grace_samples`][Self::grace_samples].
    pub fn evaluate(&self, sample_count: u64, error: f64, speed: f64) -> RetuneDecision {
        let unstable = error.abs() > self.instability_threshold || speed < self.min_speed;
        if sample_count > self.grace_samples && unstable {
            RetuneDecision::Abort
        } else if sample_count > self.window_length {
            RetuneDecision::EndWindow
        } else {
            RetuneDecision::Continue
        }
    }
}

/// Stateless form of the policy without a grace period: `true` when a window
/// of `window_length` samples is complete, or the latest `error` already
/// exceeds `instability_threshold` in magnitude.
pub fn should_retune(
    window_length: u64,
    sample_count: u64,
    error: f64,
    instability_threshold: f64,
) -> bool {
    sample_count > window_length || error.abs() > instability_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_retune_after_window_fills() {
        assert!(!should_retune(100, 100, 0.0, 4.5));
        assert!(should_retune(100, 101, 0.0, 4.5));
    }

    #[test]
    fn should_retune_on_large_error() {
        assert!(should_retune(100, 3, -4.6, 4.5));
        assert!(!should_retune(100, 3, 4.5, 4.5));
    }

    #[test]
    fn grace_period_suppresses_abort() {
        let policy = RetunePolicy::default();
        assert_eq!(policy.evaluate(50, 0.0, 0.0), RetuneDecision::Continue);
        assert_eq!(policy.evaluate(51, 0.0, 0.0), RetuneDecision::Abort);
    }

    #[test]
    fn large_error_during_grace_is_ignored() {
        let policy = RetunePolicy::default();
        assert_eq!(policy.evaluate(5, 6.0, 20.0), RetuneDecision::Continue);
    }

    #[test]
    fn stalled_vehicle_aborts() {
        let policy = RetunePolicy::default();
        assert_eq!(policy.evaluate(80, 0.1, 0.2), RetuneDecision::Abort);
    }

    #[test]
    fn stable_run_continues_until_window_length() {
        let policy = RetunePolicy {
            window_length: 20,
            ..RetunePolicy::default()
        };
        for n in 1..=20 {
            assert_eq!(policy.evaluate(n, 1.0, 30.0), RetuneDecision::Continue);
        }
        assert_eq!(policy.evaluate(21, 1.0, 30.0), RetuneDecision::EndWindow);
    }

    #[test]
    fn validate_rejects_zero_window() {
        let policy = RetunePolicy {
            window_length: 0,
            ..RetunePolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(RetunePolicy::default().validate().is_ok());
    }
}
