//! Discrete PID controller driven by a stream of tracking-error samples.
//!
//! The controller does not know about time or set-points: the caller hands it
//! the already-computed error (for steering, the cross-track error) once per
//! control cycle and reads back a corrective output.  Alongside the PID terms
//! it accumulates the squared error of the current *evaluation window* so a
//! [`Tuner`][crate::tuner::Tuner] can score the gains in use.
//!
//! # Example
//!
//! ```rust
//! use steerwise_control::controller::Controller;
//! use steerwise_types::Gains;
//!
//! let mut pid = Controller::new(Gains::new(1.0, 0.0, 0.0));
//! pid.update(2.0);
//! assert!((pid.correction() + 2.0).abs() < 1e-12);
//! ```

use steerwise_types::{ControllerSnapshot, Gains, SteerError};

/// PID state for a single control axis (steering, throttle, ...).
///
/// Gains may be rewritten at any time via [`Controller::configure`]; error
/// state is cleared with [`Controller::reset_errors`] at every evaluation
/// window boundary.
#[derive(Debug, Clone)]
pub struct Controller {
    gains: Gains,
    last_error: f64,
    integral_error: f64,
    derivative_error: f64,
    /// Starts at 1 so the mean squared error is always defined.
    sample_count: u64,
    squared_error_sum: f64,
    integral_limit: Option<f64>,
}

impl Controller {
    /// Create a controller with the given gains and a fresh evaluation window.
    pub fn new(gains: Gains) -> Self {
        Self {
            gains,
            last_error: 0.0,
            integral_error: 0.0,
            derivative_error: 0.0,
            sample_count: 1,
            squared_error_sum: 0.0,
            integral_limit: None,
        }
    }

    /// Clamp the accumulated integral error to `[-limit, limit]`.
    ///
    /// # Errors
    ///
    /// Returns [`SteerError::InvalidConfig`] when `limit` is negative or not
    /// finite.
    pub fn with_integral_limit(mut self, limit: f64) -> Result<Self, SteerError> {
        if !limit.is_finite() || limit < 0.0 {
            return Err(SteerError::InvalidConfig(format!(
                "integral limit must be finite and non-negative, got {limit}"
            )));
        }
        self.integral_limit = Some(limit);
        Ok(self)
    }

    /// Replace the gains.  Error state is left untouched.
    pub fn configure(&mut self, kp: f64, ki: f64, kd: f64) {
        self.gains = Gains { kp, ki, kd };
    }

    /// Return the gains currently in use.
    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Consume one error sample.
    ///
    /// The first sample after a reset seeds the previous error with itself, so
    /// its derivative term is exactly zero.
    pub fn update(&mut self, error: f64) {
        if self.sample_count == 1 {
            self.last_error = error;
        }

        self.derivative_error = error - self.last_error;
        self.last_error = error;
        self.integral_error += error;
        if let Some(limit) = self.integral_limit {
            self.integral_error = self.integral_error.clamp(-limit, limit);
        }

        self.squared_error_sum += error * error;
        self.sample_count += 1;
    }

    /// Corrective output for the current state:
    /// `-(Kp·e + Kd·Δe + Ki·Σe)`.
    pub fn correction(&self) -> f64 {
        -(self.gains.kp * self.last_error
            + self.gains.kd * self.derivative_error
            + self.gains.ki * self.integral_error)
    }

    /// Squared error accumulated in this window divided by the sample count.
    pub fn mean_squared_error(&self) -> f64 {
        self.squared_error_sum / self.sample_count as f64
    }

    /// Start a new evaluation window.  Gains are kept.
    pub fn reset_errors(&mut self) {
        self.last_error = 0.0;
        self.integral_error = 0.0;
        self.derivative_error = 0.0;
        self.squared_error_sum = 0.0;
        self.sample_count = 1;
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    pub fn integral_error(&self) -> f64 {
        self.integral_error
    }

    pub fn derivative_error(&self) -> f64 {
        self.derivative_error
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Copy of every observable field, for logging.
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            gains: self.gains,
            last_error: self.last_error,
            integral_error: self.integral_error,
            derivative_error: self.derivative_error,
            sample_count: self.sample_count,
            squared_error_sum: self.squared_error_sum,
            mean_squared_error: self.mean_squared_error(),
        }
    }
}
