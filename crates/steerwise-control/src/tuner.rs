//! [`Tuner`] – online coordinate-ascent ("twiddle") search over PID gains.
//!
//! The tuner never sees a gradient.  After each evaluation window it reads the
//! controller's mean squared error and compares it with the best error seen
//! so far:
//!
//! 1. **Improved** – keep the current trial, grow that axis's step by
//!    `growth`, move to the next tuned axis and try `+step` on it.
//! 2. **Not improved, first miss** – undo `+step` and try `-step` on the same
//!    axis.
//! 3. **Not improved, second miss** – restore the axis to its baseline,
//!    shrink its step by `shrink`, move on and try `+step` on the next axis.
//!
//! Only the axes listed in [`TunerConfig::axes`] are ever changed; the rest
//! keep whatever the caller configured on the controller.  Search stops being
//! useful once the summed step sizes fall below [`TunerConfig::tolerance`]
//! (see [`Tuner::is_converged`]); the tuner does not stop by itself.
//!
//! # Example
//!
//! ```rust
//! use steerwise_control::controller::Controller;
//! use steerwise_control::tuner::{TuneOutcome, Tuner, TunerConfig};
//! use steerwise_types::{GainAxis, Gains};
//!
//! let mut pid = Controller::new(Gains::default());
//! let mut tuner = Tuner::new(pid.gains(), &TunerConfig::default()).unwrap();
//!
//! pid.update(1.5);
//! let step = tuner.step(&mut pid);
//! pid.reset_errors();
//!
//! // The first observation always beats the initial +∞ best error.
//! assert!(matches!(step.outcome, TuneOutcome::Improved { .. }));
//! assert_eq!(tuner.active_axis(), GainAxis::Derivative);
//! ```

use serde::{Deserialize, Serialize};
use steerwise_types::{AxisPerturbation, GainAxis, Gains, SteerError, TunerSnapshot};

use crate::controller::Controller;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A tuned axis and its initial step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    pub axis: GainAxis,
    pub perturbation: f64,
}

/// Search parameters for a [`Tuner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunerConfig {
    /// Axes visited by the search, in visiting order.
    #[serde(default = "default_axes")]
    pub axes: Vec<AxisConfig>,

    /// Summed step size below which the search counts as converged.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Step multiplier applied after an improvement (> 1).
    #[serde(default = "default_growth")]
    pub growth: f64,

    /// Step multiplier applied after both directions missed (in `(0, 1)`).
    #[serde(default = "default_shrink")]
    pub shrink: f64,
}

fn default_axes() -> Vec<AxisConfig> {
    vec![
        AxisConfig {
            axis: GainAxis::Proportional,
            perturbation: 0.05,
        },
        AxisConfig {
            axis: GainAxis::Derivative,
            perturbation: 0.05,
        },
    ]
}
fn default_tolerance() -> f64 {
    1.0e-2
}
fn default_growth() -> f64 {
    1.1
}
fn default_shrink() -> f64 {
    0.9
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            axes: default_axes(),
            tolerance: default_tolerance(),
            growth: default_growth(),
            shrink: default_shrink(),
        }
    }
}

impl TunerConfig {
    /// Check the parameters for values the search cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`SteerError::InvalidConfig`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<(), SteerError> {
        if self.axes.is_empty() {
            return Err(invalid("at least one axis must be tuned".to_string()));
        }
        for (i, a) in self.axes.iter().enumerate() {
            if self.axes[..i].iter().any(|b| b.axis == a.axis) {
                return Err(invalid(format!("axis {} is listed more than once", a.axis)));
            }
            if !a.perturbation.is_finite() || a.perturbation < 0.0 {
                return Err(invalid(format!(
                    "perturbation for {} must be finite and non-negative, got {}",
                    a.axis, a.perturbation
                )));
            }
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(invalid(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if !self.growth.is_finite() || self.growth <= 1.0 {
            return Err(invalid(format!("growth must be > 1, got {}", self.growth)));
        }
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(invalid(format!("shrink must be in (0, 1), got {}", self.shrink)));
        }
        Ok(())
    }
}

fn invalid(details: String) -> SteerError {
    SteerError::InvalidConfig(details)
}

// ─────────────────────────────────────────────────────────────────────────────
// Step results
// ─────────────────────────────────────────────────────────────────────────────

/// What a single [`Tuner::step`] decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneOutcome {
    /// The trial on `axis` beat the best error; `next` now carries `+step`.
    Improved { axis: GainAxis, next: GainAxis },
    /// The `+step` trial on `axis` missed; `-step` is now being tried.
    Reversed { axis: GainAxis },
    /// Both directions on `axis` missed; its step shrank and `next` now
    /// carries `+step`.
    Shrunk { axis: GainAxis, next: GainAxis },
}

/// Report of one tuning step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuneStep {
    /// Mean squared error observed for the window that just ended.
    pub observed_error: f64,
    pub outcome: TuneOutcome,
    /// Gains written into the controller for the next window.
    pub gains: Gains,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tuner
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// `+step` is applied (or about to be judged).
    Increase,
    /// `-step` is applied after `+step` missed.
    Decrease,
}

#[derive(Debug, Clone)]
struct AxisState {
    axis: GainAxis,
    gain: f64,
    perturbation: f64,
    phase: Phase,
}

/// Coordinate-ascent gain search bound to one [`Controller`].
#[derive(Debug, Clone)]
pub struct Tuner {
    axes: Vec<AxisState>,
    active: usize,
    best_error: f64,
    tolerance: f64,
    growth: f64,
    shrink: f64,
}

impl Tuner {
    /// Create a tuner starting from `initial` gains.
    ///
    /// # Errors
    ///
    /// Returns [`SteerError::InvalidConfig`] when `config` fails
    /// [`TunerConfig::validate`].
    pub fn new(initial: Gains, config: &TunerConfig) -> Result<Self, SteerError> {
        config.validate()?;
        let axes = config
            .axes
            .iter()
            .map(|a| AxisState {
                axis: a.axis,
                gain: initial.get(a.axis),
                perturbation: a.perturbation,
                phase: Phase::Increase,
            })
            .collect();
        Ok(Self {
            axes,
            active: 0,
            best_error: f64::INFINITY,
            tolerance: config.tolerance,
            growth: config.growth,
            shrink: config.shrink,
        })
    }

    /// Score the window that just ended on `controller`, move the search one
    /// transition forward and write the resulting gains back.
    ///
    /// The controller's error window is not reset here; callers follow up
    /// with [`Controller::reset_errors`].
    pub fn step(&mut self, controller: &mut Controller) -> TuneStep {
        let observed_error = controller.mean_squared_error();
        let axis = self.axes[self.active].axis;

        let outcome = if observed_error < self.best_error {
            self.best_error = observed_error;
            self.axes[self.active].perturbation *= self.growth;
            let next = self.advance();
            TuneOutcome::Improved { axis, next }
        } else if self.axes[self.active].phase == Phase::Increase {
            self.nudge(-2.0);
            self.axes[self.active].phase = Phase::Decrease;
            TuneOutcome::Reversed { axis }
        } else {
            self.nudge(1.0);
            self.axes[self.active].perturbation *= self.shrink;
            let next = self.advance();
            TuneOutcome::Shrunk { axis, next }
        };

        let gains = self.gains(controller.gains());
        controller.configure(gains.kp, gains.ki, gains.kd);

        TuneStep {
            observed_error,
            outcome,
            gains,
        }
    }

    /// `true` once the summed step sizes dropped below the tolerance.
    pub fn is_converged(&self) -> bool {
        self.perturbation_sum() < self.tolerance
    }

    /// Sum of the step sizes of all tuned axes.
    pub fn perturbation_sum(&self) -> f64 {
        self.axes.iter().map(|a| a.perturbation).sum()
    }

    /// Lowest mean squared error seen so far, `+∞` before the first step.
    pub fn best_error(&self) -> f64 {
        self.best_error
    }

    /// Step size for `axis`, or `None` when the axis is not tuned.
    pub fn perturbation(&self, axis: GainAxis) -> Option<f64> {
        self.axes.iter().find(|a| a.axis == axis).map(|a| a.perturbation)
    }

    /// Axis that the next step will judge.
    pub fn active_axis(&self) -> GainAxis {
        self.axes[self.active].axis
    }

    /// `true` while the active axis is trying its negative direction.
    pub fn awaiting_reversal(&self) -> bool {
        self.axes[self.active].phase == Phase::Decrease
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Trial gains for the tuned axes on top of `base` for the others.
    pub fn gains(&self, base: Gains) -> Gains {
        let mut gains = base;
        for a in &self.axes {
            *gains.get_mut(a.axis) = a.gain;
        }
        gains
    }

    /// Copy of the search state, for logging.  Untuned gains are taken from
    /// `base`.
    pub fn snapshot(&self, base: Gains) -> TunerSnapshot {
        TunerSnapshot {
            gains: self.gains(base),
            best_error: self.best_error.is_finite().then_some(self.best_error),
            perturbations: self
                .axes
                .iter()
                .map(|a| AxisPerturbation {
                    axis: a.axis,
                    perturbation: a.perturbation,
                })
                .collect(),
            active_axis: self.active_axis(),
            awaiting_reversal: self.awaiting_reversal(),
            converged: self.is_converged(),
        }
    }

    /// Add `factor × step` to the active axis's gain.
    fn nudge(&mut self, factor: f64) {
        let a = &mut self.axes[self.active];
        a.gain += factor * a.perturbation;
    }

    /// Move to the next tuned axis (wrapping) and apply `+step` to it.
    fn advance(&mut self) -> GainAxis {
        self.axes[self.active].phase = Phase::Increase;
        self.active = (self.active + 1) % self.axes.len();
        self.axes[self.active].phase = Phase::Increase;
        self.nudge(1.0);
        self.axes[self.active].axis
    }
}
