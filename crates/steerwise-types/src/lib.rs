use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the three gains of a PID control law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainAxis {
    /// Kp, multiplies the latest error sample.
    Proportional,
    /// Ki, multiplies the accumulated error.
    Integral,
    /// Kd, multiplies the sample-to-sample error delta.
    Derivative,
}

impl GainAxis {
    /// All axes in `(Kp, Ki, Kd)` order.
    pub const ALL: [GainAxis; 3] = [
        GainAxis::Proportional,
        GainAxis::Integral,
        GainAxis::Derivative,
    ];
}

impl std::fmt::Display for GainAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GainAxis::Proportional => write!(f, "kp"),
            GainAxis::Integral => write!(f, "ki"),
            GainAxis::Derivative => write!(f, "kd"),
        }
    }
}

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Gains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }

    /// Read the gain on `axis`.
    pub fn get(&self, axis: GainAxis) -> f64 {
        match axis {
            GainAxis::Proportional => self.kp,
            GainAxis::Integral => self.ki,
            GainAxis::Derivative => self.kd,
        }
    }

    /// Mutable access to the gain on `axis`.
    pub fn get_mut(&mut self, axis: GainAxis) -> &mut f64 {
        match axis {
            GainAxis::Proportional => &mut self.kp,
            GainAxis::Integral => &mut self.ki,
            GainAxis::Derivative => &mut self.kd,
        }
    }
}

impl std::fmt::Display for Gains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / {}", self.kp, self.ki, self.kd)
    }
}

/// Read-only view of a controller's error state, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    pub gains: Gains,
    pub last_error: f64,
    pub integral_error: f64,
    pub derivative_error: f64,
    pub sample_count: u64,
    pub squared_error_sum: f64,
    pub mean_squared_error: f64,
}

/// Step size of one tuned axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisPerturbation {
    pub axis: GainAxis,
    pub perturbation: f64,
}

/// Read-only view of a tuner's search state, for logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TunerSnapshot {
    pub gains: Gains,
    /// Lowest mean squared error seen so far; `None` before the first step.
    pub best_error: Option<f64>,
    pub perturbations: Vec<AxisPerturbation>,
    pub active_axis: GainAxis,
    pub awaiting_reversal: bool,
    pub converged: bool,
}

/// One telemetry reading delivered by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Cross-track error.
    pub cte: f64,
    /// Current speed in the vehicle's own units.
    pub speed: f64,
    /// Current steering angle in degrees.
    #[serde(default)]
    pub steering_angle: f64,
}

/// Actuation returned to the vehicle for one telemetry reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveCommand {
    /// Steering demand in `[-1, 1]`.
    pub steering_angle: f64,
    /// Signed throttle adjustment.
    pub throttle: f64,
}

/// Errors raised while building or feeding a steering pipeline.
///
/// The control laws themselves are total; only construction-time validation
/// and the I/O surrounding them can fail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SteerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error in {path}: {details}")]
    Config { path: String, details: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Cannot decode line {line}: {details}")]
    Decode { line: usize, details: String },
}
