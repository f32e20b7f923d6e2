//! [`DrivingSession`] – steering and throttle control for one vehicle.
//!
//! A session owns two independent [`Controller`]s:
//!
//! - **steering** is fed the cross-track error and, while the session is in
//!   [`DriveMode::Tuning`], has its gains searched online by a [`Tuner`];
//! - **throttle** is fed the gap between a target speed and the measured
//!   speed, with fixed gains.
//!
//! Each telemetry sample goes through [`DrivingSession::on_telemetry`], which
//! returns the drive command for the vehicle.  The [`RetunePolicy`] decides
//! when a steering evaluation window ends.  When it reports an unstable run
//! the session tunes, drops the command and asks the outer system to restart
//! the vehicle instead.  Once the tuner converges the session switches to
//! [`DriveMode::Cruise`]: gains are frozen and the throttle chases a higher
//! target speed, backing off in proportion to the steering angle.
//!
//! Nothing tuned here outlives the session.

use serde::{Deserialize, Serialize};
use steerwise_control::{Controller, RetuneDecision, RetunePolicy, TuneStep, Tuner, TunerConfig};
use steerwise_types::{
    ControllerSnapshot, DriveCommand, Gains, SteerError, TelemetrySample, TunerSnapshot,
};
use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`DrivingSession`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Initial steering gains; the tuner starts its search from here.
    #[serde(default)]
    pub steering_gains: Gains,

    /// Throttle gains, never tuned.
    #[serde(default = "default_throttle_gains")]
    pub throttle_gains: Gains,

    /// When `false` the steering gains stay fixed and the session starts in
    /// cruise mode.
    #[serde(default = "default_tuning_enabled")]
    pub tuning_enabled: bool,

    #[serde(default)]
    pub tuner: TunerConfig,

    #[serde(default)]
    pub retune: RetunePolicy,

    /// Optional clamp on the steering integral term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integral_limit: Option<f64>,

    /// Steering correction that maps to a full-lock command, in degrees.
    /// The command is `correction / -normalization`, so a positive
    /// proportional gain steers toward positive cross-track error.
    #[serde(default = "default_steering_normalization_deg")]
    pub steering_normalization_deg: f64,

    /// Speed held while the steering gains are being tuned.
    #[serde(default = "default_tuning_target_speed")]
    pub tuning_target_speed: f64,

    /// Speed chased once tuning has converged.
    #[serde(default = "default_cruise_target_speed")]
    pub cruise_target_speed: f64,

    /// Log a tuning report every this many samples; `0` disables reports.
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,
}

fn default_throttle_gains() -> Gains {
    Gains::new(0.2, 0.0, 3.0)
}
fn default_tuning_enabled() -> bool {
    true
}
fn default_steering_normalization_deg() -> f64 {
    25.0
}
fn default_tuning_target_speed() -> f64 {
    30.0
}
fn default_cruise_target_speed() -> f64 {
    50.0
}
fn default_report_interval() -> u64 {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            steering_gains: Gains::default(),
            throttle_gains: default_throttle_gains(),
            tuning_enabled: default_tuning_enabled(),
            tuner: TunerConfig::default(),
            retune: RetunePolicy::default(),
            integral_limit: None,
            steering_normalization_deg: default_steering_normalization_deg(),
            tuning_target_speed: default_tuning_target_speed(),
            cruise_target_speed: default_cruise_target_speed(),
            report_interval: default_report_interval(),
        }
    }
}

impl SessionConfig {
    /// Validate every nested section.
    ///
    /// # Errors
    ///
    /// Returns [`SteerError::InvalidConfig`] for the first invalid field.
    pub fn validate(&self) -> Result<(), SteerError> {
        self.tuner.validate()?;
        self.retune.validate()?;
        let norm = self.steering_normalization_deg;
        if !norm.is_finite() || norm <= 0.0 {
            return Err(SteerError::InvalidConfig(format!(
                "steering_normalization_deg must be positive, got {norm}"
            )));
        }
        for (name, speed) in [
            ("tuning_target_speed", self.tuning_target_speed),
            ("cruise_target_speed", self.cruise_target_speed),
        ] {
            if !speed.is_finite() {
                return Err(SteerError::InvalidConfig(format!(
                    "{name} must be finite, got {speed}"
                )));
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Whether steering gains are still being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    Tuning,
    Cruise,
}

/// Result of feeding one telemetry sample to a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOutput {
    /// Command to send back; `None` when the run was aborted.
    pub command: Option<DriveCommand>,
    /// The vehicle should be put back at its start position.
    pub restart_requested: bool,
    /// Tuning step taken while handling this sample, if any.
    pub tune_step: Option<TuneStep>,
}

/// Everything an operator may want to log about a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub mode: DriveMode,
    pub samples_in_window: u64,
    pub tune_steps: u64,
    pub steering: ControllerSnapshot,
    pub tuner: Option<TunerSnapshot>,
    pub throttle: ControllerSnapshot,
}

// ─────────────────────────────────────────────────────────────────────────────
// DrivingSession
// ─────────────────────────────────────────────────────────────────────────────

/// Steering + throttle control loop for one vehicle.
pub struct DrivingSession {
    id: Uuid,
    span: Span,
    steering: Controller,
    throttle: Controller,
    tuner: Option<Tuner>,
    retune: RetunePolicy,
    mode: DriveMode,
    steering_normalization_rad: f64,
    tuning_target_speed: f64,
    cruise_target_speed: f64,
    report_interval: u64,
    samples_in_window: u64,
    tune_steps: u64,
}

impl DrivingSession {
    /// Build a session from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SteerError::InvalidConfig`] when `config` fails
    /// [`SessionConfig::validate`] or the integral limit is invalid.
    pub fn new(config: SessionConfig) -> Result<Self, SteerError> {
        config.validate()?;

        let mut steering = Controller::new(config.steering_gains);
        if let Some(limit) = config.integral_limit {
            steering = steering.with_integral_limit(limit)?;
        }
        let tuner = if config.tuning_enabled {
            Some(Tuner::new(config.steering_gains, &config.tuner)?)
        } else {
            None
        };
        let mode = match &tuner {
            Some(t) if !t.is_converged() => DriveMode::Tuning,
            _ => DriveMode::Cruise,
        };

        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id);
        span.in_scope(|| {
            info!(
                mode = ?mode,
                steering = %config.steering_gains,
                throttle = %config.throttle_gains,
                "driving session started"
            );
        });

        Ok(Self {
            id,
            span,
            steering,
            throttle: Controller::new(config.throttle_gains),
            tuner,
            retune: config.retune,
            mode,
            steering_normalization_rad: config.steering_normalization_deg.to_radians(),
            tuning_target_speed: config.tuning_target_speed,
            cruise_target_speed: config.cruise_target_speed,
            report_interval: config.report_interval,
            samples_in_window: 0,
            tune_steps: 0,
        })
    }

    /// Feed one telemetry sample and compute the response.
    pub fn on_telemetry(&mut self, sample: &TelemetrySample) -> SessionOutput {
        let span = self.span.clone();
        let _enter = span.enter();

        self.steering.update(sample.cte);
        let steering_angle =
            (self.steering.correction() / -self.steering_normalization_rad).clamp(-1.0, 1.0);
        self.samples_in_window += 1;

        match self.mode {
            DriveMode::Tuning => self.tuning_cycle(sample, steering_angle),
            DriveMode::Cruise => {
                self.throttle.update(self.cruise_target_speed - sample.speed);
                let throttle =
                    -self.throttle.correction() / (1.0 + sample.steering_angle.abs());
                SessionOutput {
                    command: Some(DriveCommand {
                        steering_angle,
                        throttle,
                    }),
                    restart_requested: false,
                    tune_step: None,
                }
            }
        }
    }

    fn tuning_cycle(&mut self, sample: &TelemetrySample, steering_angle: f64) -> SessionOutput {
        self.throttle.update(self.tuning_target_speed - sample.speed);
        let command = DriveCommand {
            steering_angle,
            throttle: -self.throttle.correction(),
        };

        let decision = self
            .retune
            .evaluate(self.samples_in_window, sample.cte, sample.speed);
        let output = match decision {
            RetuneDecision::Abort => {
                warn!(
                    samples = self.samples_in_window,
                    cte = sample.cte,
                    speed = sample.speed,
                    "run unstable; tuning and requesting restart"
                );
                SessionOutput {
                    command: None,
                    restart_requested: true,
                    tune_step: self.tune(),
                }
            }
            RetuneDecision::EndWindow => SessionOutput {
                command: Some(command),
                restart_requested: false,
                tune_step: self.tune(),
            },
            RetuneDecision::Continue => SessionOutput {
                command: Some(command),
                restart_requested: false,
                tune_step: None,
            },
        };

        if decision != RetuneDecision::Abort
            && self.report_interval > 0
            && self.samples_in_window % self.report_interval == 0
        {
            self.report();
        }
        self.refresh_mode();
        output
    }

    /// Run one tuner step on the steering controller and open a new window.
    fn tune(&mut self) -> Option<TuneStep> {
        let tuner = self.tuner.as_mut()?;
        let step = tuner.step(&mut self.steering);
        self.steering.reset_errors();
        self.samples_in_window = 0;
        self.tune_steps += 1;
        debug!(
            observed_error = step.observed_error,
            outcome = ?step.outcome,
            gains = %step.gains,
            best_error = tuner.best_error(),
            "tuning step"
        );
        Some(step)
    }

    fn refresh_mode(&mut self) {
        if self.mode == DriveMode::Tuning
            && self.tuner.as_ref().is_some_and(Tuner::is_converged)
        {
            self.mode = DriveMode::Cruise;
            info!(
                gains = %self.steering.gains(),
                tune_steps = self.tune_steps,
                "steering gains converged; switching to cruise"
            );
        }
    }

    fn report(&self) {
        let steering = self.steering.snapshot();
        let tuner = self.tuner.as_ref().map(|t| t.snapshot(steering.gains));
        info!(steering = ?steering, tuner = ?tuner, "tuning report");
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn steering(&self) -> &Controller {
        &self.steering
    }

    pub fn throttle(&self) -> &Controller {
        &self.throttle
    }

    pub fn tuner(&self) -> Option<&Tuner> {
        self.tuner.as_ref()
    }

    /// Samples seen since the steering window was last reset.
    pub fn samples_in_window(&self) -> u64 {
        self.samples_in_window
    }

    pub fn tune_steps(&self) -> u64 {
        self.tune_steps
    }

    /// Read-only copy of the whole session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let gains = self.steering.gains();
        SessionSnapshot {
            mode: self.mode,
            samples_in_window: self.samples_in_window,
            tune_steps: self.tune_steps,
            steering: self.steering.snapshot(),
            tuner: self.tuner.as_ref().map(|t| t.snapshot(gains)),
            throttle: self.throttle.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cte: f64, speed: f64) -> TelemetrySample {
        TelemetrySample {
            cte,
            speed,
            steering_angle: 0.0,
        }
    }

    #[test]
    fn default_session_starts_tuning() {
        let session = DrivingSession::new(SessionConfig::default()).unwrap();
        assert_eq!(session.mode(), DriveMode::Tuning);
        assert!(session.tuner().is_some());
        assert_eq!(session.samples_in_window(), 0);
    }

    #[test]
    fn throttle_tracks_tuning_speed() {
        let mut session = DrivingSession::new(SessionConfig::default()).unwrap();
        let out = session.on_telemetry(&sample(0.0, 0.0));
        let cmd = out.command.expect("command");
        // Kp 0.2 on a 30-unit speed gap; no derivative on the first sample.
        assert!((cmd.throttle - 6.0).abs() < 1e-9);
        assert_eq!(cmd.steering_angle, 0.0);
        assert!(!out.restart_requested);
    }

    #[test]
    fn steering_is_normalised_and_clamped() {
        let config = SessionConfig {
            steering_gains: Gains::new(1.0, 0.0, 0.0),
            tuning_enabled: false,
            ..SessionConfig::default()
        };
        let mut session = DrivingSession::new(config).unwrap();
        assert_eq!(session.mode(), DriveMode::Cruise);

        let cmd = session.on_telemetry(&sample(0.1, 20.0)).command.unwrap();
        let expected = 0.1 / 25f64.to_radians();
        assert!((cmd.steering_angle - expected).abs() < 1e-9);

        let cmd = session.on_telemetry(&sample(10.0, 20.0)).command.unwrap();
        assert_eq!(cmd.steering_angle, 1.0);

        let cmd = session.on_telemetry(&sample(-10.0, 20.0)).command.unwrap();
        assert_eq!(cmd.steering_angle, -1.0);
    }

    #[test]
    fn steering_sign_follows_proportional_gain() {
        let config = SessionConfig {
            steering_gains: Gains::new(0.0933784, 0.0, 1.64645),
            tuning_enabled: false,
            ..SessionConfig::default()
        };
        let mut session = DrivingSession::new(config).unwrap();

        let cmd = session.on_telemetry(&sample(0.5, 20.0)).command.unwrap();
        let expected = 0.0933784 * 0.5 / 25f64.to_radians();
        assert!(cmd.steering_angle > 0.0);
        assert!((cmd.steering_angle - expected).abs() < 1e-9);
    }

    #[test]
    fn unstable_run_aborts_after_grace_period() {
        let mut session = DrivingSession::new(SessionConfig::default()).unwrap();
        for _ in 0..50 {
            let out = session.on_telemetry(&sample(5.0, 20.0));
            assert!(out.command.is_some());
            assert!(out.tune_step.is_none());
        }

        let out = session.on_telemetry(&sample(5.0, 20.0));
        assert!(out.restart_requested);
        assert!(out.command.is_none());
        assert!(out.tune_step.is_some());
        assert_eq!(session.samples_in_window(), 0);
        assert_eq!(session.steering().sample_count(), 1);
        assert!(session.tuner().unwrap().best_error().is_finite());
    }

    #[test]
    fn window_end_tunes_and_keeps_driving() {
        let mut session = DrivingSession::new(SessionConfig::default()).unwrap();
        for _ in 0..100 {
            assert!(session.on_telemetry(&sample(0.5, 30.0)).tune_step.is_none());
        }

        let out = session.on_telemetry(&sample(0.5, 30.0));
        assert!(out.command.is_some());
        assert!(!out.restart_requested);
        let step = out.tune_step.expect("window end must tune");
        assert_eq!(step.gains, session.steering().gains());
        assert_eq!(session.tune_steps(), 1);
        assert_eq!(session.samples_in_window(), 0);
    }

    #[test]
    fn converged_tuner_switches_to_cruise() {
        let mut config = SessionConfig::default();
        // Summed default perturbations are 0.1.
        config.tuner.tolerance = 1.0;
        let mut session = DrivingSession::new(config).unwrap();
        assert_eq!(session.mode(), DriveMode::Cruise);

        let out = session.on_telemetry(&TelemetrySample {
            cte: 0.0,
            speed: 0.0,
            steering_angle: 1.0,
        });
        // Kp 0.2 on a 50-unit gap, halved by the steering angle.
        assert!((out.command.unwrap().throttle - 5.0).abs() < 1e-9);
    }

    #[test]
    fn tuning_run_converges_into_cruise() {
        let mut config = SessionConfig::default();
        // Just below the starting perturbation sum of 0.1.
        config.tuner.tolerance = 0.095;
        config.retune.window_length = 2;
        let mut session = DrivingSession::new(config).unwrap();
        assert_eq!(session.mode(), DriveMode::Tuning);

        let mut samples = 0;
        while session.mode() == DriveMode::Tuning {
            assert!(samples < 100, "tuner never converged");
            let out = session.on_telemetry(&sample(0.5, 30.0));
            assert!(!out.restart_requested);
            samples += 1;
        }
        assert_eq!(samples, 15);
        assert_eq!(session.tune_steps(), 5);
        assert!(session.tuner().unwrap().is_converged());

        let mut throttle = session.throttle().clone();
        throttle.update(50.0);
        let expected = -throttle.correction() / 2.0;

        let out = session.on_telemetry(&TelemetrySample {
            cte: 0.5,
            speed: 0.0,
            steering_angle: 1.0,
        });
        assert!(out.tune_step.is_none());
        assert!((out.command.unwrap().throttle - expected).abs() < 1e-9);
        assert_eq!(session.mode(), DriveMode::Cruise);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn report_logs_steering_and_tuner_snapshots() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let config = SessionConfig {
            report_interval: 2,
            ..SessionConfig::default()
        };
        tracing::subscriber::with_default(subscriber, || {
            let mut session = DrivingSession::new(config).unwrap();
            session.on_telemetry(&sample(0.5, 30.0));
            session.on_telemetry(&sample(0.5, 30.0));
        });

        let raw = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let report = raw
            .lines()
            .find(|l| l.contains("tuning report"))
            .expect("report line");
        assert!(report.contains("steering=ControllerSnapshot"));
        assert!(report.contains("tuner=Some(TunerSnapshot"));
        assert!(report.contains("perturbations"));
    }

    #[test]
    fn fixed_gains_never_tune() {
        let config = SessionConfig {
            tuning_enabled: false,
            ..SessionConfig::default()
        };
        let mut session = DrivingSession::new(config).unwrap();
        for _ in 0..300 {
            let out = session.on_telemetry(&sample(6.0, 0.0));
            assert!(out.tune_step.is_none());
            assert!(!out.restart_requested);
        }
        assert_eq!(session.tune_steps(), 0);
        assert!(session.snapshot().tuner.is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SessionConfig::default();
        config.steering_normalization_deg = 0.0;
        assert!(DrivingSession::new(config).is_err());

        let mut config = SessionConfig::default();
        config.integral_limit = Some(-1.0);
        assert!(DrivingSession::new(config).is_err());
    }

    #[test]
    fn config_sections_default_from_partial_toml() {
        let raw = r#"
            tuning_target_speed = 25.0

            [steering_gains]
            kp = 0.1
            ki = 0.0
            kd = 2.0

            [retune]
            window_length = 200
        "#;
        let config: SessionConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.steering_gains, Gains::new(0.1, 0.0, 2.0));
        assert_eq!(config.throttle_gains, Gains::new(0.2, 0.0, 3.0));
        assert_eq!(config.retune.window_length, 200);
        assert_eq!(config.retune.grace_samples, 50);
        assert_eq!(config.tuning_target_speed, 25.0);
        assert!(config.tuning_enabled);
    }

    #[test]
    fn snapshot_tracks_window() {
        let mut session = DrivingSession::new(SessionConfig::default()).unwrap();
        session.on_telemetry(&sample(1.0, 30.0));
        session.on_telemetry(&sample(2.0, 30.0));
        let snap = session.snapshot();
        assert_eq!(snap.mode, DriveMode::Tuning);
        assert_eq!(snap.samples_in_window, 2);
        assert_eq!(snap.steering.sample_count, 3);
        assert!(snap.tuner.is_some());
    }
}
