//! `steerwise-runtime` – the driving loop around the control core.
//!
//! # Modules
//!
//! - [`session`] – [`DrivingSession`][session::DrivingSession]: pairs a
//!   tuned steering controller with a fixed-gain throttle controller, applies
//!   the retune policy to every telemetry sample and maps corrections onto
//!   actuator ranges.  Operator reports are logged through `tracing`.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod session;
pub mod telemetry;

pub use session::{DriveMode, DrivingSession, SessionConfig, SessionOutput, SessionSnapshot};
pub use telemetry::{TracerProviderGuard, init_tracing};
