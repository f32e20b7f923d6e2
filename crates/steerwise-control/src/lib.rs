//! `steerwise-control` – the control law and its online tuner.
//!
//! Everything in this crate is synchronous, allocation-light and free of I/O
//! and logging; callers own cadence, transport and observability.
//!
//! # Modules
//!
//! - [`controller`] – [`Controller`][controller::Controller]: a PID
//!   controller fed one tracking-error sample per control cycle.  It also
//!   accumulates the mean squared error of the current evaluation window.
//! - [`tuner`] – [`Tuner`][tuner::Tuner]: coordinate-ascent ("twiddle")
//!   search that perturbs one gain at a time and keeps, reverses or shrinks
//!   the perturbation depending on the observed error.
//! - [`retune`] – [`RetunePolicy`][retune::RetunePolicy]: decides when an
//!   evaluation window ends, either normally or because the run went
//!   unstable.
//!
//! Two controllers share no state, so one per actuation axis can be driven
//! from separate threads without synchronisation.

pub mod controller;
pub mod retune;
pub mod tuner;

pub use controller::Controller;
pub use retune::{RetuneDecision, RetunePolicy, should_retune};
pub use tuner::{AxisConfig, TuneOutcome, TuneStep, Tuner, TunerConfig};
