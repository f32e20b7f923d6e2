//! Line-oriented JSON bridge between a vehicle and a [`DrivingSession`].
//!
//! Every input line is one [`TelemetrySample`], e.g.
//! `{"cte": 0.76, "speed": 28.1, "steering_angle": -2.5}`.  Every accepted
//! sample produces exactly one output line:
//!
//! - `{"event":"steer","steering_angle":…,"throttle":…}` – drive command;
//! - `{"event":"reset"}` – the run went unstable, put the vehicle back at
//!   its start position.
//!
//! Blank lines are ignored; lines that do not decode are logged and skipped.
//!
//! Input is read on its own thread ([`spawn_reader`]) so the shutdown flag
//! is honoured even while the vehicle is silent.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use steerwise_runtime::DrivingSession;
use steerwise_types::{DriveCommand, SteerError, TelemetrySample};

/// One output line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Reply {
    Steer(DriveCommand),
    Reset,
}

/// Counters for a finished run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriveStats {
    pub samples: u64,
    pub skipped: u64,
    pub restarts: u64,
}

/// How often an idle [`drive`] loop re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Read `input` line by line on a background thread.
///
/// The channel closes at end of input or after the first read error, which
/// is forwarded.
pub fn spawn_reader<R: BufRead + Send + 'static>(input: R) -> Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in input.lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

/// Pump lines from `lines` through `session` and write replies to `output`
/// until the channel closes or `shutdown` is set.  A line already received
/// is always answered before the flag is checked.
///
/// # Errors
///
/// Returns [`SteerError::Io`] when reading or writing fails.
pub fn drive<W: Write>(
    session: &mut DrivingSession,
    lines: &Receiver<io::Result<String>>,
    mut output: W,
    shutdown: &AtomicBool,
) -> Result<DriveStats, SteerError> {
    let mut stats = DriveStats::default();
    let mut line_no = 0;

    while !shutdown.load(Ordering::SeqCst) {
        let line = match lines.recv_timeout(SHUTDOWN_POLL) {
            Ok(line) => line.map_err(|e| SteerError::Io(e.to_string()))?,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let sample = match decode(line_no, &line) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "skipping telemetry line");
                stats.skipped += 1;
                continue;
            }
        };
        stats.samples += 1;

        let out = session.on_telemetry(&sample);
        let reply = match out.command {
            Some(cmd) if !out.restart_requested => Reply::Steer(cmd),
            _ => {
                stats.restarts += 1;
                Reply::Reset
            }
        };

        let encoded = serde_json::to_string(&reply)
            .map_err(|e| SteerError::Io(format!("failed to encode reply: {e}")))?;
        writeln!(output, "{encoded}").map_err(|e| SteerError::Io(e.to_string()))?;
        output.flush().map_err(|e| SteerError::Io(e.to_string()))?;
    }

    Ok(stats)
}

fn decode(line: usize, raw: &str) -> Result<TelemetrySample, SteerError> {
    serde_json::from_str(raw).map_err(|e| SteerError::Decode {
        line,
        details: e.to_string(),
    })
}
