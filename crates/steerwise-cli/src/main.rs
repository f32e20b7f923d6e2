//! `steerwise` – command-line driver for the steering controller.
//!
//! The binary:
//!
//! 1. Loads `~/.steerwise/config.toml` (or `--config <path>`), falling back to
//!    built-in defaults, then applies `STEERWISE_*` environment overrides.
//! 2. Initialises structured logging on stderr.
//! 3. Reads telemetry samples as JSON lines on stdin and answers each with a
//!    drive command (or a reset request) on stdout.
//! 4. Intercepts **Ctrl-C** to stop after the current sample and log the final
//!    tuning state.

mod config;
mod stdio;

use clap::Parser;
use colored::Colorize;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use steerwise_runtime::DrivingSession;

/// Drive a steering controller from telemetry JSON lines on stdin.
///
/// Each sample is answered with a drive command (or a reset request) on
/// stdout.  Logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "steerwise", version)]
struct Args {
    /// Read configuration from this file instead of ~/.steerwise/config.toml.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let cfg = match config::resolve(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.print_config {
        return match config::to_toml(&cfg) {
            Ok(raw) => {
                print!("{raw}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Config error".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    // ── Structured logging ────────────────────────────────────────────────
    let _guard = steerwise_runtime::init_tracing(&cfg.service_name);

    let mut session = match DrivingSession::new(cfg.session) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    eprintln!(
        "  {} {}  session {}",
        "steerwise".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed(),
        session.id().to_string().dimmed()
    );

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if shutdown_flag.swap(true, Ordering::SeqCst) {
            // Second interrupt exits at once.
            std::process::exit(130);
        }
        eprintln!("{}", "Ctrl-C received – stopping after the current sample".yellow());
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will terminate immediately");
    }

    let lines = stdio::spawn_reader(BufReader::new(std::io::stdin()));
    let stdout = std::io::stdout();
    let result = stdio::drive(&mut session, &lines, stdout.lock(), &shutdown);

    let snapshot = session.snapshot();
    info!(
        mode = ?snapshot.mode,
        tune_steps = snapshot.tune_steps,
        gains = %snapshot.steering.gains,
        tuner = ?snapshot.tuner,
        "session finished"
    );

    match result {
        Ok(stats) => {
            eprintln!(
                "  {} {} samples, {} skipped, {} restarts; final gains {}",
                "✓".green().bold(),
                stats.samples,
                stats.skipped,
                stats.restarts,
                snapshot.steering.gains
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "I/O error".red(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_path_and_print_flag() {
        let args = Args::try_parse_from(["steerwise", "--config", "/tmp/s.toml", "--print-config"])
            .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/s.toml")));
        assert!(args.print_config);
    }

    #[test]
    fn config_flag_requires_value() {
        assert!(Args::try_parse_from(["steerwise", "--config"]).is_err());
    }

    #[test]
    fn unknown_argument_is_rejected() {
        assert!(Args::try_parse_from(["steerwise", "--turbo"]).is_err());
    }

    #[test]
    fn no_arguments_uses_defaults() {
        let args = Args::try_parse_from(["steerwise"]).unwrap();
        assert_eq!(args.config, None);
        assert!(!args.print_config);
    }

    #[test]
    fn args_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
