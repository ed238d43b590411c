//! Self-healing Python script runner.
//!
//! Runs a script, classifies its failures, patches the source, and retries
//! under a bounded budget. `mend analyze` reports what would happen without
//! touching anything.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mend::exit_codes;
use mend::fallback::NoFallback;
use mend::handlers::default_registry;
use mend::io::config::{MendConfig, load_config};
use mend::io::installer::PipInstaller;
use mend::io::sandbox::PythonSandbox;
use mend::metrics::LogSink;
use mend::orchestrator::{analyze, run_session};
use mend::session::SessionOutcome;

#[derive(Parser)]
#[command(
    name = "mend",
    version,
    about = "Self-healing Python script runner: execute, classify, patch, retry"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the script, fixing failures until it succeeds or the budget runs out.
    Run {
        /// Target Python script.
        script: PathBuf,
        /// Maximum fix attempts.
        #[arg(long)]
        max_retries: Option<u32>,
        /// Per-run wall-clock budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Allow fixes that install distributions with pip.
        #[arg(long)]
        allow_install: bool,
        /// Print the session report as JSON to stdout.
        #[arg(long)]
        json: bool,
        /// Config file (TOML). Missing file means defaults.
        #[arg(long, default_value = "mend.toml")]
        config: PathBuf,
    },
    /// Dry run: execute once and report which fix would fire. Mutates nothing.
    Analyze {
        /// Target Python script.
        script: PathBuf,
        /// Per-run wall-clock budget in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print the report as JSON to stdout.
        #[arg(long)]
        json: bool,
        /// Config file (TOML). Missing file means defaults.
        #[arg(long, default_value = "mend.toml")]
        config: PathBuf,
    },
}

fn main() {
    mend::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            script,
            max_retries,
            timeout_secs,
            allow_install,
            json,
            config,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(n) = max_retries {
                cfg.max_retries = n;
            }
            if let Some(s) = timeout_secs {
                cfg.exec_timeout_secs = s;
            }
            cfg.allow_install = cfg.allow_install || allow_install;
            cfg.validate()?;
            cmd_run(&script, &cfg, json)
        }
        Command::Analyze {
            script,
            timeout_secs,
            json,
            config,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(s) = timeout_secs {
                cfg.exec_timeout_secs = s;
            }
            cfg.validate()?;
            cmd_analyze(&script, &cfg, json)
        }
    }
}

fn cmd_run(script: &PathBuf, cfg: &MendConfig, json: bool) -> Result<i32> {
    let sandbox = PythonSandbox::new(&cfg.python, cfg.output_limit_bytes);
    let installer = PipInstaller::new(
        &cfg.python,
        Duration::from_secs(cfg.install_timeout_secs),
        cfg.output_limit_bytes,
    );
    let registry = default_registry(cfg.allow_install);
    let session = run_session(
        script,
        &sandbox,
        &installer,
        &NoFallback,
        &registry,
        &LogSink,
        cfg,
    )?;

    if json {
        let mut payload = serde_json::to_string_pretty(&session).context("serialize session")?;
        payload.push('\n');
        print!("{payload}");
    } else {
        for attempt in session.attempts() {
            let mark = if attempt.applied { "applied" } else { "suggested" };
            println!(
                "[{}] {} ({}): {}",
                mark, attempt.handler_id, attempt.record.kind, attempt.description
            );
        }
        println!("outcome: {:?}", session.outcome());
    }

    Ok(match session.outcome() {
        SessionOutcome::Success => exit_codes::OK,
        SessionOutcome::Exhausted => exit_codes::EXHAUSTED,
        SessionOutcome::Fatal(_) => exit_codes::FATAL,
        // finalize() forbids this, but the match must be total
        SessionOutcome::Running => exit_codes::INVALID,
    })
}

fn cmd_analyze(script: &PathBuf, cfg: &MendConfig, json: bool) -> Result<i32> {
    let sandbox = PythonSandbox::new(&cfg.python, cfg.output_limit_bytes);
    let registry = default_registry(cfg.allow_install);
    let report = analyze(script, &sandbox, &registry, cfg)?;

    if json {
        let mut payload = serde_json::to_string_pretty(&report).context("serialize report")?;
        payload.push('\n');
        print!("{payload}");
        return Ok(exit_codes::OK);
    }

    match (&report.record, &report.handler_id) {
        (None, _) => println!(
            "{}",
            report
                .description
                .as_deref()
                .unwrap_or("script succeeded, nothing to fix")
        ),
        (Some(record), Some(handler)) => {
            let mode = if report.would_auto_fix {
                "would fix"
            } else {
                "suggestion"
            };
            println!(
                "{} at line {}: {}",
                record.kind,
                record.line.map_or("?".to_string(), |l| l.to_string()),
                record.message
            );
            println!(
                "{mode} via {handler}: {}",
                report.description.as_deref().unwrap_or("")
            );
        }
        (Some(record), None) => {
            println!(
                "{} at line {}: {}",
                record.kind,
                record.line.map_or("?".to_string(), |l| l.to_string()),
                record.message
            );
            println!("no fix available");
        }
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["mend", "run", "app.py"]);
        match cli.command {
            Command::Run {
                script,
                max_retries,
                allow_install,
                json,
                ..
            } => {
                assert_eq!(script, PathBuf::from("app.py"));
                assert_eq!(max_retries, None);
                assert!(!allow_install);
                assert!(!json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_run_flags() {
        let cli = Cli::parse_from([
            "mend",
            "run",
            "app.py",
            "--max-retries",
            "5",
            "--allow-install",
            "--json",
        ]);
        match cli.command {
            Command::Run {
                max_retries,
                allow_install,
                json,
                ..
            } => {
                assert_eq!(max_retries, Some(5));
                assert!(allow_install);
                assert!(json);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn parse_analyze() {
        let cli = Cli::parse_from(["mend", "analyze", "app.py", "--timeout-secs", "3"]);
        match cli.command {
            Command::Analyze { timeout_secs, .. } => assert_eq!(timeout_secs, Some(3)),
            _ => panic!("expected analyze command"),
        }
    }
}
