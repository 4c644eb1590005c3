// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! rfdlink-test - RFD900 radio link test
//!
//! Run `rfdlink-test sender` on one end of the link and
//! `rfdlink-test receiver` on the other. Stop both with Ctrl+C; the receiver
//! prints how many frames went missing.

mod report;

use clap::Parser;
use colored::*;
use rfdlink::{
    build_role, find_rfd900, run_with_progress, CancelToken, ConnectionError, LinkTestConfig,
    Role, SerialPortLink,
};
use std::path::PathBuf;

/// RFD900 link test
#[derive(Parser, Debug)]
#[command(name = "rfdlink-test")]
#[command(version)]
#[command(about = "Measure frame loss over an RFD900 radio link")]
struct Args {
    /// Role of this end of the link: sender or receiver
    role: Role,

    /// Configuration file (TOML); defaults to $RFDLINK_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port; skips RFD900 auto-discovery
    #[arg(short, long)]
    port: Option<String>,
}

fn main() {
    // Initialize logger for RUST_LOG-based debug output
    env_logger::init();

    let args = Args::parse();

    match run(&args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &Args) -> Result<LinkTestConfig, rfdlink::ConfigError> {
    let mut config = LinkTestConfig::load(args.config.as_deref())?;
    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
        config.validate()?;
    }
    Ok(config)
}

/// Configured port, else the discovered one; `None` if interrupted while searching.
fn resolve_port(
    config: &LinkTestConfig,
    cancel: &CancelToken,
) -> Result<Option<String>, ConnectionError> {
    if let Some(port) = &config.serial.port {
        return Ok(Some(port.clone()));
    }

    eprintln!("{}", "    Searching for RFD900...".dimmed());
    match find_rfd900(&config.serial, cancel) {
        Ok(port) => Ok(Some(port)),
        Err(ConnectionError::Interrupted) => Ok(None),
        Err(e) => Err(e),
    }
}

fn run(args: &Args) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(args)?;
    log::debug!("[MAIN] configuration: {:?}", config);

    // Setup Ctrl+C handler
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel())?;

    let mut role = build_role(args.role, config.sender.interval());

    let Some(port) = resolve_port(&config, &cancel)? else {
        log::info!("[MAIN] interrupted before the link was opened");
        report::print_final(&role.on_terminate());
        return Ok(0);
    };
    let mut link = SerialPortLink::open(&port, &config.serial)?;

    eprintln!("{} RFD900 link test ({} mode)", ">>>".green().bold(), args.role);
    eprintln!("    port={}, baud={}", port, config.serial.baud);
    if args.role == Role::Sender {
        eprintln!("    interval={} ms", config.sender.interval_ms);
    }
    eprintln!("{}", "    Press Ctrl+C to stop".dimmed());
    log::info!("[MAIN] {} started on {}", args.role, port);

    let progress = match args.role {
        Role::Receiver => config.receiver.progress_interval(),
        Role::Sender => None,
    };

    let outcome = run_with_progress(
        role.as_mut(),
        &mut link,
        &cancel,
        progress,
        report::print_progress,
    );

    report::print_final(&outcome.report);
    if let Some(e) = &outcome.failure {
        eprintln!("{}: {}", "Error".red().bold(), e);
    }
    Ok(outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles() {
        let args = Args::try_parse_from(["rfdlink-test", "sender"]).expect("parse");
        assert_eq!(args.role, Role::Sender);
        assert!(args.port.is_none());

        let args = Args::try_parse_from(["rfdlink-test", "Receiver", "--port", "/dev/ttyUSB0"])
            .expect("parse");
        assert_eq!(args.role, Role::Receiver);
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_role_is_required() {
        assert!(Args::try_parse_from(["rfdlink-test"]).is_err());
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(Args::try_parse_from(["rfdlink-test", "relay"]).is_err());
        assert!(Args::try_parse_from(["rfdlink-test", "sender", "receiver"]).is_err());
    }

    #[test]
    fn test_config_file_and_port_override() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[serial]\nport = \"COM3\"\n\n[sender]\ninterval_ms = 250")
            .expect("write");

        let path_arg = file.path().to_string_lossy().into_owned();
        let args = Args::try_parse_from(["rfdlink-test", "sender", "--config", &path_arg])
            .expect("parse");
        let config = load_config(&args).expect("config");
        assert_eq!(config.sender.interval_ms, 250);

        let mut args = args;
        args.port = Some("COM7".into());
        let config = load_config(&args).expect("config");
        assert_eq!(config.serial.port.as_deref(), Some("COM7"));
    }

    #[test]
    fn test_configured_port_skips_discovery() {
        let mut config = LinkTestConfig::default();
        config.serial.port = Some("/dev/ttyUSB3".into());

        let port = resolve_port(&config, &CancelToken::new()).expect("port");
        assert_eq!(port.as_deref(), Some("/dev/ttyUSB3"));
    }

    #[test]
    fn test_interrupt_during_discovery_is_not_an_error() {
        let config = LinkTestConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();

        let port = resolve_port(&config, &cancel).expect("interrupt is not a failure");
        assert!(port.is_none());
    }
}
