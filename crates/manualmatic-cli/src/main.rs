//! Manualmatic bridge runner
//!
//! Connects a pendant on a serial port to the simulated machine.
//!
//! Usage:
//!   manualmatic [machine.ini] --port /dev/ttyACM0 --console
//!
//! With `--console`, lines typed on stdin are injected into the bridge:
//! `>XXpayload` writes a frame to the pendant, anything else is dispatched
//! as if the pendant had sent it.

use anyhow::{bail, Context, Result};
use clap::Parser;
use manualmatic_core::bridge::Injected;
use manualmatic_core::machine::AXIS_LETTERS;
use manualmatic_core::prelude::*;
use manualmatic_core::protocol::list_ports;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "manualmatic", version, about = "Manualmatic pendant bridge")]
struct Cli {
    /// Controller ini file to seed pendant settings from
    ini: Option<PathBuf>,

    /// Serial port of the pendant (discovered when omitted)
    #[arg(short, long)]
    port: Option<String>,

    /// JSON bridge config
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Axes of the simulated machine
    #[arg(long, default_value = "XYZ")]
    axes: String,

    /// Read debug commands from stdin
    #[arg(long)]
    console: bool,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Axis letters to a bitmask, e.g. "XYZ" -> 0b111
fn parse_axes(letters: &str) -> Result<u16> {
    let mut mask = 0u16;
    for letter in letters.chars().map(|c| c.to_ascii_uppercase()) {
        let Some(index) = AXIS_LETTERS.iter().position(|&a| a == letter) else {
            bail!("unknown axis '{}'", letter);
        };
        mask |= 1 << index;
    }
    if mask == 0 {
        bail!("no axes configured");
    }
    Ok(mask)
}

/// Split off the two-character code
fn split_code(s: &str) -> (&str, &str) {
    let end = s.char_indices().nth(2).map_or(s.len(), |(i, _)| i);
    s.split_at(end)
}

/// Parse one console line
fn parse_console_line(line: &str) -> Option<Injected> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return None;
    }
    match line.strip_prefix('>') {
        Some(rest) if !rest.is_empty() => {
            let (code, payload) = split_code(rest);
            Some(Injected::Outbound {
                code: code.to_string(),
                payload: payload.to_string(),
            })
        }
        Some(_) => None,
        None => {
            let (code, payload) = split_code(line);
            Some(Injected::Inbound(CommandRecord::new(code, payload)))
        }
    }
}

/// Feed console lines into the bridge until input ends or the bridge is gone
fn run_console<R: BufRead>(input: R, injector: &Sender<Injected>) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("console read failed: {}", e);
                break;
            }
        };
        if let Some(message) = parse_console_line(&line) {
            if injector.send(message).is_err() {
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list_ports {
        for port in list_ports() {
            match (port.vid, port.pid) {
                (Some(vid), Some(pid)) => println!("{} [{:04x}:{:04x}]", port.name, vid, pid),
                _ => println!("{}", port.name),
            }
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    if cli.port.is_some() {
        config.port = cli.port.clone();
    }

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let settings = match &cli.ini {
        Some(path) => {
            let ini = IniFile::from_path(path)
                .with_context(|| format!("failed to read ini {}", path.display()))?;
            PendantSettings::from_ini(&ini)
        }
        None => PendantSettings::default(),
    };

    let machine = SimulatedMachine::new(parse_axes(&cli.axes)?);
    let connector = SerialConnector::new(config.baud_rate, config.read_timeout(), config.signature());
    let mut bridge = Bridge::new(config, settings, machine, connector);

    // Detached: a blocked stdin read must not hold up shutdown
    if cli.console {
        let injector = bridge.injector();
        thread::spawn(move || run_console(io::stdin().lock(), &injector));
    }

    let running = Arc::new(AtomicBool::new(true));
    let loop_running = running.clone();
    let bridge_loop = tokio::task::spawn_blocking(move || bridge.run(&loop_running));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutting down");
    running.store(false, Ordering::SeqCst);
    bridge_loop.await.context("bridge loop panicked")?;
    Ok(())
}
