//! roswell-demo: a GPS feed published through the shared table, with a
//! client poking the `main` channel.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug roswell-demo --title Roswell --iterations 5
//! ```

use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use roswell::prelude::*;
use roswell::ElementId;
use roswell::limits::{MAIN_CHANNEL_NUMBER, REPLY_CHANNEL};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roswell-demo")]
#[command(about = "Publish GPS readings and exchange commands over roswell")]
struct Args {
    /// Shared table title
    #[arg(long, default_value = "Roswell")]
    title: String,

    /// Publish/receive rounds to run
    #[arg(long, default_value_t = 5)]
    iterations: u32,

    /// How long `main` waits for a message each round, in microseconds
    #[arg(long, default_value_t = 1_000_000)]
    timeout_us: u64,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct Epoch {
    sec: i64,
    nsec: i64,
}

impl Epoch {
    fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: since.as_secs() as i64,
            nsec: since.subsec_nanos() as i64,
        }
    }
}

struct Gps {
    position: ElementId,
    altitude: ElementId,
    epoch: ElementId,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, kind = %e.kind(), "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> roswell::Result<()> {
    let table = SharedTable::open(TableConfig::default().with_title(args.title.as_str()))?;
    tracing::info!(title = %table.title(), capacity = table.capacity(), "table open");

    let gps = Gps {
        position: table.create_publisher("GPS-position", ElementKind::BoundedString)?,
        altitude: table.create_publisher("GPS-altitude", ElementKind::Fixed(8))?,
        epoch: table.create_publisher("GPS-epoch", ElementKind::Fixed(16))?,
    };
    table.write_str(gps.position, "3258.1200N,09642.943W")?;
    table.write_value(gps.altitude, &195.0f64)?;

    let main = ChannelDirectory::open(
        ChannelConfig::new("main").with_receive_timeout(Duration::from_micros(args.timeout_us)),
    )?;
    let client = ChannelDirectory::open(
        ChannelConfig::new("client").with_receive_timeout(Duration::from_millis(1)),
    )?;

    let stale = main.clear_queue(None)?;
    if stale > 0 {
        tracing::info!(stale, "dropped old messages from main");
    }

    client.send_msg(MAIN_CHANNEL_NUMBER, MessageType::ONBOARD, b"")?;
    client.send_command(MAIN_CHANNEL_NUMBER, "reload")?;
    client.send_command(MAIN_CHANNEL_NUMBER, "status")?;

    for round in 0..args.iterations {
        table.write_value(gps.epoch, &Epoch::now())?;
        report(&table, &gps, round)?;

        match main.receive_msg()? {
            Some(msg) => {
                println!(
                    "main <- {} on channel {}: {} {:?} ({}us)",
                    msg.sender,
                    msg.channel,
                    msg.kind,
                    msg.payload_str(),
                    msg.latency.as_micros()
                );
                if msg.kind == MessageType::COMMAND {
                    main.send_msg(REPLY_CHANNEL, MessageType::DATA, b"ok\0")?;
                }
            }
            None => println!("main: {}", main.last_message()),
        }

        if let Some(reply) = client.receive_msg()? {
            println!("client <- {}: {}", reply.sender, reply.payload_str());
        }
    }

    Ok(())
}

fn report(table: &SharedTable, gps: &Gps, round: u32) -> roswell::Result<()> {
    let position = table.read_string(gps.position)?;
    let altitude: f64 = table.read_value(gps.altitude)?;
    let epoch: Epoch = table.read_value(gps.epoch)?;
    println!(
        "[{}] {} at {:.1}m, epoch {}.{:09}",
        round, position, altitude, epoch.sec, epoch.nsec
    );
    Ok(())
}
