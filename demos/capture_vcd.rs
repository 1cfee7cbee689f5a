// Capture to VCD example
//
// Configures the logic analyzer, runs one capture and writes it as a VCD file
// that waveform viewers such as GTKWave can open.

use clap::{Parser, ValueEnum};
use logiana_rs::{Edge, LinkSettings, LogicAnalyzer};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EdgeArg {
    Rising,
    Falling,
}

impl From<EdgeArg> for Edge {
    fn from(edge: EdgeArg) -> Self {
        match edge {
            EdgeArg::Rising => Edge::Rising,
            EdgeArg::Falling => Edge::Falling,
        }
    }
}

#[derive(Parser)]
#[command(name = "capture_vcd")]
#[command(version = "1.0")]
#[command(about = "Capture eight logic channels and save them as a VCD file")]
struct Args {
    /// Serial port the analyzer is attached to
    port: String,

    /// Output file
    #[arg(short, long, default_value = "capture.vcd")]
    output: String,

    /// Sample clock divider, one sample every (divider + 1) * 10ns
    #[arg(short, long, default_value_t = 0)]
    divider: u8,

    /// Trigger position inside the sample memory
    #[arg(long, default_value_t = 0)]
    position: u8,

    /// Trigger channel
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..8))]
    channel: u8,

    /// Trigger edge
    #[arg(short, long, value_enum, default_value_t = EdgeArg::Rising)]
    edge: EdgeArg,

    /// Run state polling interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Give up on the capture after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_s: u64,

    /// Baud rate of the serial link
    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let settings = LinkSettings::new(&args.port).baud_rate(args.baud);
    let mut la = LogicAnalyzer::open(&settings)?;
    println!("Connected to logic analyzer on {}", args.port);

    la.set_divider(args.divider)?;
    la.set_position(args.position)?;
    la.set_trigger(args.edge.into(), args.channel)?;

    println!("Divider: {}", la.get_divider()?);
    println!("Position: {}", la.get_position()?);
    println!("Trigger: {}", la.get_trigger()?);

    println!("Waiting for trigger...");
    let start = Instant::now();
    la.start()?;
    la.wait_until_idle(
        Duration::from_millis(args.poll_ms),
        Duration::from_secs(args.timeout_s),
    )?;
    println!("Capture finished after {:.1}s", start.elapsed().as_secs_f64());

    la.save_vcd(&args.output)?;
    println!("Saved {} samples to {}", la.sample_count(), args.output);

    la.close()?;
    Ok(())
}
