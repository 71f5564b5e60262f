use anyhow::{Context, Result};
use clap::Parser;
use doorlock_cli::{Scenario, Simulator, load_config, sim::DEFAULT_MAX_REBOOTS};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Run the door lock firmware against a scripted mock board.
#[derive(Parser, Debug)]
#[command(name = "doorlock-sim", version)]
struct Opts {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Firmware configuration (JSON), overrides the scenario's own
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the scenario run length
    #[arg(short, long)]
    duration_ms: Option<u64>,

    #[arg(long, default_value_t = DEFAULT_MAX_REBOOTS)]
    max_reboots: u32,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut scenario = Scenario::load(&opts.scenario)?;
    if let Some(duration_ms) = opts.duration_ms {
        scenario.duration_ms = duration_ms.max(1);
    }
    let config = opts.config.as_deref().map(load_config).transpose()?;
    let simulator = Simulator::new(scenario, config).max_reboots(opts.max_reboots);

    // paused clock: timers fire as soon as every task is idle
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .context("cannot start runtime")?;
    let report = runtime.block_on(simulator.run())?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
