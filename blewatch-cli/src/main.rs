use std::{error::Error, path::PathBuf, time::Duration};

use blewatch_domain::{
    sink::ChannelReading,
    telemetry::{Attribute, TelemetryValue},
    vehicle_state::{ConnectivityState, VehicleState},
};
use blewatch_runtime::{
    agent::{Agent, AgentHandle, Command},
    config::{AgentConfig, AgentSettings},
    snapshot::Snapshot,
};
use blewatch_sinks::history::{
    NotificationSink, NotificationSinkFormat, log::LogNotificationSink,
};
use blewatch_transport::TransportMode;
use chrono::{DateTime, Utc};
use clap::Parser;
use humantime::FormattedDuration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// vehicle identification number, overrides the config file
    #[arg(long)]
    vin: Option<String>,

    /// path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// transport: ble or simulated
    #[arg(short, long, default_value = "ble")]
    mode: TransportMode,

    /// path to SQLite db file to record reports to
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// path to JSON-lines file to append reports to
    #[arg(short, long)]
    jsonl: Option<PathBuf>,

    /// history file, format picked from the extension (.sqlite, .db or .jsonl); repeatable
    #[arg(long)]
    history: Vec<PathBuf>,

    /// advertised BLE local name of the vehicle
    #[arg(long)]
    ble_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = settings(&args)?;
    let sinks = sinks(&args).await?;
    let transport = args.mode.create_transport().await?;

    let (agent, handle) = Agent::new(
        settings.monitor(),
        transport,
        sinks,
        settings.tick_period(),
    );
    let task = tokio::spawn(agent.run());
    run(&handle, &settings).await?;
    handle.send(Command::Shutdown).await;
    task.await?;
    Ok(())
}

fn settings(args: &Args) -> Result<AgentSettings, Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    let settings = config
        .with_overrides(args.vin.clone(), args.ble_name.clone())
        .resolve()?;
    Ok(settings)
}

async fn sinks(args: &Args) -> Result<Vec<Box<dyn NotificationSink>>, Box<dyn Error>> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::<LogNotificationSink>::default()];
    if let Some(path) = &args.db {
        sinks.push(NotificationSinkFormat::Sqlite(path.clone()).to_sink().await?);
    }
    if let Some(path) = &args.jsonl {
        sinks.push(NotificationSinkFormat::JsonLines(path.clone()).to_sink().await?);
    }
    for path in &args.history {
        sinks.push(NotificationSinkFormat::create_from_file(path)?.to_sink().await?);
    }
    Ok(sinks)
}

type Summary = (
    VehicleState,
    ConnectivityState,
    Vec<(Attribute, Option<TelemetryValue>)>,
);

fn summary(snapshot: &Snapshot) -> Summary {
    (
        snapshot.state,
        snapshot.connectivity,
        snapshot
            .readings
            .iter()
            .map(|r| (r.attribute, r.value.clone()))
            .collect(),
    )
}

async fn run(handle: &AgentHandle, settings: &AgentSettings) -> Result<(), Box<dyn Error>> {
    let start = Utc::now();
    let mut previous: Option<Summary> = None;
    let mut refresh = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                let snapshot = handle.snapshot();
                let current = summary(&snapshot);
                if previous.as_ref() != Some(&current) {
                    print_report(&snapshot, settings, Utc::now(), start);
                    previous = Some(current);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted");
                return Ok(());
            }
        }
    }
}

fn print_report(
    snapshot: &Snapshot,
    settings: &AgentSettings,
    now: DateTime<Utc>,
    start: DateTime<Utc>,
) {
    use blewatch_domain::chrono_extra::elapsed_since;
    use humantime::format_duration;

    let runtime = format_duration(elapsed_since(start, now));
    println!(
        "\n=== {} at {} (Runtime: {}) ===",
        snapshot.vehicle, now, runtime
    );
    println!(
        "State: {}  Link: {}  Next poll: {}",
        snapshot.state,
        snapshot.connectivity,
        snapshot
            .next_poll_in
            .map(|d| age_summary(d).to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(disconnected) = snapshot.time_disconnected {
        let threshold = settings
            .params
            .ble_disconnected_min_time()
            .map(|t| age_summary(t).to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "Disconnected for {} (unknown after {})",
            age_summary(disconnected),
            threshold
        );
    }

    println!("\n{:<16} {:>16} {:>8}", "Sensor", "Value", "Age");
    println!("{}", "-".repeat(42));
    for reading in &snapshot.readings {
        println!(
            "{:<16} {:>16} {:>8}",
            reading.attribute.display_name(),
            value_summary(reading),
            reading
                .age
                .map(|d| age_summary(d).to_string())
                .unwrap_or_default()
        );
    }
    println!(
        "\nKnown: {}/{}",
        snapshot.known_count(),
        snapshot.readings.len()
    );
}

fn value_summary(reading: &ChannelReading) -> String {
    match &reading.value {
        Some(value) => reading.attribute.format_value(value),
        None => "unknown".to_string(),
    }
}

fn age_summary(duration: Duration) -> FormattedDuration {
    use blewatch_domain::chrono_extra::Truncate;
    use humantime::format_duration;

    format_duration(duration.truncate_to_seconds())
}
