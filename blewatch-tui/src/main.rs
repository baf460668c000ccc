use std::{
    error::Error,
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    rc::Rc,
    sync::Mutex,
    time::Duration,
};

use anyhow::{Context, Result};
use blewatch_domain::{report::SensorReport, sink::ChannelReading, vehicle_state::VehicleState};
use blewatch_runtime::{
    agent::{Agent, AgentHandle, Command},
    config::{AgentConfig, AgentSettings},
    snapshot::Snapshot,
};
use blewatch_sinks::history::{NotificationSink, NotificationSinkFormat, noop::NoopNotificationSink};
use blewatch_transport::TransportMode;
use chrono::{DateTime, Utc};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use humantime::FormattedDuration;
use ratatui::{
    layout::{Constraint, Direction, Layout},
    widgets::{Block, Borders},
};
use ratatui::{
    prelude::*,
    widgets::{Cell, Paragraph, Row, Table},
};
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

    /// where log output goes while the terminal is taken over
    #[arg(short, long, default_value = "blewatch.log")]
    log: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;
    let settings = settings(&args)?;
    let sink = sink(&args).await?;
    let transport = args.mode.create_transport().await?;

    let (agent, handle) = Agent::new(
        settings.monitor(),
        transport,
        sink,
        settings.tick_period(),
    );
    let task = tokio::spawn(agent.run());

    let mut terminal = setup_terminal().context("setup failed")?;
    let outcome = run(&handle, &mut terminal);
    restore_terminal(&mut terminal).context("restore terminal failed")?;
    outcome?;

    handle.send(Command::Shutdown).await;
    task.await?;
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let file = File::create(&args.log)
        .with_context(|| format!("unable to create log file {}", args.log.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn settings(args: &Args) -> Result<AgentSettings> {
    let config = match &args.config {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::default(),
    };
    config
        .with_overrides(args.vin.clone(), args.ble_name.clone())
        .resolve()
        .context("invalid configuration")
}

async fn sink(args: &Args) -> Result<Vec<Box<dyn NotificationSink>>, Box<dyn Error>> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
    if let Some(path) = &args.db {
        sinks.push(NotificationSinkFormat::Sqlite(path.clone()).to_sink().await?);
    }
    if let Some(path) = &args.jsonl {
        sinks.push(NotificationSinkFormat::JsonLines(path.clone()).to_sink().await?);
    }
    for path in &args.history {
        sinks.push(NotificationSinkFormat::create_from_file(path)?.to_sink().await?);
    }
    if sinks.is_empty() {
        sinks.push(Box::<NoopNotificationSink>::default());
    }
    Ok(sinks)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    execute!(stdout, EnterAlternateScreen).context("unable to enter alternate screen")?;
    Terminal::new(CrosstermBackend::new(stdout)).context("creating terminal failed")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("unable to switch to main screen")?;
    terminal.show_cursor().context("unable to show cursor")
}

fn run(handle: &AgentHandle, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    use blewatch_domain::chrono_extra::elapsed_since;
    use humantime::format_duration;

    let start = Utc::now();
    loop {
        let snapshot = handle.snapshot();
        terminal.draw(|f| {
            let now = Utc::now();
            let runtime = format_duration(elapsed_since(start, now));
            let main_layout = layout(f);
            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
                .split(main_layout[1]);

            let footer = Paragraph::new(context_text(&snapshot, now, runtime))
                .block(Block::default().title("Context").borders(Borders::ALL))
                .style(Style::default().fg(state_color(snapshot.state)));
            f.render_widget(footer, main_layout[0]);
            f.render_widget(readings_table(&snapshot.readings), body[0]);
            f.render_widget(recent_table(&snapshot), body[1]);
        })?;

        match next_key()? {
            Some(KeyCode::Char('q')) => {
                info!("quit requested");
                return Ok(());
            }
            Some(KeyCode::Char('w')) => {
                handle.try_send(Command::Wake);
            }
            Some(KeyCode::Char('u')) => {
                handle.try_send(Command::ForceUpdate);
            }
            _ => {}
        }
    }
}

fn context_text(snapshot: &Snapshot, now: DateTime<Utc>, runtime: FormattedDuration) -> String {
    let next_poll = snapshot
        .next_poll_in
        .map(|d| age_summary(d).to_string())
        .unwrap_or_else(|| "-".to_string());
    let disconnected = snapshot
        .time_disconnected
        .map(|d| format!(", Disconnected for: {}", age_summary(d)))
        .unwrap_or_default();
    format!(
        "Vehicle: {}, State: {}, Link: {}{disconnected}, Next poll in: {next_poll}\n\
         Now: {now}, Total Run time: {runtime}\n\
         (press 'w' to wake, 'u' to update now, 'q' to quit)",
        snapshot.vehicle, snapshot.state, snapshot.connectivity
    )
}

fn state_color(state: VehicleState) -> Color {
    match state {
        VehicleState::Unknown => Color::DarkGray,
        VehicleState::Asleep => Color::Blue,
        VehicleState::Waking => Color::Yellow,
        VehicleState::Awake => Color::Green,
        VehicleState::Charging => Color::Cyan,
    }
}

fn readings_table<'a>(readings: &[ChannelReading]) -> Table<'a> {
    let rows: Vec<Row> = readings
        .iter()
        .map(|reading| {
            let (value, style) = match &reading.value {
                Some(value) => (reading.attribute.format_value(value), Style::default()),
                None => ("unknown".to_string(), Style::default().fg(Color::DarkGray)),
            };
            let age = reading
                .age
                .map(|d| age_summary(d).to_string())
                .unwrap_or_default();
            Row::new(vec![
                Cell::from(reading.attribute.display_name()),
                Cell::from(value),
                Cell::from(age),
            ])
            .style(style)
        })
        .collect();

    Table::new(
        rows,
        &[
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(10),
        ],
    )
    .block(Block::default().title("Sensors").borders(Borders::ALL))
    .header(
        Row::new(vec!["Sensor", "Value", "Age"]).style(Style::default().fg(Color::Yellow)),
    )
}

fn recent_table<'a>(snapshot: &Snapshot) -> Table<'a> {
    let rows: Vec<Row> = snapshot
        .recent
        .iter()
        .rev()
        .map(|report: &SensorReport| {
            let style = if report.is_unknown() {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(report.date_time.format("%H:%M:%S").to_string()),
                Cell::from(report.to_string()),
            ])
            .style(style)
        })
        .collect();

    Table::new(rows, &[Constraint::Length(9), Constraint::Min(20)])
        .block(Block::default().title("Recent").borders(Borders::ALL))
        .header(Row::new(vec!["Time", "Report"]).style(Style::default().fg(Color::Yellow)))
}

fn layout(frame: &mut Frame) -> Rc<[Rect]> {
    Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(5), Constraint::Min(5)].as_ref())
        .split(frame.area())
}

fn next_key() -> Result<Option<KeyCode>> {
    if event::poll(Duration::from_millis(250)).context("event poll failed")?
        && let Event::Key(key) = event::read().context("event read failed")?
    {
        return Ok(Some(key.code));
    }
    Ok(None)
}

fn age_summary(duration: Duration) -> FormattedDuration {
    use blewatch_domain::chrono_extra::Truncate;
    use humantime::format_duration;

    format_duration(duration.truncate_to_seconds())
}
