use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use traffic_control::simulation::{
    IntersectionId, SignalPhase, SimConfig, SimEngine, SimId, WeatherState,
};

#[derive(Parser)]
#[command(name = "traffic_control")]
#[command(about = "Headless traffic control simulation of a signalised city grid")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Intersection columns
    #[arg(long, default_value = "4")]
    cols: usize,

    /// Intersection rows
    #[arg(long, default_value = "4")]
    rows: usize,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Simulation speed multiplier
    #[arg(long, default_value = "1.0")]
    speed: f32,

    /// CLEAR, RAIN, FOG or SNOW
    #[arg(long, default_value = "clear")]
    weather: WeatherState,

    /// Mean vehicle arrivals per simulated second
    #[arg(long)]
    spawn_rate: Option<f32>,

    /// Run the signal optimizer every N simulated seconds
    #[arg(long)]
    optimize_every: Option<f32>,

    /// Activate the emergency corridor at this simulated time
    #[arg(long)]
    emergency_at: Option<f32>,

    /// How long the emergency corridor stays active, in simulated seconds
    #[arg(long, default_value = "30")]
    emergency_secs: f32,

    /// Force an intersection into a phase, e.g. `5:EW_GREEN` (repeatable)
    #[arg(long = "override", value_name = "ID:PHASE", value_parser = parse_override)]
    overrides: Vec<(usize, SignalPhase)>,
}

fn parse_override(s: &str) -> Result<(usize, SignalPhase), String> {
    let (id, phase) = s
        .split_once(':')
        .ok_or_else(|| format!("expected ID:PHASE, got {:?}", s))?;
    let id = id
        .trim()
        .trim_start_matches(['I', 'i'])
        .parse::<usize>()
        .map_err(|e| format!("bad intersection id {:?}: {}", id, e))?;
    let phase = phase.parse::<SignalPhase>().map_err(|e| e.to_string())?;
    Ok((id, phase))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,traffic_control=info"),
    )
    .init();

    let cli = Cli::parse();
    run_headless(&cli)
}

fn build_engine(cli: &Cli) -> Result<SimEngine> {
    let mut config = SimConfig::with_grid(cli.cols, cli.rows);
    config.seed = cli.seed;
    if let Some(rate) = cli.spawn_rate {
        config.spawn_rate = rate;
    }

    let mut engine = SimEngine::new(config).context("Invalid simulation configuration")?;
    engine
        .set_simulation_speed(cli.speed)
        .context("Invalid --speed")?;
    engine.set_weather(cli.weather)?;
    for (id, phase) in &cli.overrides {
        engine
            .set_light_state_manually(IntersectionId(SimId(*id)), *phase)
            .with_context(|| format!("Invalid --override {}:{}", id, phase))?;
    }
    engine.set_is_running(true)?;
    Ok(engine)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) -> Result<()> {
    if !(cli.delta > 0.0) {
        bail!("--delta must be positive, got {}", cli.delta);
    }

    let mut engine = build_engine(cli)?;

    println!("Running traffic control simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s, Speed: {}x", cli.ticks, cli.delta, cli.speed);

    // Calculate how many ticks equal 1 second of wall time
    let ticks_per_second = (1.0 / cli.delta).ceil() as u32;
    println!();

    println!("Initial state:");
    engine.print_summary();
    engine.draw_map();
    println!();

    let emergency_until = cli.emergency_at.map(|at| at + cli.emergency_secs);
    let mut emergency_started = false;
    let mut emergency_cleared = false;
    let mut next_optimization = cli.optimize_every;

    let mut tick = 0;
    while tick < cli.ticks {
        let ticks_to_run = ticks_per_second.min(cli.ticks - tick);

        for _ in 0..ticks_to_run {
            tick += 1;
            let now = engine.tick(cli.delta).time as f32;

            if let (Some(at), false) = (cli.emergency_at, emergency_started) {
                if now >= at {
                    engine.toggle_emergency(true)?;
                    emergency_started = true;
                }
            }
            if let (Some(until), true, false) =
                (emergency_until, emergency_started, emergency_cleared)
            {
                if now >= until {
                    engine.toggle_emergency(false)?;
                    emergency_cleared = true;
                }
            }
            if let (Some(next), Some(every)) = (next_optimization, cli.optimize_every) {
                if now >= next && every > 0.0 {
                    engine.apply_quantum_optimization()?;
                    next_optimization = Some(next + every);
                }
            }
        }

        let snapshot = engine.snapshot();
        let stats = &snapshot.stats;
        println!(
            "t={:>7.1}s  vehicles={:>4}  waiting={:>4}  density={:>5.1}%  jams={:>2}  throughput={:.2}/s",
            snapshot.time,
            stats.active_vehicles,
            stats.waiting_vehicles,
            stats.overall_density * 100.0,
            snapshot.jammed_segments.len(),
            stats.throughput
        );
    }

    println!();
    println!("=== Final State ===");
    engine.print_summary();
    engine.draw_map();

    let snapshot = engine.snapshot();
    info!(
        "SIMULATION COMPLETE: {} ticks, {:.1}s simulated, {} vehicles retired",
        snapshot.tick, snapshot.time, snapshot.stats.total_retired
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_override_flags() {
        assert_eq!(
            parse_override("5:ew_green").unwrap(),
            (5, SignalPhase::EwGreen)
        );
        assert_eq!(
            parse_override("I3:ALL_RED").unwrap(),
            (3, SignalPhase::AllRed)
        );
        assert!(parse_override("5").is_err());
        assert!(parse_override("x:NS_GREEN").is_err());
        assert!(parse_override("2:PURPLE").is_err());
    }
}
