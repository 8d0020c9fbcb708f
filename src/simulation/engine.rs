//! Engine facade that ties everything together
//!
//! Callers talk to the engine in two ways. They submit `EngineCommand`
//! intents, which are validated immediately and applied at the next tick
//! boundary. They read `EngineSnapshot`s, which are published once per
//! `tick` call and never change afterwards.

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use super::clock::SimClock;
use super::config::SimConfig;
use super::error::EngineError;
use super::event_log::{EventLog, LogCategory, LogEntry};
use super::intersection::{ControlMode, SignalPhase, SimIntersection};
use super::optimizer::{OptimizationReport, OptimizerSettings, SignalOptimizer};
use super::road_network::{JamTransition, SimRoadNetwork};
use super::segment::{Endpoint, SimSegment};
use super::signals::SignalController;
use super::stats::Stats;
use super::types::{GridCoord, IntersectionId, SegmentId};
use super::vehicle::{MovementParams, SimVehicle};
use super::vehicle_flow::{FlowReport, VehicleFlow};
use super::weather::WeatherState;

/// A user intent, applied atomically at the next tick boundary
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    SetRunning(bool),
    SetSimulationSpeed(f32),
    SetWeather(WeatherState),
    ToggleEmergency(bool),
    ApplyQuantumOptimization,
    SetLightStateManually {
        intersection: IntersectionId,
        phase: SignalPhase,
    },
    ReturnToAuto(IntersectionId),
}

/// Immutable view of the engine at the end of a tick
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    /// Ticks that advanced the simulation so far
    pub tick: u64,
    /// Simulated seconds since start
    pub time: f64,
    pub is_running: bool,
    pub simulation_speed: f32,
    pub weather: WeatherState,
    pub intersections: Vec<SimIntersection>,
    pub vehicles: Vec<SimVehicle>,
    pub stats: Stats,
    pub logs: Vec<LogEntry>,
    pub jammed_segments: BTreeSet<SegmentId>,
    /// Commands submitted but not yet applied
    pub pending_commands: usize,
}

impl EngineSnapshot {
    pub fn intersection(&self, intersection_id: IntersectionId) -> Option<&SimIntersection> {
        self.intersections.iter().find(|ix| ix.id == intersection_id)
    }
}

pub struct SimEngine {
    config: SimConfig,
    clock: SimClock,
    weather: WeatherState,
    road_network: SimRoadNetwork,
    signals: SignalController,
    flow: VehicleFlow,
    optimizer: SignalOptimizer,
    log: EventLog,
    stats: Stats,
    pending: VecDeque<EngineCommand>,
    rng: StdRng,
    snapshot: Arc<EngineSnapshot>,
}

impl SimEngine {
    /// Build an engine, seeding its RNG from `config.seed` or the OS
    pub fn new(config: SimConfig) -> Result<Self, EngineError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }

    /// Default configuration with a fixed seed for reproducible runs
    pub fn new_with_seed(seed: u64) -> Self {
        let config = SimConfig {
            seed: Some(seed),
            ..SimConfig::default()
        };
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    /// Build an engine around an injected random source
    pub fn with_rng(config: SimConfig, rng: StdRng) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config, rng))
    }

    fn build(config: SimConfig, rng: StdRng) -> Self {
        let (road_network, intersections) = SimRoadNetwork::build_grid(&config);
        let signals = SignalController::new(intersections, config.emergency_corridor);
        let optimizer = SignalOptimizer::new(OptimizerSettings::from_config(&config));
        let flow = VehicleFlow::new();
        let stats = Stats::compute(
            &road_network,
            &flow,
            &signals,
            0.0,
            config.throughput_window_secs,
        );

        let mut engine = Self {
            clock: SimClock::new(),
            weather: WeatherState::default(),
            log: EventLog::new(config.log_capacity),
            road_network,
            signals,
            flow,
            optimizer,
            stats,
            pending: VecDeque::new(),
            rng,
            snapshot: Arc::new(EngineSnapshot {
                tick: 0,
                time: 0.0,
                is_running: false,
                simulation_speed: 1.0,
                weather: WeatherState::default(),
                intersections: Vec::new(),
                vehicles: Vec::new(),
                stats: Stats::default(),
                logs: Vec::new(),
                jammed_segments: BTreeSet::new(),
                pending_commands: 0,
            }),
            config,
        };

        let message = format!(
            "Engine started: {}x{} grid, {} intersections, {} segments, weather {}",
            engine.config.grid_cols,
            engine.config.grid_rows,
            engine.road_network.intersection_count(),
            engine.road_network.segment_count(),
            engine.weather
        );
        info!("{}", message);
        engine.log.push(0.0, LogCategory::Info, message);
        engine.publish();
        engine
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn road_network(&self) -> &SimRoadNetwork {
        &self.road_network
    }

    pub fn signals(&self) -> &SignalController {
        &self.signals
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    /// The most recently published snapshot
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Validate an intent and queue it for the next tick boundary.
    /// Rejected intents leave the engine untouched.
    pub fn submit(&mut self, command: EngineCommand) -> Result<(), EngineError> {
        if let Err(e) = self.validate(&command) {
            warn!("Rejected {:?}: {}", command, e);
            return Err(e);
        }
        self.pending.push_back(command);
        Ok(())
    }

    fn validate(&self, command: &EngineCommand) -> Result<(), EngineError> {
        match command {
            EngineCommand::SetSimulationSpeed(speed) => SimClock::validate_speed(*speed),
            EngineCommand::SetLightStateManually { intersection, .. }
            | EngineCommand::ReturnToAuto(intersection) => {
                if self.signals.contains(*intersection) {
                    Ok(())
                } else {
                    Err(EngineError::UnknownIntersection(*intersection))
                }
            }
            EngineCommand::SetRunning(_)
            | EngineCommand::SetWeather(_)
            | EngineCommand::ToggleEmergency(_)
            | EngineCommand::ApplyQuantumOptimization => Ok(()),
        }
    }

    pub fn set_is_running(&mut self, running: bool) -> Result<(), EngineError> {
        self.submit(EngineCommand::SetRunning(running))
    }

    pub fn set_simulation_speed(&mut self, speed: f32) -> Result<(), EngineError> {
        self.submit(EngineCommand::SetSimulationSpeed(speed))
    }

    pub fn set_weather(&mut self, weather: WeatherState) -> Result<(), EngineError> {
        self.submit(EngineCommand::SetWeather(weather))
    }

    pub fn toggle_emergency(&mut self, active: bool) -> Result<(), EngineError> {
        self.submit(EngineCommand::ToggleEmergency(active))
    }

    pub fn apply_quantum_optimization(&mut self) -> Result<(), EngineError> {
        self.submit(EngineCommand::ApplyQuantumOptimization)
    }

    pub fn set_light_state_manually(
        &mut self,
        intersection: IntersectionId,
        phase: SignalPhase,
    ) -> Result<(), EngineError> {
        self.submit(EngineCommand::SetLightStateManually {
            intersection,
            phase,
        })
    }

    pub fn return_to_auto(&mut self, intersection: IntersectionId) -> Result<(), EngineError> {
        self.submit(EngineCommand::ReturnToAuto(intersection))
    }

    /// Apply queued intents, run one tick if the clock is running, and
    /// publish the resulting snapshot
    pub fn tick(&mut self, delta_secs: f32) -> Arc<EngineSnapshot> {
        let applied = self.apply_pending();
        match self.clock.tick(delta_secs) {
            Some(sim_delta) => self.step(sim_delta),
            // intents can change signal state while paused
            None if applied => self.refresh_stats(),
            None => {}
        }
        self.publish();
        self.snapshot()
    }

    /// Returns whether any intent was applied
    fn apply_pending(&mut self) -> bool {
        let applied = !self.pending.is_empty();
        while let Some(command) = self.pending.pop_front() {
            self.apply(command);
        }
        applied
    }

    fn apply(&mut self, command: EngineCommand) {
        let now = self.clock.time();
        match command {
            EngineCommand::SetRunning(running) => {
                if running != self.clock.is_running() {
                    self.clock.set_running(running);
                    let message = if running {
                        "Simulation resumed"
                    } else {
                        "Simulation paused"
                    };
                    self.log.push(now, LogCategory::Info, message);
                }
            }
            EngineCommand::SetSimulationSpeed(speed) => {
                if speed == self.clock.speed() {
                    return;
                }
                match self.clock.set_speed(speed) {
                    Ok(()) => self.log.push(
                        now,
                        LogCategory::Info,
                        format!("Simulation speed set to {}x", speed),
                    ),
                    Err(e) => warn!("{}", e),
                }
            }
            EngineCommand::SetWeather(weather) => {
                if weather != self.weather {
                    self.weather = weather;
                    self.road_network.apply_weather(weather);
                    self.log.push(
                        now,
                        LogCategory::Info,
                        format!("Weather changed to {}", weather),
                    );
                }
            }
            EngineCommand::ToggleEmergency(active) => {
                let affected = self.signals.set_emergency(active);
                if affected.is_empty() {
                    return;
                }
                let ids = join_ids(&affected);
                let message = if active {
                    format!("Emergency preemption active along {}", ids)
                } else {
                    format!("Emergency cleared; {} back under normal control", ids)
                };
                info!("{}", message);
                self.log.push(now, LogCategory::Emergency, message);
            }
            EngineCommand::ApplyQuantumOptimization => {
                self.run_optimizer();
            }
            EngineCommand::SetLightStateManually {
                intersection,
                phase,
            } => match self.signals.set_light_state_manually(intersection, phase) {
                Ok(ControlMode::EmergencyPreempt) => self.log.push(
                    now,
                    LogCategory::Override,
                    format!(
                        "{} override to {} queued until the emergency clears",
                        intersection, phase
                    ),
                ),
                Ok(_) => self.log.push(
                    now,
                    LogCategory::Override,
                    format!("{} manually set to {}", intersection, phase),
                ),
                Err(e) => warn!("{}", e),
            },
            EngineCommand::ReturnToAuto(intersection) => {
                match self.signals.return_to_auto(intersection) {
                    Ok(ControlMode::EmergencyPreempt) => self.log.push(
                        now,
                        LogCategory::Override,
                        format!(
                            "{} pending override dropped; emergency preemption continues",
                            intersection
                        ),
                    ),
                    Ok(_) => self.log.push(
                        now,
                        LogCategory::Override,
                        format!("{} returned to automatic control", intersection),
                    ),
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    fn run_optimizer(&mut self) -> OptimizationReport {
        let now = self.clock.time();
        let report = self
            .optimizer
            .optimize(&mut self.signals, &self.stats, &mut self.rng);

        for (id, mode) in &report.skipped {
            self.log.push(
                now,
                LogCategory::Optimization,
                format!("Skipped {} ({})", id, mode),
            );
        }
        for retune in &report.retuned {
            self.log.push(
                now,
                LogCategory::Optimization,
                format!(
                    "{} retuned: {} -> {}",
                    retune.intersection, retune.old, retune.new
                ),
            );
        }

        info!(
            "Optimizer run: {} retuned, {} unchanged, {} skipped",
            report.retuned.len(),
            report.unchanged.len(),
            report.skipped.len()
        );
        report
    }

    /// One full tick: vehicles, segments, signals, stats, log
    fn step(&mut self, delta_secs: f32) {
        let now = self.clock.time();
        self.road_network.apply_weather(self.weather);
        let params = MovementParams {
            weather_speed: self.weather.speed_multiplier(),
            congestion_penalty: self.config.congestion_penalty,
            min_crawl_factor: self.config.min_crawl_factor,
        };

        let mut report = FlowReport::default();
        self.flow.update(
            delta_secs,
            now,
            self.config.throughput_window_secs,
            &mut self.road_network,
            &self.signals,
            &params,
            &mut report,
        );
        self.flow.spawn_arrivals(
            delta_secs,
            now,
            self.weather,
            &self.config,
            &mut self.road_network,
            &mut self.rng,
            &mut report,
        );
        for violation in report.violations {
            self.report_violation(violation);
        }

        let transitions = self.road_network.update_jams(self.weather);
        self.log_jams(&transitions);

        self.signals.update(delta_secs);

        self.refresh_stats();
    }

    fn refresh_stats(&mut self) {
        self.stats = Stats::compute(
            &self.road_network,
            &self.flow,
            &self.signals,
            self.clock.time(),
            self.config.throughput_window_secs,
        );
    }

    fn log_jams(&mut self, transitions: &[JamTransition]) {
        let now = self.clock.time();
        for transition in transitions {
            let Some(segment) = self.road_network.get_segment(transition.segment) else {
                continue;
            };
            let message = if transition.jammed {
                format!(
                    "Jam on {} ({:.0}% full)",
                    describe_segment(segment),
                    segment.density() * 100.0
                )
            } else {
                format!("Jam cleared on {}", describe_segment(segment))
            };
            self.log.push(now, LogCategory::Jam, message);
        }
    }

    /// Internal bookkeeping went wrong: loud in debug builds, logged and
    /// skipped in release builds
    fn report_violation(&mut self, violation: EngineError) {
        error!("{}", violation);
        self.log.push(
            self.clock.time(),
            LogCategory::Info,
            format!("Internal error: {}", violation),
        );
        if cfg!(debug_assertions) {
            panic!("{}", violation);
        }
    }

    fn publish(&mut self) {
        self.snapshot = Arc::new(EngineSnapshot {
            tick: self.clock.ticks(),
            time: self.clock.time(),
            is_running: self.clock.is_running(),
            simulation_speed: self.clock.speed(),
            weather: self.weather,
            intersections: self.signals.intersections().cloned().collect(),
            vehicles: self.flow.vehicles().cloned().collect(),
            stats: self.stats.clone(),
            logs: self.log.to_vec(),
            jammed_segments: self.stats.jammed_segments.clone(),
            pending_commands: self.pending.len(),
        });
    }

    /// Print a summary of the engine state
    pub fn print_summary(&self) {
        let snapshot = &self.snapshot;
        let stats = &snapshot.stats;
        println!("=== Traffic Control Summary ===");
        println!(
            "Time: {:.1}s  Ticks: {}  Running: {}  Speed: {}x  Weather: {}",
            snapshot.time,
            snapshot.tick,
            snapshot.is_running,
            snapshot.simulation_speed,
            snapshot.weather
        );
        println!(
            "Vehicles: {} active, {} waiting, {} spawned, {} retired, {} turned away",
            stats.active_vehicles,
            stats.waiting_vehicles,
            stats.total_spawned,
            stats.total_retired,
            stats.total_turned_away
        );
        println!(
            "Density: {:.1}%  Avg wait: {:.1}s  Throughput: {:.2} veh/s  Emergency: {}",
            stats.overall_density * 100.0,
            stats.average_wait_time,
            stats.throughput,
            if stats.emergency_active { "ACTIVE" } else { "off" }
        );

        if !snapshot.jammed_segments.is_empty() {
            println!("--- Jammed Segments ---");
            for segment_id in &snapshot.jammed_segments {
                if let Some(segment) = self.road_network.get_segment(*segment_id) {
                    println!(
                        "  {} at {:.0}%",
                        describe_segment(segment),
                        segment.density() * 100.0
                    );
                }
            }
        }

        let overridden: Vec<_> = snapshot
            .intersections
            .iter()
            .filter(|ix| ix.mode != ControlMode::Auto)
            .collect();
        if !overridden.is_empty() {
            println!("--- Overridden Intersections ---");
            for ix in overridden {
                println!("  {} {}: {}", ix.id, ix.mode, ix.phase);
            }
        }

        let recent: Vec<_> = snapshot.logs.iter().rev().take(5).collect();
        if !recent.is_empty() {
            println!("--- Recent Events ---");
            for entry in recent.into_iter().rev() {
                println!("  {}", entry);
            }
        }
    }

    /// Draw a visual map of the grid in the terminal
    pub fn draw_map(&self) {
        println!("{}", self.render_map());
    }

    /// ASCII map of signal phases and segment load.
    ///
    /// Intersections show `N`/`n` (north-south green/yellow), `E`/`e`
    /// (east-west green/yellow) or `#` (all red), wrapped in `[ ]` when
    /// manual and `! !` when preempted. Links show the number of vehicles
    /// on both directions, with `=`/`H` marking a jam.
    pub fn render_map(&self) -> String {
        let cols = self.road_network.cols();
        let rows = self.road_network.rows();
        let mut out = String::new();

        for row in 0..rows {
            let mut line = String::new();
            let mut below = String::new();
            for col in 0..cols {
                let Some(id) = self.road_network.intersection_at(GridCoord::new(col, row)) else {
                    continue;
                };
                line.push_str(&self.intersection_glyph(id));

                if col + 1 < cols {
                    line.push_str(&self.link_glyph(id, GridCoord::new(col + 1, row), true));
                }
                if row + 1 < rows {
                    below.push_str(&self.link_glyph(id, GridCoord::new(col, row + 1), false));
                    if col + 1 < cols {
                        below.push_str("     ");
                    }
                }
            }
            out.push_str(line.trim_end());
            out.push('\n');
            if !below.is_empty() {
                out.push_str(below.trim_end());
                out.push('\n');
            }
        }
        out
    }

    fn intersection_glyph(&self, id: IntersectionId) -> String {
        let Some(ix) = self.signals.get(id) else {
            return " ? ".to_string();
        };
        let phase = match ix.phase {
            SignalPhase::NsGreen => 'N',
            SignalPhase::NsYellow => 'n',
            SignalPhase::EwGreen => 'E',
            SignalPhase::EwYellow => 'e',
            SignalPhase::AllRed => '#',
        };
        match ix.mode {
            ControlMode::Auto => format!(" {} ", phase),
            ControlMode::Manual => format!("[{}]", phase),
            ControlMode::EmergencyPreempt => format!("!{}!", phase),
        }
    }

    fn link_glyph(&self, from: IntersectionId, to: GridCoord, horizontal: bool) -> String {
        let to = self.road_network.intersection_at(to);
        let segments: Vec<&SimSegment> = to
            .into_iter()
            .flat_map(|to| {
                [
                    self.road_network.find_segment_between(from, to).ok(),
                    self.road_network.find_segment_between(to, from).ok(),
                ]
            })
            .flatten()
            .filter_map(|id| self.road_network.get_segment(id))
            .collect();

        let jammed = segments.iter().any(|s| s.jammed);
        let vehicles: u32 = segments.iter().map(|s| s.occupancy).sum();
        let count = if vehicles > 9 {
            "+".to_string()
        } else if vehicles > 0 {
            vehicles.to_string()
        } else {
            String::new()
        };

        if horizontal {
            let fill = if jammed { '=' } else { '-' };
            let middle = if count.is_empty() { fill.to_string() } else { count };
            format!("{}{}{}{}{}", fill, fill, middle, fill, fill)
        } else {
            let fill = if jammed { "H" } else { "|" };
            let middle = if count.is_empty() { fill.to_string() } else { count };
            format!(" {} ", middle)
        }
    }
}

fn describe_endpoint(endpoint: Endpoint) -> String {
    match endpoint {
        Endpoint::Intersection(id) => id.to_string(),
        Endpoint::Boundary => "edge".to_string(),
    }
}

fn describe_segment(segment: &SimSegment) -> String {
    format!(
        "{} ({} -> {})",
        segment.id,
        describe_endpoint(segment.start),
        describe_endpoint(segment.end)
    )
}

fn join_ids(ids: &[IntersectionId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
