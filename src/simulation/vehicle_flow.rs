//! Vehicle spawning, movement and retirement
//!
//! Keeps the active vehicle set and the counters the stats aggregator reads.
//! Vehicles are processed in id order so a seeded run is reproducible.

use anyhow::{bail, Context, Result};
use log::debug;
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::{BTreeMap, VecDeque};

use super::config::SimConfig;
use super::error::EngineError;
use super::road_network::SimRoadNetwork;
use super::signals::SignalController;
use super::types::{SegmentId, SimId, VehicleId};
use super::vehicle::{MovementParams, SimVehicle, VehicleUpdateResult};
use super::weather::WeatherState;

/// Upper bound on arrivals sampled in a single tick
const MAX_ARRIVALS_PER_TICK: u32 = 64;

/// What happened to the vehicle set during one tick
#[derive(Debug, Default)]
pub struct FlowReport {
    pub spawned: usize,
    pub turned_away: usize,
    pub crossed: usize,
    pub retired: usize,
    /// Bookkeeping errors; the offending vehicles were dropped
    pub violations: Vec<EngineError>,
}

#[derive(Debug, Default)]
pub struct VehicleFlow {
    vehicles: BTreeMap<VehicleId, SimVehicle>,
    next_id: usize,
    /// Simulated times of recent retirements, oldest first
    retirements: VecDeque<f64>,
    total_spawned: u64,
    total_retired: u64,
    total_turned_away: u64,
}

impl VehicleFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &SimVehicle> {
        self.vehicles.values()
    }

    pub fn get(&self, vehicle_id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles.get(&vehicle_id)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn recent_retirements(&self) -> &VecDeque<f64> {
        &self.retirements
    }

    pub fn total_spawned(&self) -> u64 {
        self.total_spawned
    }

    pub fn total_retired(&self) -> u64 {
        self.total_retired
    }

    pub fn total_turned_away(&self) -> u64 {
        self.total_turned_away
    }

    fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(SimId(self.next_id));
        self.next_id += 1;
        id
    }

    /// Spawn a vehicle on `entry` routed to leave the grid through `exit`
    pub fn spawn_vehicle(
        &mut self,
        entry: SegmentId,
        exit: SegmentId,
        desired_speed: f32,
        now: f64,
        road_network: &mut SimRoadNetwork,
    ) -> Result<VehicleId> {
        let entry_segment = road_network
            .get_segment(entry)
            .context("Entry segment not found")?;
        if !entry_segment.is_entry() {
            bail!("Segment {} is not a boundary entry", entry);
        }
        if !entry_segment.has_room() {
            bail!("Entry segment {} is full", entry);
        }
        let start = entry_segment
            .end
            .intersection()
            .context("Entry segment does not reach the grid")?;

        let finish = road_network
            .get_segment(exit)
            .filter(|s| s.is_exit())
            .and_then(|s| s.start.intersection())
            .with_context(|| format!("Segment {} is not a boundary exit", exit))?;

        let path = road_network
            .find_path(start, finish)
            .with_context(|| format!("No path from {} to {}", start, finish))?;
        let route: Vec<_> = std::iter::once(start).chain(path).collect();

        road_network.enter_segment(entry)?;

        let id = self.next_vehicle_id();
        self.vehicles.insert(
            id,
            SimVehicle::new(id, entry, route, exit, desired_speed, now),
        );
        self.total_spawned += 1;
        Ok(id)
    }

    /// Sample this tick's arrivals and place them on random entry segments.
    /// Worse weather divides the arrival rate by its jam multiplier.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn_arrivals(
        &mut self,
        delta_secs: f32,
        now: f64,
        weather: WeatherState,
        config: &SimConfig,
        road_network: &mut SimRoadNetwork,
        rng: &mut impl Rng,
        report: &mut FlowReport,
    ) {
        let lambda = (config.spawn_rate * delta_secs / weather.jam_multiplier()) as f64;
        let arrivals = sample_poisson(lambda, rng);

        for _ in 0..arrivals {
            let (Some(&entry), Some(&exit)) = (
                road_network.entry_segments().choose(rng),
                road_network.exit_segments().choose(rng),
            ) else {
                return;
            };
            let jitter = config.speed_jitter;
            let desired_speed = config.base_speed * (1.0 + rng.random_range(-jitter..=jitter));

            match self.spawn_vehicle(entry, exit, desired_speed, now, road_network) {
                Ok(_) => report.spawned += 1,
                Err(e) => {
                    debug!("Arrival turned away: {:#}", e);
                    self.total_turned_away += 1;
                    report.turned_away += 1;
                }
            }
        }
    }

    /// Move every vehicle one tick and retire those that left the grid
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        delta_secs: f32,
        now: f64,
        throughput_window: f32,
        road_network: &mut SimRoadNetwork,
        signals: &SignalController,
        params: &MovementParams,
        report: &mut FlowReport,
    ) {
        let vehicle_ids: Vec<VehicleId> = self.vehicles.keys().copied().collect();

        for vehicle_id in vehicle_ids {
            let Some(vehicle) = self.vehicles.get_mut(&vehicle_id) else {
                continue;
            };

            match vehicle.update(delta_secs, road_network, signals, params) {
                Ok(VehicleUpdateResult::Continue) => {}
                Ok(VehicleUpdateResult::Crossed(at)) => {
                    debug!("{} crossed {}", vehicle_id, at);
                    report.crossed += 1;
                }
                Ok(VehicleUpdateResult::Retire) => {
                    self.vehicles.remove(&vehicle_id);
                    self.retirements.push_back(now);
                    self.total_retired += 1;
                    report.retired += 1;
                }
                Err(e) => {
                    report.violations.push(e);
                    if let Some(vehicle) = self.vehicles.remove(&vehicle_id) {
                        if let Err(e) = road_network.leave_segment(vehicle.segment) {
                            report.violations.push(e);
                        }
                    }
                }
            }
        }

        let cutoff = now - throughput_window as f64;
        while self.retirements.front().is_some_and(|t| *t < cutoff) {
            self.retirements.pop_front();
        }
    }
}

/// Knuth's method; fine for the small per-tick rates used here
fn sample_poisson(lambda: f64, rng: &mut impl Rng) -> u32 {
    if !(lambda > 0.0) {
        return 0;
    }
    let limit = (-lambda).exp();
    let mut product: f64 = rng.random();
    let mut count = 0;
    while product > limit && count < MAX_ARRIVALS_PER_TICK {
        count += 1;
        product *= rng.random::<f64>();
    }
    count
}
