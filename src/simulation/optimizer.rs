//! "Quantum" signal optimizer
//!
//! A randomized local search over each intersection's green times. Several
//! independent annealing walkers explore the space and the cheapest result
//! wins. Nothing here is quantum beyond the name.

use ordered_float::OrderedFloat;
use rand::Rng;

use super::config::SimConfig;
use super::intersection::{ControlMode, PhaseDurations, SimIntersection};
use super::signals::SignalController;
use super::stats::Stats;
use super::types::{Axis, IntersectionId};

/// Independent annealing runs per intersection
const WALKERS: usize = 3;
/// Largest green-time change tried in one step, in seconds
const MAX_STEP_SECS: f32 = 5.0;
/// Extra load an approach carries while its segment is jammed
const JAM_LOAD: f32 = 1.0;
/// Weight of the cycle-length term in the cost
const CYCLE_WEIGHT: f32 = 0.05;
/// Green changes smaller than this are not worth applying
const MIN_CHANGE_SECS: f32 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct OptimizerSettings {
    pub green_floor: f32,
    pub green_ceiling: f32,
    pub iterations: u32,
    pub temperature: f32,
    pub cooling: f32,
}

impl OptimizerSettings {
    pub fn from_config(config: &SimConfig) -> Self {
        Self {
            green_floor: config.green_floor_secs,
            green_ceiling: config.green_ceiling_secs,
            iterations: config.optimizer_iterations,
            temperature: config.optimizer_temperature,
            cooling: config.optimizer_cooling,
        }
    }

    fn clamp(&self, green: f32) -> f32 {
        green.clamp(self.green_floor, self.green_ceiling)
    }
}

/// One intersection whose green times were replaced
#[derive(Debug, Clone, PartialEq)]
pub struct Retune {
    pub intersection: IntersectionId,
    pub old: PhaseDurations,
    pub new: PhaseDurations,
}

#[derive(Debug, Clone, Default)]
pub struct OptimizationReport {
    pub retuned: Vec<Retune>,
    /// Auto intersections where no better timing was found
    pub unchanged: Vec<IntersectionId>,
    /// Intersections left alone because they are not in `Auto`
    pub skipped: Vec<(IntersectionId, ControlMode)>,
}

/// Demand on each axis of one intersection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLoad {
    pub north_south: f32,
    pub east_west: f32,
}

impl AxisLoad {
    pub fn of(intersection: &SimIntersection, stats: &Stats) -> Self {
        let load = |axis: Axis| -> f32 {
            axis.approaches()
                .iter()
                .filter_map(|side| intersection.approach(*side))
                .map(|segment| {
                    let jam = if stats.jammed_segments.contains(&segment) {
                        JAM_LOAD
                    } else {
                        0.0
                    };
                    stats.density_of(segment) + jam
                })
                .sum()
        };
        Self {
            north_south: load(Axis::NorthSouth),
            east_west: load(Axis::EastWest),
        }
    }

    pub fn total(&self) -> f32 {
        self.north_south + self.east_west
    }
}

pub struct SignalOptimizer {
    settings: OptimizerSettings,
}

impl SignalOptimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Congestion cost of a timing plan: each axis's load weighted by the
    /// share of the cycle it spends red, plus a small penalty on long cycles
    pub fn cost(&self, durations: &PhaseDurations, load: &AxisLoad) -> f32 {
        let cycle = durations.cycle();
        let red_ns = cycle - durations.ns_green - durations.yellow;
        let red_ew = cycle - durations.ew_green - durations.yellow;
        let max_cycle =
            2.0 * (self.settings.green_ceiling + durations.yellow + durations.all_red);
        (load.north_south * red_ns + load.east_west * red_ew) / cycle
            + CYCLE_WEIGHT * cycle / max_cycle
    }

    /// Search for cheaper green times starting from `start`.
    /// The result always has both greens within `[floor, ceiling]`.
    pub fn propose(
        &self,
        start: &PhaseDurations,
        load: &AxisLoad,
        rng: &mut impl Rng,
    ) -> PhaseDurations {
        let mut origin = *start;
        origin.ns_green = self.settings.clamp(origin.ns_green);
        origin.ew_green = self.settings.clamp(origin.ew_green);

        let walkers: Vec<(f32, PhaseDurations)> = (0..WALKERS)
            .map(|_| self.anneal(origin, load, rng))
            .collect();

        walkers
            .into_iter()
            .chain(std::iter::once((self.cost(&origin, load), origin)))
            .min_by_key(|(cost, _)| OrderedFloat(*cost))
            .map(|(_, durations)| durations)
            .unwrap_or(origin)
    }

    fn anneal(
        &self,
        origin: PhaseDurations,
        load: &AxisLoad,
        rng: &mut impl Rng,
    ) -> (f32, PhaseDurations) {
        let mut current = origin;
        let mut current_cost = self.cost(&current, load);
        let mut best = (current_cost, current);
        let mut temperature = self.settings.temperature.max(f32::EPSILON);

        for _ in 0..self.settings.iterations {
            let mut candidate = current;
            let step = rng.random_range(-MAX_STEP_SECS..=MAX_STEP_SECS);
            if rng.random_bool(0.5) {
                candidate.ns_green = self.settings.clamp(candidate.ns_green + step);
            } else {
                candidate.ew_green = self.settings.clamp(candidate.ew_green + step);
            }

            let candidate_cost = self.cost(&candidate, load);
            let delta = candidate_cost - current_cost;
            if delta <= 0.0 || rng.random::<f32>() < (-delta / temperature).exp() {
                current = candidate;
                current_cost = candidate_cost;
                if current_cost < best.0 {
                    best = (current_cost, current);
                }
            }
            temperature = (temperature * self.settings.cooling).max(f32::EPSILON);
        }

        best
    }

    /// Retune every `Auto` intersection from the latest stats.
    /// Each intersection gets its whole new timing plan or none of it.
    pub fn optimize(
        &self,
        signals: &mut SignalController,
        stats: &Stats,
        rng: &mut impl Rng,
    ) -> OptimizationReport {
        let mut report = OptimizationReport::default();
        let ids: Vec<IntersectionId> = signals.intersections().map(|ix| ix.id).collect();

        for id in ids {
            let Some(intersection) = signals.get_mut(id) else {
                continue;
            };
            if intersection.mode != ControlMode::Auto {
                report.skipped.push((id, intersection.mode));
                continue;
            }

            let load = AxisLoad::of(intersection, stats);
            if load.total() <= 0.0 {
                report.unchanged.push(id);
                continue;
            }

            let old = intersection.durations;
            let new = self.propose(&old, &load, rng);
            let changed = (new.ns_green - old.ns_green).abs() >= MIN_CHANGE_SECS
                || (new.ew_green - old.ew_green).abs() >= MIN_CHANGE_SECS;

            if !changed
                || !new.greens_within(self.settings.green_floor, self.settings.green_ceiling)
            {
                report.unchanged.push(id);
                continue;
            }

            intersection.durations = new;
            report.retuned.push(Retune {
                intersection: id,
                old,
                new,
            });
        }

        report
    }
}
