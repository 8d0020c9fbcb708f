//! Derived traffic statistics
//!
//! `Stats` is recomputed from scratch at the end of every tick. Nothing
//! writes to it afterwards.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};

use super::road_network::SimRoadNetwork;
use super::signals::SignalController;
use super::types::SegmentId;
use super::vehicle_flow::VehicleFlow;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    /// Total occupancy over total capacity across every segment
    pub overall_density: f32,
    pub segment_density: BTreeMap<SegmentId, f32>,
    /// Mirrors the signal controller's emergency flag
    pub emergency_active: bool,
    /// Mean accumulated wait of the vehicles currently on the grid
    pub average_wait_time: f32,
    /// Vehicles retired per simulated second over the throughput window
    pub throughput: f32,
    pub jammed_segments: BTreeSet<SegmentId>,
    pub active_vehicles: usize,
    pub waiting_vehicles: usize,
    pub total_spawned: u64,
    pub total_retired: u64,
    pub total_turned_away: u64,
}

impl Stats {
    /// Read-only pass over the settled tick state
    pub fn compute(
        road_network: &SimRoadNetwork,
        flow: &VehicleFlow,
        signals: &SignalController,
        now: f64,
        throughput_window: f32,
    ) -> Stats {
        let mut occupancy: u64 = 0;
        let mut capacity: u64 = 0;
        let mut segment_density = BTreeMap::new();
        let mut jammed_segments = BTreeSet::new();

        for segment in road_network.segments() {
            occupancy += segment.occupancy as u64;
            capacity += segment.capacity as u64;
            segment_density.insert(segment.id, segment.density());
            if segment.jammed {
                jammed_segments.insert(segment.id);
            }
        }

        let overall_density = if capacity > 0 {
            occupancy as f32 / capacity as f32
        } else {
            0.0
        };

        let active_vehicles = flow.len();
        let waiting_vehicles = flow.vehicles().filter(|v| v.waiting).count();
        let average_wait_time = if active_vehicles > 0 {
            flow.vehicles().map(|v| v.wait_time).sum::<f32>() / active_vehicles as f32
        } else {
            0.0
        };

        // Early in a run the window has not filled yet
        let window = (throughput_window as f64).min(now);
        let throughput = if window > 0.0 {
            let cutoff = now - throughput_window as f64;
            let recent = flow
                .recent_retirements()
                .iter()
                .filter(|t| **t >= cutoff)
                .count();
            (recent as f64 / window) as f32
        } else {
            0.0
        };

        Stats {
            overall_density,
            segment_density,
            emergency_active: signals.emergency_active(),
            average_wait_time,
            throughput,
            jammed_segments,
            active_vehicles,
            waiting_vehicles,
            total_spawned: flow.total_spawned(),
            total_retired: flow.total_retired(),
            total_turned_away: flow.total_turned_away(),
        }
    }

    pub fn density_of(&self, segment_id: SegmentId) -> f32 {
        self.segment_density.get(&segment_id).copied().unwrap_or(0.0)
    }

    /// The `count` densest segments, densest first
    pub fn most_congested(&self, count: usize) -> Vec<(SegmentId, f32)> {
        let mut ranked: Vec<(SegmentId, f32)> = self
            .segment_density
            .iter()
            .filter(|(_, density)| **density > 0.0)
            .map(|(id, density)| (*id, *density))
            .collect();
        ranked.sort_by_key(|(id, density)| (std::cmp::Reverse(OrderedFloat(*density)), *id));
        ranked.truncate(count);
        ranked
    }
}
