//! Vehicle movement logic for the traffic simulation

use super::error::EngineError;
use super::road_network::SimRoadNetwork;
use super::signals::SignalController;
use super::types::{IntersectionId, SegmentId, VehicleId, SEGMENT_END};

/// Result of a vehicle update indicating what action should be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    Continue,                   // Still on the same segment (moving or queued)
    Crossed(IntersectionId),    // Moved through an intersection onto the next segment
    Retire,                     // Reached the end of its exit segment
}

/// Per-tick movement inputs shared by all vehicles
#[derive(Debug, Clone, Copy)]
pub struct MovementParams {
    /// Current weather speed multiplier
    pub weather_speed: f32,
    pub congestion_penalty: f32,
    pub min_crawl_factor: f32,
}

impl MovementParams {
    /// Linear slowdown with occupancy ratio, floored at the crawl factor
    pub fn congestion_factor(&self, density: f32) -> f32 {
        (1.0 - self.congestion_penalty * density).max(self.min_crawl_factor)
    }
}

#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub segment: SegmentId,
    /// 0.0 at segment entry, 1.0 at its end
    pub position: f32,
    /// Speed applied on the last tick, in segment fractions per second
    pub speed: f32,
    /// Free-flow speed before weather and congestion
    pub desired_speed: f32,
    /// Intersections still to cross; the first is the end of `segment`
    pub route: Vec<IntersectionId>,
    /// Boundary segment the route finishes on
    pub exit_segment: SegmentId,
    /// Queued at the end of its segment behind a red light or a full segment
    pub waiting: bool,
    /// Total simulated seconds spent waiting
    pub wait_time: f32,
    pub spawned_at: f64,
}

impl SimVehicle {
    pub fn new(
        id: VehicleId,
        segment: SegmentId,
        route: Vec<IntersectionId>,
        exit_segment: SegmentId,
        desired_speed: f32,
        spawned_at: f64,
    ) -> Self {
        Self {
            id,
            segment,
            position: 0.0,
            speed: 0.0,
            desired_speed,
            route,
            exit_segment,
            waiting: false,
            wait_time: 0.0,
            spawned_at,
        }
    }

    /// Advance along the current segment and try to cross at its end
    pub fn update(
        &mut self,
        delta_secs: f32,
        road_network: &mut SimRoadNetwork,
        signals: &SignalController,
        params: &MovementParams,
    ) -> Result<VehicleUpdateResult, EngineError> {
        let segment = road_network.get_segment(self.segment).ok_or_else(|| {
            EngineError::InvariantViolation(format!(
                "vehicle {} is on unknown segment {}",
                self.id, self.segment
            ))
        })?;
        let (density, speed_limit, is_exit, end, approach) = (
            segment.density(),
            segment.speed_limit,
            segment.is_exit(),
            segment.end,
            segment.approach,
        );

        if self.position < SEGMENT_END {
            let speed = (self.desired_speed
                * params.weather_speed
                * params.congestion_factor(density))
            .min(speed_limit);
            self.speed = speed;
            self.position = (self.position + speed * delta_secs).min(SEGMENT_END);
            if self.position < SEGMENT_END {
                return Ok(VehicleUpdateResult::Continue);
            }
        }

        if is_exit {
            if !self.route.is_empty() {
                return Err(EngineError::InvariantViolation(format!(
                    "vehicle {} reached the boundary with {} intersections left",
                    self.id,
                    self.route.len()
                )));
            }
            road_network.leave_segment(self.segment)?;
            return Ok(VehicleUpdateResult::Retire);
        }

        let (Some(at), Some(approach)) = (end.intersection(), approach) else {
            return Err(EngineError::InvariantViolation(format!(
                "segment {} has no end intersection",
                self.segment
            )));
        };
        if self.route.first() != Some(&at) {
            return Err(EngineError::InvariantViolation(format!(
                "vehicle {} route does not continue from {}",
                self.id, at
            )));
        }

        let next_segment = match self.route.get(1) {
            Some(next) => road_network.find_segment_between(at, *next).map_err(|e| {
                EngineError::InvariantViolation(format!("vehicle {}: {:#}", self.id, e))
            })?,
            None => self.exit_segment,
        };

        let has_room = road_network
            .get_segment(next_segment)
            .is_some_and(|s| s.has_room());

        if signals.allows_crossing(at, approach.axis()) && has_room {
            road_network.leave_segment(self.segment)?;
            road_network.enter_segment(next_segment)?;
            self.route.remove(0);
            self.segment = next_segment;
            self.position = 0.0;
            self.waiting = false;
            return Ok(VehicleUpdateResult::Crossed(at));
        }

        self.waiting = true;
        self.speed = 0.0;
        self.position = SEGMENT_END;
        self.wait_time += delta_secs;
        Ok(VehicleUpdateResult::Continue)
    }
}
