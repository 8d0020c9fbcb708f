//! Signal controller: owns every intersection's light state machine plus the
//! process-wide emergency flag

use std::collections::BTreeMap;

use super::config::EmergencyCorridor;
use super::error::EngineError;
use super::intersection::{ControlMode, SignalPhase, SimIntersection};
use super::types::{Axis, IntersectionId};

pub struct SignalController {
    intersections: BTreeMap<IntersectionId, SimIntersection>,
    emergency_active: bool,
    /// Intersections on the emergency route and the axis held green there
    corridor: Vec<(IntersectionId, Axis)>,
}

impl SignalController {
    pub fn new(intersections: Vec<SimIntersection>, corridor: EmergencyCorridor) -> Self {
        let corridor = intersections
            .iter()
            .filter_map(|ix| match corridor {
                EmergencyCorridor::Row(row) if ix.coord.row == row => {
                    Some((ix.id, Axis::EastWest))
                }
                EmergencyCorridor::Column(col) if ix.coord.col == col => {
                    Some((ix.id, Axis::NorthSouth))
                }
                _ => None,
            })
            .collect();

        Self {
            intersections: intersections.into_iter().map(|ix| (ix.id, ix)).collect(),
            emergency_active: false,
            corridor,
        }
    }

    pub fn get(&self, intersection_id: IntersectionId) -> Option<&SimIntersection> {
        self.intersections.get(&intersection_id)
    }

    pub fn get_mut(&mut self, intersection_id: IntersectionId) -> Option<&mut SimIntersection> {
        self.intersections.get_mut(&intersection_id)
    }

    pub fn contains(&self, intersection_id: IntersectionId) -> bool {
        self.intersections.contains_key(&intersection_id)
    }

    pub fn intersections(&self) -> impl Iterator<Item = &SimIntersection> {
        self.intersections.values()
    }

    pub fn emergency_active(&self) -> bool {
        self.emergency_active
    }

    pub fn corridor(&self) -> &[(IntersectionId, Axis)] {
        &self.corridor
    }

    /// Whether traffic on `axis` may cross `intersection_id` right now
    pub fn allows_crossing(&self, intersection_id: IntersectionId, axis: Axis) -> bool {
        self.intersections
            .get(&intersection_id)
            .is_some_and(|ix| ix.allows(axis))
    }

    /// Advance every auto-mode state machine
    pub fn update(&mut self, delta_secs: f32) {
        for intersection in self.intersections.values_mut() {
            intersection.update_timer(delta_secs);
        }
    }

    pub fn set_light_state_manually(
        &mut self,
        intersection_id: IntersectionId,
        phase: SignalPhase,
    ) -> Result<ControlMode, EngineError> {
        let intersection = self
            .intersections
            .get_mut(&intersection_id)
            .ok_or(EngineError::UnknownIntersection(intersection_id))?;
        intersection.force_manual(phase);
        Ok(intersection.mode)
    }

    pub fn return_to_auto(
        &mut self,
        intersection_id: IntersectionId,
    ) -> Result<ControlMode, EngineError> {
        let intersection = self
            .intersections
            .get_mut(&intersection_id)
            .ok_or(EngineError::UnknownIntersection(intersection_id))?;
        intersection.return_to_auto();
        Ok(intersection.mode)
    }

    /// Switch emergency preemption on or off along the corridor.
    /// Returns the intersections whose state changed; empty when the flag
    /// already had the requested value.
    pub fn set_emergency(&mut self, active: bool) -> Vec<IntersectionId> {
        if active == self.emergency_active {
            return Vec::new();
        }
        self.emergency_active = active;

        let mut affected = Vec::with_capacity(self.corridor.len());
        for (id, axis) in &self.corridor {
            if let Some(intersection) = self.intersections.get_mut(id) {
                if active {
                    intersection.preempt(*axis);
                } else {
                    intersection.release_preemption(*axis);
                }
                affected.push(*id);
            }
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::config::SimConfig;
    use crate::simulation::road_network::SimRoadNetwork;
    use crate::simulation::types::{GridCoord, SimId};

    fn controller() -> SignalController {
        let config = SimConfig::with_grid(3, 3);
        let (_, intersections) = SimRoadNetwork::build_grid(&config);
        SignalController::new(intersections, config.emergency_corridor)
    }

    #[test]
    fn corridor_follows_configured_row() {
        let signals = controller();
        assert_eq!(signals.corridor().len(), 3);
        for (id, axis) in signals.corridor() {
            assert_eq!(signals.get(*id).unwrap().coord.row, 1);
            assert_eq!(*axis, Axis::EastWest);
        }
    }

    #[test]
    fn unknown_intersection_is_rejected() {
        let mut signals = controller();
        let missing = IntersectionId(SimId(99));
        assert_eq!(
            signals.set_light_state_manually(missing, SignalPhase::AllRed),
            Err(EngineError::UnknownIntersection(missing))
        );
        assert!(signals.return_to_auto(missing).is_err());
    }

    #[test]
    fn emergency_holds_corridor_green_and_releases_to_all_red() {
        let mut signals = controller();
        let affected = signals.set_emergency(true);
        assert_eq!(affected.len(), 3);
        for id in &affected {
            let ix = signals.get(*id).unwrap();
            assert_eq!(ix.mode, ControlMode::EmergencyPreempt);
            assert_eq!(ix.phase, SignalPhase::EwGreen);
        }

        // timers are ignored while preempted
        signals.update(500.0);
        assert!(affected
            .iter()
            .all(|id| signals.get(*id).unwrap().phase == SignalPhase::EwGreen));

        signals.set_emergency(false);
        for id in &affected {
            let ix = signals.get(*id).unwrap();
            assert_eq!(ix.mode, ControlMode::Auto);
            assert_eq!(ix.phase, SignalPhase::AllRed);
        }
        signals.update(2.5);
        for id in &affected {
            assert_eq!(signals.get(*id).unwrap().phase, SignalPhase::NsGreen);
        }
    }

    #[test]
    fn repeated_toggle_is_idempotent() {
        let mut signals = controller();
        assert!(!signals.set_emergency(true).is_empty());
        assert!(signals.set_emergency(true).is_empty());
        assert!(!signals.set_emergency(false).is_empty());
        assert!(signals.set_emergency(false).is_empty());
    }

    #[test]
    fn off_corridor_intersections_keep_cycling() {
        let mut signals = controller();
        signals.set_emergency(true);
        let corner = IntersectionId(SimId(0));
        assert_eq!(signals.get(corner).unwrap().coord, GridCoord::new(0, 0));
        assert_eq!(signals.get(corner).unwrap().mode, ControlMode::Auto);
    }
}
