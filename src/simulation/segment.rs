//! Directional road segments and their jam hysteresis

use super::error::EngineError;
use super::types::{Direction, IntersectionId, SegmentId};

/// Where a segment begins or ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Intersection(IntersectionId),
    /// Edge of the simulated area
    Boundary,
}

impl Endpoint {
    pub fn intersection(self) -> Option<IntersectionId> {
        match self {
            Endpoint::Intersection(id) => Some(id),
            Endpoint::Boundary => None,
        }
    }
}

/// Thresholds for flagging and clearing jams
#[derive(Debug, Clone, Copy)]
pub struct JamPolicy {
    pub enter_ratio: f32,
    pub enter_ticks: u32,
    pub clear_ratio: f32,
    pub clear_ticks: u32,
}

/// A one-way road link
#[derive(Debug, Clone)]
pub struct SimSegment {
    pub id: SegmentId,
    pub start: Endpoint,
    pub end: Endpoint,
    /// Side of the end intersection this segment arrives on
    pub approach: Option<Direction>,
    pub capacity: u32,
    /// Vehicles currently on the segment. May exceed `capacity` transiently.
    pub occupancy: u32,
    pub jammed: bool,
    /// Free-flow speed limit in segment fractions per second
    pub base_speed_limit: f32,
    /// `base_speed_limit` scaled by the current weather
    pub speed_limit: f32,
    ticks_above: u32,
    ticks_below: u32,
}

impl SimSegment {
    pub fn new(
        id: SegmentId,
        start: Endpoint,
        end: Endpoint,
        approach: Option<Direction>,
        capacity: u32,
        base_speed_limit: f32,
    ) -> Self {
        Self {
            id,
            start,
            end,
            approach,
            capacity,
            occupancy: 0,
            jammed: false,
            base_speed_limit,
            speed_limit: base_speed_limit,
            ticks_above: 0,
            ticks_below: 0,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.start == Endpoint::Boundary
    }

    pub fn is_exit(&self) -> bool {
        self.end == Endpoint::Boundary
    }

    /// Occupancy-to-capacity ratio
    pub fn density(&self) -> f32 {
        self.occupancy as f32 / self.capacity as f32
    }

    pub fn has_room(&self) -> bool {
        self.occupancy < self.capacity
    }

    pub fn enter(&mut self) {
        self.occupancy += 1;
    }

    pub fn leave(&mut self) -> Result<(), EngineError> {
        if self.occupancy == 0 {
            return Err(EngineError::InvariantViolation(format!(
                "vehicle left empty segment {}",
                self.id
            )));
        }
        self.occupancy -= 1;
        Ok(())
    }

    /// Feed one tick of observed pressure into the hysteresis counters.
    /// Returns the new jam flag when it flipped this tick.
    pub fn observe(&mut self, pressure: f32, policy: &JamPolicy) -> Option<bool> {
        if pressure >= policy.enter_ratio {
            self.ticks_above += 1;
            self.ticks_below = 0;
        } else if pressure < policy.clear_ratio {
            self.ticks_below += 1;
            self.ticks_above = 0;
        } else {
            self.ticks_above = 0;
            self.ticks_below = 0;
        }

        if !self.jammed && self.ticks_above >= policy.enter_ticks {
            self.jammed = true;
            self.ticks_above = 0;
            return Some(true);
        }
        if self.jammed && self.ticks_below >= policy.clear_ticks {
            self.jammed = false;
            self.ticks_below = 0;
            return Some(false);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::SimId;

    const POLICY: JamPolicy = JamPolicy {
        enter_ratio: 0.85,
        enter_ticks: 3,
        clear_ratio: 0.5,
        clear_ticks: 2,
    };

    fn segment() -> SimSegment {
        SimSegment::new(
            SegmentId(SimId(0)),
            Endpoint::Boundary,
            Endpoint::Boundary,
            None,
            10,
            0.2,
        )
    }

    #[test]
    fn jam_needs_full_window() {
        let mut seg = segment();
        assert_eq!(seg.observe(1.0, &POLICY), None);
        assert_eq!(seg.observe(1.0, &POLICY), None);
        // interrupted streak starts over
        assert_eq!(seg.observe(0.7, &POLICY), None);
        assert_eq!(seg.observe(1.0, &POLICY), None);
        assert_eq!(seg.observe(1.0, &POLICY), None);
        assert_eq!(seg.observe(1.0, &POLICY), Some(true));
        assert!(seg.jammed);
        assert_eq!(seg.observe(1.0, &POLICY), None);
    }

    #[test]
    fn jam_clears_after_low_window() {
        let mut seg = segment();
        for _ in 0..3 {
            seg.observe(0.9, &POLICY);
        }
        assert!(seg.jammed);
        // between the thresholds holds the jam
        for _ in 0..10 {
            assert_eq!(seg.observe(0.6, &POLICY), None);
        }
        assert_eq!(seg.observe(0.1, &POLICY), None);
        assert_eq!(seg.observe(0.1, &POLICY), Some(false));
    }

    #[test]
    fn leaving_empty_segment_is_an_invariant_violation() {
        let mut seg = segment();
        assert!(seg.leave().is_err());
        seg.enter();
        assert!(seg.leave().is_ok());
        assert_eq!(seg.occupancy, 0);
    }
}
