//! Per-intersection traffic light state machine
//!
//! In `Auto` mode the phase advances on a timer against the intersection's
//! `PhaseDurations`. `Manual` and `EmergencyPreempt` ignore the timer; their
//! phase changes only when the controller is told to change it.

use std::fmt;
use std::str::FromStr;

use super::error::EngineError;
use super::types::{Axis, Direction, GridCoord, IntersectionId, SegmentId};

/// Discrete traffic-light state of an intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalPhase {
    NsGreen,
    NsYellow,
    EwGreen,
    EwYellow,
    AllRed,
}

impl SignalPhase {
    pub const ALL: [SignalPhase; 5] = [
        SignalPhase::NsGreen,
        SignalPhase::NsYellow,
        SignalPhase::EwGreen,
        SignalPhase::EwYellow,
        SignalPhase::AllRed,
    ];

    /// The axis that may move in this phase; `None` for `AllRed`
    pub fn open_axis(self) -> Option<Axis> {
        match self {
            SignalPhase::NsGreen | SignalPhase::NsYellow => Some(Axis::NorthSouth),
            SignalPhase::EwGreen | SignalPhase::EwYellow => Some(Axis::EastWest),
            SignalPhase::AllRed => None,
        }
    }

    /// Whether vehicles on `axis` may enter the intersection
    pub fn allows(self, axis: Axis) -> bool {
        self.open_axis() == Some(axis)
    }

    pub fn green_for(axis: Axis) -> SignalPhase {
        match axis {
            Axis::NorthSouth => SignalPhase::NsGreen,
            Axis::EastWest => SignalPhase::EwGreen,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SignalPhase::NsGreen => "NS_GREEN",
            SignalPhase::NsYellow => "NS_YELLOW",
            SignalPhase::EwGreen => "EW_GREEN",
            SignalPhase::EwYellow => "EW_YELLOW",
            SignalPhase::AllRed => "ALL_RED",
        }
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalPhase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalPhase::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EngineError::InvalidPhase(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMode {
    Auto,
    Manual,
    EmergencyPreempt,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControlMode::Auto => "AUTO",
            ControlMode::Manual => "MANUAL",
            ControlMode::EmergencyPreempt => "EMERGENCY_PREEMPT",
        })
    }
}

/// Target length of each phase in simulated seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseDurations {
    pub ns_green: f32,
    pub ew_green: f32,
    pub yellow: f32,
    pub all_red: f32,
}

impl PhaseDurations {
    pub fn new(green: f32, yellow: f32, all_red: f32) -> Self {
        Self {
            ns_green: green,
            ew_green: green,
            yellow,
            all_red,
        }
    }

    pub fn for_phase(&self, phase: SignalPhase) -> f32 {
        match phase {
            SignalPhase::NsGreen => self.ns_green,
            SignalPhase::EwGreen => self.ew_green,
            SignalPhase::NsYellow | SignalPhase::EwYellow => self.yellow,
            SignalPhase::AllRed => self.all_red,
        }
    }

    pub fn green(&self, axis: Axis) -> f32 {
        match axis {
            Axis::NorthSouth => self.ns_green,
            Axis::EastWest => self.ew_green,
        }
    }

    /// Length of one full auto cycle
    pub fn cycle(&self) -> f32 {
        self.ns_green + self.ew_green + 2.0 * (self.yellow + self.all_red)
    }

    /// Whether both greens lie within `[floor, ceiling]`
    pub fn greens_within(&self, floor: f32, ceiling: f32) -> bool {
        [self.ns_green, self.ew_green]
            .iter()
            .all(|g| g.is_finite() && *g >= floor && *g <= ceiling)
    }
}

impl fmt::Display for PhaseDurations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NS {:.1}s / EW {:.1}s", self.ns_green, self.ew_green)
    }
}

/// A signalised intersection in the grid
#[derive(Debug, Clone)]
pub struct SimIntersection {
    pub id: IntersectionId,
    pub coord: GridCoord,
    /// Incoming segments indexed by `Direction::index`; the side they arrive from
    pub approaches: [Option<SegmentId>; 4],
    pub phase: SignalPhase,
    pub mode: ControlMode,
    pub durations: PhaseDurations,
    /// Seconds spent in the current phase (only advances in `Auto`)
    pub phase_elapsed: f32,
    /// Phase requested by a manual override, kept through emergency preemption
    pub manual_phase: Option<SignalPhase>,
    /// Axis that gets the next green after the current `AllRed`
    next_green: Axis,
}

impl SimIntersection {
    pub fn new(id: IntersectionId, coord: GridCoord, durations: PhaseDurations) -> Self {
        Self {
            id,
            coord,
            approaches: [None; 4],
            phase: SignalPhase::NsGreen,
            mode: ControlMode::Auto,
            durations,
            phase_elapsed: 0.0,
            manual_phase: None,
            next_green: Axis::EastWest,
        }
    }

    pub fn approach(&self, side: Direction) -> Option<SegmentId> {
        self.approaches[side.index()]
    }

    /// Whether traffic arriving on `axis` may cross right now
    pub fn allows(&self, axis: Axis) -> bool {
        self.phase.allows(axis)
    }

    pub fn next_green(&self) -> Axis {
        self.next_green
    }

    /// Advance the auto cycle by `delta_secs`. Does nothing outside `Auto`.
    pub fn update_timer(&mut self, delta_secs: f32) {
        if self.mode != ControlMode::Auto {
            return;
        }
        self.phase_elapsed += delta_secs;

        // Bounded so a huge delta cannot spin; each phase lasts at least its floor.
        for _ in 0..SignalPhase::ALL.len() * 4 {
            let duration = self.durations.for_phase(self.phase);
            if self.phase_elapsed < duration {
                break;
            }
            self.phase_elapsed -= duration;
            self.step_phase();
        }
    }

    fn step_phase(&mut self) {
        self.phase = match self.phase {
            SignalPhase::NsGreen => SignalPhase::NsYellow,
            SignalPhase::EwGreen => SignalPhase::EwYellow,
            SignalPhase::NsYellow => {
                self.next_green = Axis::EastWest;
                SignalPhase::AllRed
            }
            SignalPhase::EwYellow => {
                self.next_green = Axis::NorthSouth;
                SignalPhase::AllRed
            }
            SignalPhase::AllRed => SignalPhase::green_for(self.next_green),
        };
    }

    /// Restart the auto cycle at the safe `AllRed` re-entry point
    fn enter_all_red(&mut self, next_green: Axis) {
        self.mode = ControlMode::Auto;
        self.phase = SignalPhase::AllRed;
        self.phase_elapsed = 0.0;
        self.next_green = next_green;
    }

    /// Force `phase` and freeze the timer until `return_to_auto`.
    /// Under emergency preemption the request is stored and applied on release.
    pub fn force_manual(&mut self, phase: SignalPhase) {
        self.manual_phase = Some(phase);
        if self.mode == ControlMode::EmergencyPreempt {
            return;
        }
        self.mode = ControlMode::Manual;
        self.phase = phase;
        self.phase_elapsed = 0.0;
    }

    /// Drop any manual override. A manually held intersection re-enters the
    /// cycle at `AllRed`; a preempted one just forgets the pending override.
    pub fn return_to_auto(&mut self) {
        let forced = self.manual_phase.take();
        if self.mode == ControlMode::Manual {
            let next = forced
                .and_then(SignalPhase::open_axis)
                .map(Axis::other)
                .unwrap_or(self.next_green);
            self.enter_all_red(next);
        }
    }

    /// Hold the corridor axis green, cross traffic red
    pub fn preempt(&mut self, corridor: Axis) {
        self.mode = ControlMode::EmergencyPreempt;
        self.phase = SignalPhase::green_for(corridor);
        self.phase_elapsed = 0.0;
    }

    /// End preemption: back to a pending manual phase, otherwise into the
    /// auto cycle via `AllRed` with the held cross axis served first
    pub fn release_preemption(&mut self, corridor: Axis) {
        if self.mode != ControlMode::EmergencyPreempt {
            return;
        }
        match self.manual_phase {
            Some(phase) => {
                self.mode = ControlMode::Manual;
                self.phase = phase;
                self.phase_elapsed = 0.0;
            }
            None => self.enter_all_red(corridor.other()),
        }
    }
}
