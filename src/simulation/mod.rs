//! Traffic control simulation
//!
//! Everything needed to run the engine headless: the grid road network,
//! signal state machines, vehicle flow, stats, the optimizer and the
//! engine facade that ties them together.

mod clock;
mod config;
mod engine;
mod error;
mod event_log;
mod intersection;
mod optimizer;
mod road_network;
mod segment;
mod signals;
mod stats;
mod types;
mod vehicle;
mod vehicle_flow;
mod weather;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use clock::SimClock;
pub use config::{
    EmergencyCorridor, SimConfig, DEFAULT_ALL_RED_SECS, DEFAULT_GREEN_SECS, DEFAULT_YELLOW_SECS,
};
pub use engine::{EngineCommand, EngineSnapshot, SimEngine};
pub use error::{EngineError, ErrorKind};
pub use event_log::{EventLog, LogCategory, LogEntry};
pub use intersection::{ControlMode, PhaseDurations, SignalPhase, SimIntersection};
#[allow(unused_imports)]
pub use optimizer::{AxisLoad, OptimizationReport, OptimizerSettings, Retune, SignalOptimizer};
pub use road_network::SimRoadNetwork;
#[allow(unused_imports)]
pub use road_network::{JamTransition, SegmentEdge};
pub use segment::{Endpoint, SimSegment};
#[allow(unused_imports)]
pub use segment::JamPolicy;
pub use signals::SignalController;
pub use stats::Stats;
pub use types::{Axis, Direction, GridCoord, IntersectionId, SegmentId, SimId, VehicleId};
pub use vehicle::SimVehicle;
#[allow(unused_imports)]
pub use vehicle::{MovementParams, VehicleUpdateResult};
#[allow(unused_imports)]
pub use vehicle_flow::{FlowReport, VehicleFlow};
pub use weather::WeatherState;
