//! Tunable parameters of a simulation run
//!
//! Everything here is fixed once the engine is built. Only weather, speed,
//! signal modes and optimizer-tuned green times change during a run.

use super::error::EngineError;

/// Default length of a yellow phase in simulated seconds
pub const DEFAULT_YELLOW_SECS: f32 = 3.0;
/// Default length of an all-red clearance phase in simulated seconds
pub const DEFAULT_ALL_RED_SECS: f32 = 2.0;
/// Default green time for each axis in simulated seconds
pub const DEFAULT_GREEN_SECS: f32 = 20.0;

/// Which intersections the emergency corridor runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyCorridor {
    /// Every intersection in this row, held green east-west
    Row(usize),
    /// Every intersection in this column, held green north-south
    Column(usize),
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of intersection columns
    pub grid_cols: usize,
    /// Number of intersection rows
    pub grid_rows: usize,

    /// Vehicles an internal segment holds before it counts as full
    pub segment_capacity: u32,
    /// Vehicles a boundary entry/exit segment holds
    pub boundary_capacity: u32,
    /// Fraction of a segment a free-flowing vehicle covers per simulated second
    pub base_speed: f32,
    /// Per-vehicle random spread around `base_speed` (0.1 = +/-10%)
    pub speed_jitter: f32,
    /// Speed reduction per unit of occupancy ratio
    pub congestion_penalty: f32,
    /// Lowest congestion factor; vehicles never crawl slower than this share of their speed
    pub min_crawl_factor: f32,

    /// Occupancy ratio at or above which a segment counts toward a jam
    pub jam_enter_ratio: f32,
    /// Consecutive ticks above `jam_enter_ratio` before a segment is jammed
    pub jam_enter_ticks: u32,
    /// Occupancy ratio below which a jammed segment counts toward clearing
    pub jam_clear_ratio: f32,
    /// Consecutive ticks below `jam_clear_ratio` before a jam clears
    pub jam_clear_ticks: u32,

    /// Mean vehicle arrivals per simulated second across all entry segments
    pub spawn_rate: f32,

    pub yellow_secs: f32,
    pub all_red_secs: f32,
    pub default_green_secs: f32,
    /// Shortest green time the optimizer may assign
    pub green_floor_secs: f32,
    /// Longest green time the optimizer may assign
    pub green_ceiling_secs: f32,

    /// Annealing steps per intersection
    pub optimizer_iterations: u32,
    /// Starting annealing temperature
    pub optimizer_temperature: f32,
    /// Temperature multiplier applied after each step
    pub optimizer_cooling: f32,

    pub log_capacity: usize,
    /// Simulated seconds over which throughput is averaged
    pub throughput_window_secs: f32,

    pub emergency_corridor: EmergencyCorridor,

    /// Seed for reproducible runs; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid_cols: 4,
            grid_rows: 4,
            segment_capacity: 8,
            boundary_capacity: 12,
            base_speed: 0.2,
            speed_jitter: 0.1,
            congestion_penalty: 0.8,
            min_crawl_factor: 0.15,
            jam_enter_ratio: 0.85,
            jam_enter_ticks: 5,
            jam_clear_ratio: 0.5,
            jam_clear_ticks: 5,
            spawn_rate: 1.5,
            yellow_secs: DEFAULT_YELLOW_SECS,
            all_red_secs: DEFAULT_ALL_RED_SECS,
            default_green_secs: DEFAULT_GREEN_SECS,
            green_floor_secs: 5.0,
            green_ceiling_secs: 60.0,
            optimizer_iterations: 64,
            optimizer_temperature: 0.2,
            optimizer_cooling: 0.92,
            log_capacity: 200,
            throughput_window_secs: 60.0,
            emergency_corridor: EmergencyCorridor::Row(2),
            seed: None,
        }
    }
}

impl SimConfig {
    /// A config for a `cols` x `rows` grid with the corridor through its middle row
    pub fn with_grid(cols: usize, rows: usize) -> Self {
        Self {
            grid_cols: cols,
            grid_rows: rows,
            emergency_corridor: EmergencyCorridor::Row(rows / 2),
            ..Self::default()
        }
    }

    /// Reject configurations the engine cannot run
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.grid_cols == 0 || self.grid_rows == 0 {
            return fail(format!(
                "grid must be at least 1x1, got {}x{}",
                self.grid_cols, self.grid_rows
            ));
        }
        if self.segment_capacity == 0 || self.boundary_capacity == 0 {
            return fail("segment capacities must be positive".to_string());
        }
        if !(self.base_speed > 0.0) {
            return fail(format!("base speed must be positive, got {}", self.base_speed));
        }
        if !(0.0..1.0).contains(&self.speed_jitter) {
            return fail(format!("speed jitter must be in [0, 1), got {}", self.speed_jitter));
        }
        if self.congestion_penalty < 0.0 {
            return fail("congestion penalty must not be negative".to_string());
        }
        if !(self.min_crawl_factor > 0.0 && self.min_crawl_factor <= 1.0) {
            return fail(format!(
                "crawl factor must be in (0, 1], got {}",
                self.min_crawl_factor
            ));
        }
        if self.jam_clear_ratio > self.jam_enter_ratio {
            return fail(format!(
                "jam clear ratio {} is above enter ratio {}",
                self.jam_clear_ratio, self.jam_enter_ratio
            ));
        }
        if self.jam_enter_ticks == 0 || self.jam_clear_ticks == 0 {
            return fail("jam hysteresis windows must be at least one tick".to_string());
        }
        if self.spawn_rate < 0.0 || !self.spawn_rate.is_finite() {
            return fail(format!("spawn rate must be non-negative, got {}", self.spawn_rate));
        }
        if !(self.yellow_secs > 0.0 && self.all_red_secs > 0.0) {
            return fail("yellow and all-red phases must be positive".to_string());
        }
        if !(self.green_floor_secs > 0.0) || self.green_floor_secs > self.green_ceiling_secs {
            return fail(format!(
                "green floor {} must be positive and below ceiling {}",
                self.green_floor_secs, self.green_ceiling_secs
            ));
        }
        if self.default_green_secs < self.green_floor_secs
            || self.default_green_secs > self.green_ceiling_secs
        {
            return fail(format!(
                "default green {} lies outside [{}, {}]",
                self.default_green_secs, self.green_floor_secs, self.green_ceiling_secs
            ));
        }
        if !(self.optimizer_cooling > 0.0 && self.optimizer_cooling <= 1.0) {
            return fail("optimizer cooling must be in (0, 1]".to_string());
        }
        if self.log_capacity == 0 {
            return fail("log capacity must be positive".to_string());
        }
        if !(self.throughput_window_secs > 0.0) {
            return fail("throughput window must be positive".to_string());
        }
        match self.emergency_corridor {
            EmergencyCorridor::Row(row) if row >= self.grid_rows => {
                return fail(format!("emergency row {} is outside the grid", row));
            }
            EmergencyCorridor::Column(col) if col >= self.grid_cols => {
                return fail(format!("emergency column {} is outside the grid", col));
            }
            _ => {}
        }

        Ok(())
    }
}
