//! Simulation clock
//!
//! Turns wall-clock tick requests into simulated time, honouring the pause
//! flag and the speed multiplier.

use super::error::EngineError;

#[derive(Debug, Clone)]
pub struct SimClock {
    running: bool,
    speed: f32,
    /// Simulated seconds elapsed since the engine was built
    time: f64,
    /// Number of ticks that actually advanced the simulation
    ticks: u64,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    /// A paused clock at time zero running at normal speed
    pub fn new() -> Self {
        Self {
            running: false,
            speed: 1.0,
            time: 0.0,
            ticks: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Check a speed multiplier without applying it
    pub fn validate_speed(multiplier: f32) -> Result<(), EngineError> {
        if multiplier.is_finite() && multiplier > 0.0 {
            Ok(())
        } else {
            Err(EngineError::InvalidSpeed(multiplier))
        }
    }

    pub fn set_speed(&mut self, multiplier: f32) -> Result<(), EngineError> {
        Self::validate_speed(multiplier)?;
        self.speed = multiplier;
        Ok(())
    }

    /// Advance by `delta` wall seconds.
    /// Returns the simulated seconds that elapsed, or `None` while paused.
    pub fn tick(&mut self, delta: f32) -> Option<f32> {
        if !self.running || !(delta > 0.0) {
            return None;
        }
        let scaled = delta * self.speed;
        self.time += scaled as f64;
        self.ticks += 1;
        Some(scaled)
    }
}
