//! Weather conditions and their effect on traffic

use std::fmt;
use std::str::FromStr;

/// Process-wide weather, set only by explicit user action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeatherState {
    #[default]
    Clear,
    Rain,
    Fog,
    Snow,
}

impl WeatherState {
    pub const ALL: [WeatherState; 4] = [
        WeatherState::Clear,
        WeatherState::Rain,
        WeatherState::Fog,
        WeatherState::Snow,
    ];

    /// Multiplier applied to vehicle speeds and segment speed limits (<= 1.0)
    pub fn speed_multiplier(self) -> f32 {
        match self {
            WeatherState::Clear => 1.0,
            WeatherState::Rain => 0.8,
            WeatherState::Fog => 0.65,
            WeatherState::Snow => 0.5,
        }
    }

    /// Multiplier on jam likelihood (>= 1.0).
    /// Scales the density used for jam detection and divides the spawn rate.
    pub fn jam_multiplier(self) -> f32 {
        match self {
            WeatherState::Clear => 1.0,
            WeatherState::Rain => 1.15,
            WeatherState::Fog => 1.25,
            WeatherState::Snow => 1.5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            WeatherState::Clear => "CLEAR",
            WeatherState::Rain => "RAIN",
            WeatherState::Fog => "FOG",
            WeatherState::Snow => "SNOW",
        }
    }
}

impl fmt::Display for WeatherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WeatherState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WeatherState::ALL
            .into_iter()
            .find(|w| w.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown weather {:?}", s))
    }
}
