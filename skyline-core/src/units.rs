//! Unit conversions shared by the provider adapters and display code.

use serde::{Deserialize, Serialize};

/// Unit system requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Celsius, wind in m/s.
    #[default]
    Metric,
    /// Fahrenheit, wind in mph.
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    /// Wind unit carried by snapshots in this unit system.
    pub fn wind_unit(&self) -> WindSpeedUnit {
        match self {
            Units::Metric => WindSpeedUnit::MetersPerSecond,
            Units::Imperial => WindSpeedUnit::MilesPerHour,
        }
    }

    pub fn temperature_symbol(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "metric" | "c" | "celsius" => Ok(Units::Metric),
            "imperial" | "f" | "fahrenheit" => Ok(Units::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported: metric, imperial."
            )),
        }
    }
}

/// Base unit of a snapshot's wind speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindSpeedUnit {
    #[serde(rename = "m/s")]
    MetersPerSecond,
    #[serde(rename = "mph")]
    MilesPerHour,
}

impl WindSpeedUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindSpeedUnit::MetersPerSecond => "m/s",
            WindSpeedUnit::MilesPerHour => "mph",
        }
    }

    /// Convert `value` expressed in this unit to meters per second.
    pub fn to_mps(&self, value: f64) -> f64 {
        match self {
            WindSpeedUnit::MetersPerSecond => value,
            WindSpeedUnit::MilesPerHour => mph_to_mps(value),
        }
    }
}

const MPS_PER_MPH: f64 = 0.44704;

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn kmh_to_mps(kmh: f64) -> f64 {
    kmh / 3.6
}

pub fn mps_to_kmh(mps: f64) -> f64 {
    mps * 3.6
}

pub fn mps_to_mph(mps: f64) -> f64 {
    mps / MPS_PER_MPH
}

pub fn mph_to_mps(mph: f64) -> f64 {
    mph * MPS_PER_MPH
}

pub fn kmh_to_mph(kmh: f64) -> f64 {
    mps_to_mph(kmh_to_mps(kmh))
}

/// 16-point compass label for a bearing in degrees.
pub fn degrees_to_compass(deg: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let normalized = deg.rem_euclid(360.0);
    let idx = (normalized / 22.5).round() as usize % POINTS.len();
    POINTS[idx]
}
