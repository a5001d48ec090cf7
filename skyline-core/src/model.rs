use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    provider::ProviderId,
    units::{self, Units, WindSpeedUnit},
};

/// Standard sea-level pressure, offered to callers that need a number when a
/// provider did not report pressure.
pub const STANDARD_PRESSURE_HPA: f64 = 1013.25;

/// Geographic coordinate pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build a coordinate pair, rejecting values outside the valid ranges.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self { latitude, longitude })
    }

    /// Short "lat, lon" label used when no place name is known.
    pub fn label(&self) -> String {
        format!("{:.2}, {:.2}", self.latitude, self.longitude)
    }
}

/// A free-text place, optionally qualified with a region or country after a comma.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceQuery {
    pub name: String,
    pub qualifier: Option<String>,
}

impl PlaceQuery {
    /// Parse user input such as `"Paris"` or `"Paris, FR"`. Returns `None` when
    /// nothing but whitespace (or a bare qualifier) was given.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (name, qualifier) = match trimmed.split_once(',') {
            Some((name, rest)) => (name.trim(), Some(rest.trim())),
            None => (trimmed, None),
        };

        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            qualifier: qualifier.filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Fill in `region` as the qualifier when the caller gave none.
    pub fn with_default_region(&self, region: Option<&str>) -> PlaceQuery {
        let mut biased = self.clone();
        if biased.qualifier.is_none() {
            biased.qualifier = region
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string);
        }
        biased
    }

    /// `name,qualifier` form accepted by the primary provider.
    pub fn as_query_string(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{},{}", self.name, q),
            None => self.name.clone(),
        }
    }

    /// ISO 3166-1 alpha-2 code, when the last qualifier segment looks like one.
    pub fn country_code(&self) -> Option<String> {
        let last = self.qualifier.as_deref()?.rsplit(',').next()?.trim();
        (last.len() == 2 && last.chars().all(|c| c.is_ascii_alphabetic()))
            .then(|| last.to_ascii_uppercase())
    }
}

impl std::fmt::Display for PlaceQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}, {}", self.name, q),
            None => f.write_str(&self.name),
        }
    }
}

/// Input to a single resolution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocationQuery {
    Place(PlaceQuery),
    Coordinates(Coordinates),
}

impl std::fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationQuery::Place(place) => place.fmt(f),
            LocationQuery::Coordinates(c) => write!(f, "{:.4},{:.4}", c.latitude, c.longitude),
        }
    }
}

/// One day of the forecast strip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub precipitation_probability_pct: Option<u8>,
    /// WMO weather interpretation code.
    pub condition_code: Option<i32>,
}

/// Whether the resolved place is currently in daylight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPhase {
    Day,
    Night,
    /// The source provider did not report sunrise/sunset.
    Unknown,
}

/// Provider-agnostic weather result.
///
/// Temperatures are in the unit system named by `units`; wind speed is in
/// `wind_speed_unit` (m/s for metric, mph for imperial) regardless of which
/// provider produced the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location_name: String,
    pub coordinates: Option<Coordinates>,
    pub timezone_offset_seconds: i32,
    pub units: Units,
    pub temperature_current: f64,
    pub temperature_feels_like: Option<f64>,
    pub humidity_pct: u8,
    pub pressure_hpa: Option<f64>,
    pub wind_speed: f64,
    pub wind_speed_unit: WindSpeedUnit,
    pub wind_direction_deg: Option<u16>,
    pub condition_main: String,
    pub condition_description: String,
    pub condition_icon: Option<String>,
    pub sunrise_epoch: Option<i64>,
    pub sunset_epoch: Option<i64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub daily_forecast: Option<Vec<DailyForecast>>,
    pub source: ProviderId,
}

impl WeatherSnapshot {
    pub fn wind_speed_mps(&self) -> f64 {
        self.wind_speed_unit.to_mps(self.wind_speed)
    }

    pub fn wind_speed_kmh(&self) -> f64 {
        units::mps_to_kmh(self.wind_speed_mps())
    }

    pub fn wind_speed_mph(&self) -> f64 {
        units::mps_to_mph(self.wind_speed_mps())
    }

    pub fn wind_compass(&self) -> Option<&'static str> {
        self.wind_direction_deg
            .map(|deg| units::degrees_to_compass(f64::from(deg)))
    }

    pub fn pressure_hpa_or_standard(&self) -> f64 {
        self.pressure_hpa.unwrap_or(STANDARD_PRESSURE_HPA)
    }

    /// Day/night at `now_epoch`, or `Unknown` when sunrise/sunset are unavailable.
    pub fn day_phase(&self, now_epoch: i64) -> DayPhase {
        match (self.sunrise_epoch, self.sunset_epoch) {
            (Some(rise), Some(set)) if (rise..set).contains(&now_epoch) => DayPhase::Day,
            (Some(_), Some(_)) => DayPhase::Night,
            _ => DayPhase::Unknown,
        }
    }

    /// Local wall-clock time at the resolved place.
    pub fn local_time(&self, now: DateTime<Utc>) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        chrono::FixedOffset::east_opt(self.timezone_offset_seconds).map(|tz| now.with_timezone(&tz))
    }
}

/// A geocoding hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoMatch {
    pub name: String,
    pub region: Option<String>,
    pub country: Option<String>,
    pub coordinates: Coordinates,
}

/// Autocomplete entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    pub region: Option<String>,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
}

impl Suggestion {
    /// `"name, region, country"`, skipping missing parts.
    pub fn display_name(&self) -> String {
        [Some(self.name.as_str()), self.region.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<GeoMatch> for Suggestion {
    fn from(hit: GeoMatch) -> Self {
        Self {
            name: hit.name,
            region: hit.region,
            country: hit.country,
            coordinates: Some(hit.coordinates),
        }
    }
}
