use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::{
    error::FetchError,
    fetch::{HttpFetcher, endpoint},
    model::{Coordinates, DailyForecast, GeoMatch, PlaceQuery, WeatherSnapshot},
    provider::{ProviderId, humidity_pct, validate, wind_direction},
    units::{self, Units},
};

use super::WeatherProvider;

pub const DEFAULT_API_BASE: &str = "https://api.open-meteo.com";
pub const DEFAULT_GEO_BASE: &str = "https://geocoding-api.open-meteo.com";

const FORECAST_PATH: &str = "/v1/forecast";
const SEARCH_PATH: &str = "/v1/search";

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
surface_pressure,wind_speed_10m,wind_direction_10m,weather_code";
const DAILY_FIELDS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_probability_max,weathercode";

pub const MAX_FORECAST_DAYS: usize = 7;

/// Keyless secondary provider. Always queried in Celsius and km/h; the
/// adapter converts to the requested units (m/s or mph for wind). It has no
/// by-name weather endpoint, so name lookups go through its own geocoder.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    http: HttpFetcher,
    api_base: String,
    geo_base: String,
}

impl OpenMeteoProvider {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            geo_base: DEFAULT_GEO_BASE.to_string(),
        }
    }

    /// Point both the forecast and geocoding endpoints at `base`.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.geo_base = base;
        self
    }

    async fn search(&self, place: &PlaceQuery, count: usize) -> Result<Vec<OmPlace>, FetchError> {
        let mut query = vec![
            ("name", place.name.clone()),
            ("count", count.max(1).to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(code) = place.country_code() {
            query.push(("countryCode", code));
        }

        let url = endpoint(&self.geo_base, SEARCH_PATH, &query)?;
        let parsed: OmSearchResponse = self.http.get_json(&url).await?;
        Ok(parsed.results)
    }

    async fn forecast(
        &self,
        coords: Coordinates,
        location_name: String,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError> {
        let url = endpoint(
            &self.api_base,
            FORECAST_PATH,
            &[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
            ],
        )?;

        let body = self.http.get_text(&url).await?;
        adapt_secondary(&body, location_name, coords, units)
    }

    async fn daily_only(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<Vec<DailyForecast>, FetchError> {
        let url = endpoint(
            &self.api_base,
            FORECAST_PATH,
            &[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
            ],
        )?;

        let body = self.http.get_text(&url).await?;
        adapt_daily(&body, units)
    }
}

#[derive(Debug, Deserialize)]
struct OmSearchResponse {
    #[serde(default)]
    results: Vec<OmPlace>,
}

#[derive(Debug, Clone, Deserialize)]
struct OmPlace {
    name: String,
    latitude: f64,
    longitude: f64,
    country: Option<String>,
    country_code: Option<String>,
    admin1: Option<String>,
}

impl OmPlace {
    /// Whether the free-text qualifier names this place's region or country.
    fn matches_qualifier(&self, qualifier: &str) -> bool {
        let wanted: Vec<String> = qualifier
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        [&self.admin1, &self.country, &self.country_code]
            .into_iter()
            .flatten()
            .any(|field| wanted.contains(&field.to_lowercase()))
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    surface_pressure: Option<f64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
    weather_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OmDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_probability_max: Option<Vec<Option<f64>>>,
    weathercode: Option<Vec<Option<i32>>>,
}

#[derive(Debug, Deserialize)]
struct OmForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<OmCurrent>,
    daily: Option<OmDaily>,
}

/// Category and description for a WMO weather interpretation code.
pub fn wmo_condition(code: i32) -> (&'static str, &'static str) {
    match code {
        0 => ("Clear", "clear sky"),
        1 => ("Clear", "mainly clear"),
        2 => ("Clouds", "partly cloudy"),
        3 => ("Clouds", "overcast"),
        45 => ("Fog", "fog"),
        48 => ("Fog", "depositing rime fog"),
        51 => ("Drizzle", "light drizzle"),
        53 => ("Drizzle", "moderate drizzle"),
        55 => ("Drizzle", "dense drizzle"),
        56 | 57 => ("Drizzle", "freezing drizzle"),
        61 => ("Rain", "slight rain"),
        63 => ("Rain", "moderate rain"),
        65 => ("Rain", "heavy rain"),
        66 | 67 => ("Rain", "freezing rain"),
        71 => ("Snow", "slight snow fall"),
        73 => ("Snow", "moderate snow fall"),
        75 => ("Snow", "heavy snow fall"),
        77 => ("Snow", "snow grains"),
        80 => ("Rain", "slight rain showers"),
        81 => ("Rain", "moderate rain showers"),
        82 => ("Rain", "violent rain showers"),
        85 => ("Snow", "slight snow showers"),
        86 => ("Snow", "heavy snow showers"),
        95 => ("Thunderstorm", "thunderstorm"),
        96 | 99 => ("Thunderstorm", "thunderstorm with hail"),
        _ => ("Unknown", "unknown conditions"),
    }
}

fn convert_temp(celsius: f64, units: Units) -> f64 {
    match units {
        Units::Metric => celsius,
        Units::Imperial => units::celsius_to_fahrenheit(celsius),
    }
}

fn convert_wind(kmh: f64, units: Units) -> f64 {
    match units {
        Units::Metric => units::kmh_to_mps(kmh),
        Units::Imperial => units::kmh_to_mph(kmh),
    }
}

fn daily_entries(daily: &OmDaily, units: Units) -> Vec<DailyForecast> {
    let pick = |values: &Option<Vec<Option<f64>>>, i: usize| {
        values.as_ref().and_then(|v| v.get(i).copied().flatten())
    };

    daily
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, day)| {
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
            let max = daily.temperature_2m_max.get(i).copied().flatten()?;
            let min = daily.temperature_2m_min.get(i).copied().flatten()?;
            Some(DailyForecast {
                date,
                temp_max: convert_temp(max, units),
                temp_min: convert_temp(min, units),
                precipitation_probability_pct: pick(&daily.precipitation_probability_max, i)
                    .map(|p| p.clamp(0.0, 100.0).round() as u8),
                condition_code: daily
                    .weathercode
                    .as_ref()
                    .and_then(|codes| codes.get(i).copied().flatten()),
            })
        })
        .take(MAX_FORECAST_DAYS)
        .collect()
}

/// Daily strip from a `/v1/forecast` body, ignoring any `current` block.
pub fn adapt_daily(body: &str, units: Units) -> Result<Vec<DailyForecast>, FetchError> {
    let parsed: OmForecastResponse = serde_json::from_str(body)?;
    let daily = parsed
        .daily
        .ok_or_else(|| FetchError::Validation("missing `daily` block".into()))?;
    Ok(daily_entries(&daily, units))
}

/// Normalize a `/v1/forecast` body (queried in Celsius and km/h) into the
/// requested units. The provider has no sunrise/sunset in this query, so
/// those stay unavailable.
pub fn adapt_secondary(
    body: &str,
    location_name: String,
    coords: Coordinates,
    units: Units,
) -> Result<WeatherSnapshot, FetchError> {
    let parsed: OmForecastResponse = serde_json::from_str(body)?;

    let current = parsed
        .current
        .ok_or_else(|| FetchError::Validation("missing `current` block".into()))?;
    let temp_c = current
        .temperature_2m
        .ok_or_else(|| FetchError::Validation("missing current.temperature_2m".into()))?;
    let humidity = current
        .relative_humidity_2m
        .ok_or_else(|| FetchError::Validation("missing current.relative_humidity_2m".into()))?;
    let wind_kmh = current
        .wind_speed_10m
        .ok_or_else(|| FetchError::Validation("missing current.wind_speed_10m".into()))?;

    let (condition_main, condition_description) = match current.weather_code {
        Some(code) => wmo_condition(code),
        None => ("Unknown", "conditions unavailable"),
    };

    let daily_forecast = parsed
        .daily
        .map(|d| daily_entries(&d, units))
        .filter(|days| !days.is_empty());

    let snapshot = WeatherSnapshot {
        location_name,
        coordinates: Some(coords),
        timezone_offset_seconds: parsed.utc_offset_seconds,
        units,
        temperature_current: convert_temp(temp_c, units),
        temperature_feels_like: current.apparent_temperature.map(|t| convert_temp(t, units)),
        humidity_pct: humidity_pct(humidity)?,
        pressure_hpa: current.surface_pressure,
        wind_speed: convert_wind(wind_kmh, units),
        wind_speed_unit: units.wind_unit(),
        wind_direction_deg: wind_direction(current.wind_direction_10m),
        condition_main: condition_main.to_string(),
        condition_description: condition_description.to_string(),
        condition_icon: None,
        sunrise_epoch: None,
        sunset_epoch: None,
        observed_at: None,
        daily_forecast,
        source: ProviderId::OpenMeteo,
    };

    validate(&snapshot)?;
    Ok(snapshot)
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn current_by_name(
        &self,
        place: &PlaceQuery,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError> {
        let candidates = self.search(place, 5).await?;

        // Prefer a hit whose region/country matches the qualifier.
        let chosen = place
            .qualifier
            .as_deref()
            .and_then(|q| candidates.iter().find(|c| c.matches_qualifier(q)))
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(place.to_string()))?;

        let coords = Coordinates::new(chosen.latitude, chosen.longitude).ok_or_else(|| {
            FetchError::Validation(format!(
                "geocoder returned invalid coordinates for '{}'",
                chosen.name
            ))
        })?;

        self.forecast(coords, chosen.name, units).await
    }

    async fn current_by_coordinates(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError> {
        self.forecast(coords, coords.label(), units).await
    }

    async fn geocode(&self, place: &PlaceQuery, limit: usize) -> Result<Vec<GeoMatch>, FetchError> {
        Ok(self
            .search(place, limit)
            .await?
            .into_iter()
            .filter_map(|p| {
                Coordinates::new(p.latitude, p.longitude).map(|coordinates| GeoMatch {
                    name: p.name,
                    region: p.admin1,
                    country: p.country_code.or(p.country),
                    coordinates,
                })
            })
            .collect())
    }

    async fn daily_forecast(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<Vec<DailyForecast>, FetchError> {
        self.daily_only(coords, units).await
    }
}
