use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

use crate::{
    error::FetchError,
    fetch::{HttpFetcher, endpoint},
    model::{Coordinates, GeoMatch, PlaceQuery, WeatherSnapshot},
    provider::{ProviderId, humidity_pct, validate, wind_direction},
    units::Units,
};

use super::WeatherProvider;

pub const DEFAULT_API_BASE: &str = "https://api.openweathermap.org";
pub const DEFAULT_GEO_BASE: &str = "https://api.openweathermap.org";

const WEATHER_PATH: &str = "/data/2.5/weather";
const GEO_DIRECT_PATH: &str = "/geo/1.0/direct";
const GEO_REVERSE_PATH: &str = "/geo/1.0/reverse";

/// Primary provider. Answers in the requested unit system directly; wind is
/// m/s for metric and mph for imperial.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: HttpFetcher,
    api_base: String,
    geo_base: String,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, http: HttpFetcher) -> Self {
        Self {
            api_key,
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            geo_base: DEFAULT_GEO_BASE.to_string(),
        }
    }

    /// Point both the weather and geocoding endpoints at `base`.
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.api_base = base.clone();
        self.geo_base = base;
        self
    }

    async fn fetch_current(
        &self,
        location: &[(&str, String)],
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError> {
        let mut query = location.to_vec();
        query.push(("units", units.as_str().to_string()));
        query.push(("appid", self.api_key.clone()));

        let url = endpoint(&self.api_base, WEATHER_PATH, &query)?;
        let body = self.http.get_text(&url).await?;
        adapt_primary(&body, units)
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: Option<f64>,
    humidity: f64,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
    description: String,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
    deg: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default)]
    name: String,
    dt: Option<i64>,
    coord: Option<OwCoord>,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
    #[serde(default)]
    timezone: i32,
    #[serde(default)]
    sys: OwSys,
}

#[derive(Debug, Deserialize)]
struct OwGeoEntry {
    name: String,
    lat: f64,
    lon: f64,
    country: Option<String>,
    state: Option<String>,
}

/// Normalize a `/data/2.5/weather` body requested with `units`.
pub fn adapt_primary(body: &str, units: Units) -> Result<WeatherSnapshot, FetchError> {
    let parsed: OwCurrentResponse = serde_json::from_str(body)?;

    let coordinates = parsed
        .coord
        .and_then(|c| Coordinates::new(c.lat, c.lon));

    let (condition_main, condition_description, condition_icon) = parsed
        .weather
        .into_iter()
        .next()
        .map(|w| (w.main, w.description, w.icon))
        .unwrap_or_else(|| ("Unknown".to_string(), "conditions unavailable".to_string(), None));

    let location_name = match (parsed.name.trim(), coordinates) {
        ("", Some(c)) => c.label(),
        (name, _) => name.to_string(),
    };

    let snapshot = WeatherSnapshot {
        location_name,
        coordinates,
        timezone_offset_seconds: parsed.timezone,
        units,
        temperature_current: parsed.main.temp,
        temperature_feels_like: parsed.main.feels_like,
        humidity_pct: humidity_pct(parsed.main.humidity)?,
        pressure_hpa: parsed.main.pressure,
        wind_speed: parsed.wind.speed,
        wind_speed_unit: units.wind_unit(),
        wind_direction_deg: wind_direction(parsed.wind.deg),
        condition_main,
        condition_description,
        condition_icon,
        sunrise_epoch: parsed.sys.sunrise,
        sunset_epoch: parsed.sys.sunset,
        observed_at: parsed.dt.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        daily_forecast: None,
        source: ProviderId::OpenWeather,
    };

    validate(&snapshot)?;
    Ok(snapshot)
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenWeather
    }

    async fn current_by_name(
        &self,
        place: &PlaceQuery,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError> {
        let mut snapshot = self
            .fetch_current(&[("q", place.as_query_string())], units)
            .await?;
        if snapshot.location_name.is_empty() {
            snapshot.location_name = place.name.clone();
        }
        Ok(snapshot)
    }

    async fn current_by_coordinates(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError> {
        let mut snapshot = self
            .fetch_current(
                &[
                    ("lat", coords.latitude.to_string()),
                    ("lon", coords.longitude.to_string()),
                ],
                units,
            )
            .await?;
        if snapshot.location_name.is_empty() {
            snapshot.location_name = coords.label();
        }
        snapshot.coordinates.get_or_insert(coords);
        Ok(snapshot)
    }

    async fn geocode(&self, place: &PlaceQuery, limit: usize) -> Result<Vec<GeoMatch>, FetchError> {
        let url = endpoint(
            &self.geo_base,
            GEO_DIRECT_PATH,
            &[
                ("q", place.as_query_string()),
                ("limit", limit.max(1).to_string()),
                ("appid", self.api_key.clone()),
            ],
        )?;

        let entries: Vec<OwGeoEntry> = self.http.get_json(&url).await?;

        Ok(entries
            .into_iter()
            .filter_map(|e| {
                Coordinates::new(e.lat, e.lon).map(|coordinates| GeoMatch {
                    name: e.name,
                    region: e.state,
                    country: e.country,
                    coordinates,
                })
            })
            .collect())
    }

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<Option<String>, FetchError> {
        let url = endpoint(
            &self.geo_base,
            GEO_REVERSE_PATH,
            &[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("limit", "1".to_string()),
                ("appid", self.api_key.clone()),
            ],
        )?;

        let entries: Vec<OwGeoEntry> = self.http.get_json(&url).await?;
        Ok(entries.into_iter().next().map(|e| e.name))
    }
}
