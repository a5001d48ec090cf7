use crate::{
    Config,
    error::FetchError,
    fetch::HttpFetcher,
    model::{Coordinates, DailyForecast, GeoMatch, PlaceQuery, WeatherSnapshot},
    provider::{openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider},
    units::{Units, fahrenheit_to_celsius},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod openmeteo;
pub mod openweather;

/// Plausible surface air temperature range in Celsius.
pub const PLAUSIBLE_TEMP_C: std::ops::RangeInclusive<f64> = -90.0..=60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// Key-authenticated primary provider.
    #[serde(rename = "openweather")]
    OpenWeather,
    /// Keyless secondary provider.
    #[serde(rename = "open-meteo")]
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::OpenMeteo => "open-meteo",
        }
    }

    /// Attribution label for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "OpenWeatherMap",
            ProviderId::OpenMeteo => "Open-Meteo",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, ProviderId::OpenWeather)
    }

    pub fn requires_api_key(&self) -> bool {
        self.is_primary()
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::OpenMeteo]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" | "openweathermap" | "owm" => Ok(ProviderId::OpenWeather),
            "open-meteo" | "openmeteo" | "om" => Ok(ProviderId::OpenMeteo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, open-meteo."
            )),
        }
    }
}

/// Which providers a resolution may use. Read per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderMode {
    /// Primary first, secondary as fallback.
    #[default]
    Auto,
    PrimaryOnly,
    SecondaryOnly,
}

impl ProviderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderMode::Auto => "auto",
            ProviderMode::PrimaryOnly => "primary-only",
            ProviderMode::SecondaryOnly => "secondary-only",
        }
    }

    pub fn allows(&self, provider: ProviderId) -> bool {
        match self {
            ProviderMode::Auto => true,
            ProviderMode::PrimaryOnly => provider.is_primary(),
            ProviderMode::SecondaryOnly => !provider.is_primary(),
        }
    }

    pub const fn all() -> &'static [ProviderMode] {
        &[ProviderMode::Auto, ProviderMode::PrimaryOnly, ProviderMode::SecondaryOnly]
    }
}

impl std::fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderMode {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "auto" => Ok(ProviderMode::Auto),
            // "owm" / "om" are the values older settings stores persisted
            "primary-only" | "primary" | "owm" => Ok(ProviderMode::PrimaryOnly),
            "secondary-only" | "secondary" | "om" => Ok(ProviderMode::SecondaryOnly),
            _ => Err(anyhow::anyhow!(
                "Unknown provider mode '{value}'. Supported: auto, primary-only, secondary-only."
            )),
        }
    }
}

/// One weather backend. Every method reports failure through `FetchError`
/// so the resolver can record it and move on.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn current_by_name(
        &self,
        place: &PlaceQuery,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError>;

    async fn current_by_coordinates(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<WeatherSnapshot, FetchError>;

    async fn geocode(&self, place: &PlaceQuery, limit: usize) -> Result<Vec<GeoMatch>, FetchError>;

    async fn reverse_geocode(&self, _coords: Coordinates) -> Result<Option<String>, FetchError> {
        Ok(None)
    }

    /// Multi-day outlook for `coords`. Empty when the provider has none.
    async fn daily_forecast(
        &self,
        _coords: Coordinates,
        _units: Units,
    ) -> Result<Vec<DailyForecast>, FetchError> {
        Ok(Vec::new())
    }
}

/// Sanity checks applied to every adapted snapshot.
pub(crate) fn validate(snapshot: &WeatherSnapshot) -> Result<(), FetchError> {
    let temp_c = match snapshot.units {
        Units::Metric => snapshot.temperature_current,
        Units::Imperial => fahrenheit_to_celsius(snapshot.temperature_current),
    };
    if !temp_c.is_finite() || !PLAUSIBLE_TEMP_C.contains(&temp_c) {
        return Err(FetchError::Validation(format!(
            "temperature {:.1}°C outside plausible range",
            temp_c
        )));
    }

    if snapshot.humidity_pct > 100 {
        return Err(FetchError::Validation(format!(
            "humidity {}% outside 0-100",
            snapshot.humidity_pct
        )));
    }

    if !snapshot.wind_speed.is_finite() || snapshot.wind_speed < 0.0 {
        return Err(FetchError::Validation(format!(
            "wind speed {} is not a valid measurement",
            snapshot.wind_speed
        )));
    }

    Ok(())
}

/// Convert a reported relative humidity into a whole percentage.
pub(crate) fn humidity_pct(raw: f64) -> Result<u8, FetchError> {
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(FetchError::Validation(format!("humidity {raw} outside 0-100")));
    }
    Ok(raw.round() as u8)
}

/// Normalize a bearing into 0-359.
pub(crate) fn wind_direction(deg: Option<f64>) -> Option<u16> {
    deg.filter(|d| d.is_finite())
        .map(|d| (d.round() as i64).rem_euclid(360) as u16)
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: HttpFetcher,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::OpenWeather => {
            let api_key = config.provider_api_key(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured for provider '{id}'.\n\
                     Hint: run `skyline configure {id}` and enter your API key."
                )
            })?;
            Arc::new(OpenWeatherProvider::new(api_key.to_owned(), http))
        }
        ProviderId::OpenMeteo => Arc::new(OpenMeteoProvider::new(http)),
    };

    Ok(provider)
}
