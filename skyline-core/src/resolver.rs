//! Provider fallback orchestration.
//!
//! A resolution turns a [`LocationQuery`] into one [`WeatherSnapshot`] by
//! running an ordered list of [`Strategy`] values, one at a time, until one
//! succeeds. The [`ProviderMode`] only filters that list. Every strategy run
//! leaves exactly one entry in the [`FetchTrace`].

use std::{sync::Arc, time::Duration};

use serde::Serialize;

use crate::{
    Config,
    cache::{CacheKey, CachePolicy, SnapshotCache},
    error::{FetchError, ResolveError},
    fetch::{DEFAULT_TIMEOUT, HttpFetcher},
    geocode,
    model::{Coordinates, LocationQuery, PlaceQuery, Suggestion, WeatherSnapshot},
    provider::{ProviderId, ProviderMode, WeatherProvider, openmeteo::OpenMeteoProvider, provider_from_config},
    retry::RetryPolicy,
    trace::FetchTrace,
    units::Units,
};

/// One way of obtaining a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    PrimaryByName,
    /// Geocode the name with the primary provider, then query by coordinates.
    PrimaryByGeocodedCoordinates,
    /// Secondary provider's own geocoding followed by its forecast endpoint.
    SecondaryByName,
    PrimaryByCoordinates,
    SecondaryByCoordinates,
}

const PLACE_STRATEGIES: &[Strategy] = &[
    Strategy::PrimaryByName,
    Strategy::PrimaryByGeocodedCoordinates,
    Strategy::SecondaryByName,
];

const COORDINATE_STRATEGIES: &[Strategy] =
    &[Strategy::PrimaryByCoordinates, Strategy::SecondaryByCoordinates];

impl Strategy {
    pub fn provider(&self) -> ProviderId {
        match self {
            Strategy::PrimaryByName
            | Strategy::PrimaryByGeocodedCoordinates
            | Strategy::PrimaryByCoordinates => ProviderId::OpenWeather,
            Strategy::SecondaryByName | Strategy::SecondaryByCoordinates => ProviderId::OpenMeteo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PrimaryByName => "primary-by-name",
            Strategy::PrimaryByGeocodedCoordinates => "primary-by-geocoded-coordinates",
            Strategy::SecondaryByName => "secondary-by-name",
            Strategy::PrimaryByCoordinates => "primary-by-coordinates",
            Strategy::SecondaryByCoordinates => "secondary-by-coordinates",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered strategies for `query`, restricted to the providers `mode` allows.
pub fn plan(query: &LocationQuery, mode: ProviderMode) -> Vec<Strategy> {
    let all = match query {
        LocationQuery::Place(_) => PLACE_STRATEGIES,
        LocationQuery::Coordinates(_) => COORDINATE_STRATEGIES,
    };
    all.iter()
        .copied()
        .filter(|s| mode.allows(s.provider()))
        .collect()
}

/// Transport settings used when building providers from configuration.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Deadline for each provider HTTP call.
    pub timeout: Duration,
    pub retry: Option<RetryPolicy>,
    /// Region appended to unqualified names before geocoding.
    pub default_region: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: None,
            default_region: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fetched from a provider during this call.
    Miss,
    Fresh,
    /// Expired entry served because every provider failed.
    Stale,
}

/// A snapshot together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub snapshot: WeatherSnapshot,
    pub trace: FetchTrace,
    pub cache: CacheStatus,
}

enum StepError {
    Skipped(&'static str),
    Failed(FetchError),
    GeocodeFailed(FetchError),
}

impl From<FetchError> for StepError {
    fn from(err: FetchError) -> Self {
        StepError::Failed(err)
    }
}

#[derive(Debug, Clone)]
pub struct WeatherResolver {
    primary: Option<Arc<dyn WeatherProvider>>,
    secondary: Arc<dyn WeatherProvider>,
    default_region: Option<String>,
    cache: Option<(Arc<dyn SnapshotCache>, CachePolicy)>,
}

impl WeatherResolver {
    /// `primary` is `None` when no API key is available; its strategies are
    /// then recorded as skipped.
    pub fn new(
        primary: Option<Arc<dyn WeatherProvider>>,
        secondary: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            primary,
            secondary,
            default_region: None,
            cache: None,
        }
    }

    /// Build both providers from configuration. A missing primary key is not
    /// an error here.
    pub fn from_config(config: &Config) -> Self {
        let settings = config.resolver_settings();
        let http = HttpFetcher::new(settings.timeout).with_retry(settings.retry.clone());

        let primary = match provider_from_config(ProviderId::OpenWeather, config, http.clone()) {
            Ok(p) => Some(p),
            Err(err) => {
                tracing::debug!(error = %err, "primary provider unavailable");
                None
            }
        };
        let secondary: Arc<dyn WeatherProvider> = Arc::new(OpenMeteoProvider::new(http));

        Self::new(primary, secondary).with_default_region(settings.default_region)
    }

    pub fn with_default_region(mut self, region: Option<String>) -> Self {
        self.default_region = region.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn SnapshotCache>, policy: CachePolicy) -> Self {
        self.cache = Some((cache, policy));
        self
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    pub async fn resolve_by_name(
        &self,
        query: &str,
        units: Units,
        mode: ProviderMode,
    ) -> Result<WeatherSnapshot, ResolveError> {
        Ok(self.resolve_by_name_traced(query, units, mode).await?.snapshot)
    }

    pub async fn resolve_by_coordinates(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        mode: ProviderMode,
    ) -> Result<WeatherSnapshot, ResolveError> {
        Ok(self
            .resolve_by_coordinates_traced(lat, lon, units, mode)
            .await?
            .snapshot)
    }

    pub async fn resolve_by_name_traced(
        &self,
        query: &str,
        units: Units,
        mode: ProviderMode,
    ) -> Result<Resolution, ResolveError> {
        let place = PlaceQuery::parse(query).ok_or(ResolveError::EmptyQuery)?;
        self.resolve(LocationQuery::Place(place), units, mode).await
    }

    pub async fn resolve_by_coordinates_traced(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
        mode: ProviderMode,
    ) -> Result<Resolution, ResolveError> {
        let coords =
            Coordinates::new(lat, lon).ok_or(ResolveError::InvalidCoordinates { lat, lon })?;
        self.resolve(LocationQuery::Coordinates(coords), units, mode).await
    }

    /// Autocomplete from the primary provider's geocoder. Never fails: any
    /// problem yields an empty list.
    pub async fn fetch_suggestions(&self, partial: &str, limit: usize) -> Vec<Suggestion> {
        let Some(primary) = self.primary.as_deref() else {
            tracing::debug!("no primary provider configured, skipping suggestions");
            return Vec::new();
        };
        geocode::suggest(primary, partial, limit, self.default_region.as_deref()).await
    }

    /// Place name for coordinates, from the primary provider. Silent on failure.
    pub async fn reverse_geocode(&self, coords: Coordinates) -> Option<String> {
        let primary = self.primary.as_deref()?;
        match primary.reverse_geocode(coords).await {
            Ok(name) => name,
            Err(err) => {
                tracing::warn!(error = %err, "reverse geocoding failed");
                None
            }
        }
    }

    async fn resolve(
        &self,
        query: LocationQuery,
        units: Units,
        mode: ProviderMode,
    ) -> Result<Resolution, ResolveError> {
        let key = CacheKey::new(&query, units);
        // Entries from a provider the mode excludes count as misses.
        let cached = self
            .cache
            .as_ref()
            .and_then(|(cache, _)| cache.get(&key))
            .filter(|entry| mode.allows(entry.snapshot.source));

        if let (Some(entry), Some((_, policy))) = (&cached, &self.cache) {
            if policy.is_fresh(entry) {
                tracing::debug!(%query, %units, "serving cached snapshot");
                return Ok(Resolution {
                    snapshot: entry.snapshot.clone(),
                    trace: FetchTrace::new(),
                    cache: CacheStatus::Fresh,
                });
            }
        }

        let mut trace = FetchTrace::new();

        for strategy in plan(&query, mode) {
            let target = self.describe(strategy, &query);
            tracing::debug!(%strategy, %target, "trying strategy");

            match self.run(strategy, &query, units).await {
                Ok(mut snapshot) => {
                    trace.record_success(strategy, target);
                    self.attach_forecast(&mut snapshot, mode).await;
                    tracing::info!(
                        %query,
                        %strategy,
                        source = %snapshot.source,
                        attempts = trace.len(),
                        "resolved weather"
                    );
                    if let Some((cache, _)) = &self.cache {
                        cache.put(key, snapshot.clone());
                    }
                    return Ok(Resolution {
                        snapshot,
                        trace,
                        cache: CacheStatus::Miss,
                    });
                }
                Err(StepError::Skipped(reason)) => {
                    tracing::debug!(%strategy, reason, "strategy skipped");
                    trace.record_skipped(strategy, target, reason);
                }
                Err(StepError::Failed(err)) => {
                    tracing::warn!(%strategy, error = %err, "strategy failed, falling back");
                    trace.record_failure(strategy, target, &err);
                }
                Err(StepError::GeocodeFailed(err)) => {
                    tracing::warn!(%strategy, error = %err, "geocoding failed, falling back");
                    trace.record_geocode_failure(strategy, target, &err);
                }
            }
        }

        let allow_stale = self
            .cache
            .as_ref()
            .is_some_and(|(_, policy)| policy.serve_stale_on_failure);
        if let Some(entry) = cached.filter(|_| allow_stale) {
            tracing::warn!(%query, age = ?entry.age, "all providers failed, serving stale snapshot");
            return Ok(Resolution {
                snapshot: entry.snapshot,
                trace,
                cache: CacheStatus::Stale,
            });
        }

        Err(ResolveError::ResolutionFailed {
            query: query.to_string(),
            trace,
        })
    }

    /// Fill in the secondary provider's daily strip for a snapshot that has
    /// none. Failures leave the snapshot as it is.
    async fn attach_forecast(&self, snapshot: &mut WeatherSnapshot, mode: ProviderMode) {
        let forecaster = self.secondary.id();
        if snapshot.daily_forecast.is_some()
            || snapshot.source == forecaster
            || !mode.allows(forecaster)
        {
            return;
        }
        let Some(coords) = snapshot.coordinates else {
            return;
        };

        match self.secondary.daily_forecast(coords, snapshot.units).await {
            Ok(days) if !days.is_empty() => snapshot.daily_forecast = Some(days),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "daily forecast unavailable"),
        }
    }

    fn primary(&self) -> Result<&dyn WeatherProvider, StepError> {
        self.primary
            .as_deref()
            .ok_or(StepError::Skipped("no API key configured for the primary provider"))
    }

    fn biased(&self, place: &PlaceQuery) -> PlaceQuery {
        place.with_default_region(self.default_region.as_deref())
    }

    async fn run(
        &self,
        strategy: Strategy,
        query: &LocationQuery,
        units: Units,
    ) -> Result<WeatherSnapshot, StepError> {
        let snapshot = match (strategy, query) {
            (Strategy::PrimaryByName, LocationQuery::Place(place)) => {
                self.primary()?.current_by_name(place, units).await?
            }
            (Strategy::PrimaryByGeocodedCoordinates, LocationQuery::Place(place)) => {
                let primary = self.primary()?;
                let hit = geocode::try_locate(primary, place, self.default_region.as_deref())
                    .await
                    .map_err(StepError::GeocodeFailed)?
                    .ok_or_else(|| FetchError::NotFound(self.biased(place).to_string()))?;
                primary.current_by_coordinates(hit.coordinates, units).await?
            }
            (Strategy::SecondaryByName, LocationQuery::Place(place)) => {
                self.secondary
                    .current_by_name(&self.biased(place), units)
                    .await?
            }
            (Strategy::PrimaryByCoordinates, LocationQuery::Coordinates(c)) => {
                self.primary()?.current_by_coordinates(*c, units).await?
            }
            (Strategy::SecondaryByCoordinates, LocationQuery::Coordinates(c)) => {
                self.secondary.current_by_coordinates(*c, units).await?
            }
            _ => return Err(StepError::Skipped("strategy does not apply to this query")),
        };
        Ok(snapshot)
    }

    /// Human-readable target for the trace. Never includes credentials.
    fn describe(&self, strategy: Strategy, query: &LocationQuery) -> String {
        match (strategy, query) {
            (Strategy::PrimaryByName, LocationQuery::Place(p)) => {
                format!("weather q={}", p.as_query_string())
            }
            (Strategy::PrimaryByGeocodedCoordinates, LocationQuery::Place(p)) => {
                format!("geocode q={} -> weather lat/lon", self.biased(p).as_query_string())
            }
            (Strategy::SecondaryByName, LocationQuery::Place(p)) => {
                format!("search name={} -> forecast", p.name)
            }
            (Strategy::PrimaryByCoordinates, LocationQuery::Coordinates(c)) => {
                format!("weather lat={} lon={}", c.latitude, c.longitude)
            }
            (Strategy::SecondaryByCoordinates, LocationQuery::Coordinates(c)) => {
                format!("forecast latitude={} longitude={}", c.latitude, c.longitude)
            }
            (strategy, query) => format!("{strategy} {query}"),
        }
    }
}
