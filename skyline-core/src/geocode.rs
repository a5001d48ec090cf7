//! Name → coordinate lookups.
//!
//! A failed lookup means "try the next fallback" (or "show no suggestions").
//! `locate` and `suggest` log errors and return `None` or an empty list;
//! `try_locate` hands the error back for callers that record it.

use crate::{
    error::FetchError,
    model::{GeoMatch, PlaceQuery, Suggestion},
    provider::WeatherProvider,
};

/// Best coordinate match for `place`, keeping the provider error so callers
/// can report it.
pub async fn try_locate(
    provider: &dyn WeatherProvider,
    place: &PlaceQuery,
    default_region: Option<&str>,
) -> Result<Option<GeoMatch>, FetchError> {
    let biased = place.with_default_region(default_region);
    let hit = provider.geocode(&biased, 1).await?.into_iter().next();
    if hit.is_none() {
        tracing::debug!(provider = %provider.id(), query = %biased, "geocoding found no match");
    }
    Ok(hit)
}

/// Best coordinate match for `place`, with the region bias applied to
/// unqualified names.
pub async fn locate(
    provider: &dyn WeatherProvider,
    place: &PlaceQuery,
    default_region: Option<&str>,
) -> Option<GeoMatch> {
    match try_locate(provider, place, default_region).await {
        Ok(hit) => hit,
        Err(err) => {
            tracing::warn!(provider = %provider.id(), query = %place, error = %err, "geocoding failed");
            None
        }
    }
}

/// Autocomplete entries for a partially typed name.
pub async fn suggest(
    provider: &dyn WeatherProvider,
    partial: &str,
    limit: usize,
    default_region: Option<&str>,
) -> Vec<Suggestion> {
    let Some(place) = PlaceQuery::parse(partial) else {
        return Vec::new();
    };
    if limit == 0 {
        return Vec::new();
    }
    let biased = place.with_default_region(default_region);

    match provider.geocode(&biased, limit).await {
        Ok(hits) => hits.into_iter().take(limit).map(Suggestion::from).collect(),
        Err(err) => {
            tracing::warn!(provider = %provider.id(), query = %biased, error = %err, "suggestion lookup failed");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Coordinates, WeatherSnapshot},
        provider::ProviderId,
        units::Units,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug)]
    struct Gazetteer {
        hits: Result<Vec<GeoMatch>, FetchError>,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl Gazetteer {
        fn new(hits: Result<Vec<GeoMatch>, FetchError>) -> Self {
            Self {
                hits,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl WeatherProvider for Gazetteer {
        fn id(&self) -> ProviderId {
            ProviderId::OpenWeather
        }

        async fn current_by_name(
            &self,
            place: &PlaceQuery,
            _units: Units,
        ) -> Result<WeatherSnapshot, FetchError> {
            Err(FetchError::NotFound(place.to_string()))
        }

        async fn current_by_coordinates(
            &self,
            coords: Coordinates,
            _units: Units,
        ) -> Result<WeatherSnapshot, FetchError> {
            Err(FetchError::NotFound(coords.label()))
        }

        async fn geocode(
            &self,
            place: &PlaceQuery,
            limit: usize,
        ) -> Result<Vec<GeoMatch>, FetchError> {
            self.seen.lock().push((place.as_query_string(), limit));
            self.hits.clone()
        }
    }

    fn delhi() -> GeoMatch {
        GeoMatch {
            name: "Delhi".into(),
            region: None,
            country: Some("IN".into()),
            coordinates: Coordinates::new(28.65, 77.23).unwrap(),
        }
    }

    #[tokio::test]
    async fn locate_applies_region_bias() {
        let provider = Gazetteer::new(Ok(vec![delhi()]));
        let place = PlaceQuery::parse("Delhi").unwrap();

        let hit = locate(&provider, &place, Some("IN")).await.unwrap();
        assert_eq!(hit.name, "Delhi");
        assert_eq!(*provider.seen.lock(), vec![("Delhi,IN".to_string(), 1)]);
    }

    #[tokio::test]
    async fn locate_swallows_errors_but_try_locate_keeps_them() {
        let provider = Gazetteer::new(Err(FetchError::Http { status: 401, body: String::new() }));
        let place = PlaceQuery::parse("Delhi").unwrap();

        assert!(locate(&provider, &place, None).await.is_none());
        let err = try_locate(&provider, &place, None).await.unwrap_err();
        assert_eq!(err.status_code(), Some(401));
    }

    #[tokio::test]
    async fn suggest_skips_blank_input_and_zero_limit() {
        let provider = Gazetteer::new(Ok(vec![delhi()]));

        assert!(suggest(&provider, "  ", 5, None).await.is_empty());
        assert!(suggest(&provider, "Del", 0, None).await.is_empty());
        assert!(provider.seen.lock().is_empty());

        let hits = suggest(&provider, "Del", 5, None).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name(), "Delhi, IN");
    }
}
