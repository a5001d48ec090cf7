use std::{sync::Arc, time::Duration};

use serde_json::json;
use skyline_core::{
    AttemptOutcome, HttpFetcher, ProviderId, ProviderMode, ResolveError, Strategy, Units,
    WeatherProvider, WeatherResolver,
    provider::{openmeteo::OpenMeteoProvider, openweather::OpenWeatherProvider},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param, query_param_is_missing},
};

fn paris_owm() -> serde_json::Value {
    json!({
        "coord": { "lon": 2.35, "lat": 48.85 },
        "weather": [{ "id": 802, "main": "Clouds", "description": "scattered clouds", "icon": "03d" }],
        "main": { "temp": 18.2, "feels_like": 17.6, "pressure": 1016, "humidity": 62 },
        "wind": { "speed": 4.1, "deg": 230 },
        "dt": 1_718_000_000,
        "sys": { "country": "FR", "sunrise": 1_717_991_000, "sunset": 1_718_049_000 },
        "timezone": 3600,
        "name": "Paris"
    })
}

fn paris_search() -> serde_json::Value {
    json!({
        "results": [{
            "name": "Paris",
            "latitude": 48.85341,
            "longitude": 2.3488,
            "country": "France",
            "country_code": "FR",
            "admin1": "Île-de-France"
        }]
    })
}

fn forecast() -> serde_json::Value {
    json!({
        "utc_offset_seconds": 7200,
        "current": {
            "temperature_2m": 20.0,
            "relative_humidity_2m": 48,
            "apparent_temperature": 19.4,
            "surface_pressure": 1008.3,
            "wind_speed_10m": 18.0,
            "wind_direction_10m": 90,
            "weather_code": 2
        },
        "daily": {
            "time": ["2024-06-10", "2024-06-11"],
            "temperature_2m_max": [22.1, 24.0],
            "temperature_2m_min": [13.0, 14.2],
            "precipitation_probability_max": [10, 40],
            "weathercode": [2, 61]
        }
    })
}

fn resolver_with(server: &MockServer, timeout: Duration, api_key: Option<&str>) -> WeatherResolver {
    let http = HttpFetcher::new(timeout);
    let primary = api_key.map(|key| {
        Arc::new(OpenWeatherProvider::new(key.into(), http.clone()).with_base_url(server.uri()))
            as Arc<dyn WeatherProvider>
    });
    let secondary = Arc::new(OpenMeteoProvider::new(http).with_base_url(server.uri()));
    WeatherResolver::new(primary, secondary)
}

fn resolver(server: &MockServer) -> WeatherResolver {
    resolver_with(server, Duration::from_secs(5), Some("test-key"))
}

#[tokio::test]
async fn primary_by_name_normalizes_paris() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Paris"))
        .and(query_param("units", "metric"))
        .and(query_param("appid", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_owm()))
        .expect(1)
        .mount(&server)
        .await;

    let res = resolver(&server)
        .resolve_by_name_traced("Paris", Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    let snap = res.snapshot;
    assert_eq!(snap.location_name, "Paris");
    assert_eq!(snap.temperature_current, 18.2);
    assert_eq!(snap.condition_main, "Clouds");
    assert_eq!(snap.source, ProviderId::OpenWeather);
    assert_eq!(snap.timezone_offset_seconds, 3600);
    assert_eq!(snap.humidity_pct, 62);
    assert_eq!(res.trace.len(), 1);
    assert_eq!(res.trace.attempts()[0].outcome, AttemptOutcome::Success);
}

#[tokio::test]
async fn minimal_primary_payload_resolves() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .and(query_param("q", "Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "main": { "temp": 18.2, "feels_like": 17.5, "humidity": 55, "pressure": 1012 },
            "weather": [{ "main": "Clouds", "description": "scattered clouds", "icon": "03d" }],
            "wind": { "speed": 4.1, "deg": 200 },
            "name": "Paris",
            "timezone": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    // No coordinates in the payload, so there is nothing to fetch a strip for.
    Mock::given(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast()))
        .expect(0)
        .mount(&server)
        .await;

    let snap = resolver(&server)
        .resolve_by_name("Paris", Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    assert_eq!(snap.temperature_current, 18.2);
    assert_eq!(snap.condition_main, "Clouds");
    assert_eq!(snap.source, ProviderId::OpenWeather);
    assert_eq!(snap.timezone_offset_seconds, 3600);
    assert_eq!(snap.coordinates, None);
    assert_eq!(snap.daily_forecast, None);
}

#[tokio::test]
async fn primary_result_carries_secondary_forecast_strip() {
    let server = MockServer::start().await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_owm()))
        .mount(&server)
        .await;
    Mock::given(path("/v1/forecast"))
        .and(query_param("latitude", "48.85"))
        .and(query_param("longitude", "2.35"))
        .and(query_param_is_missing("current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast()))
        .expect(1)
        .mount(&server)
        .await;

    let res = resolver(&server)
        .resolve_by_name_traced("Paris", Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    assert_eq!(res.snapshot.source, ProviderId::OpenWeather);
    assert_eq!(res.snapshot.temperature_current, 18.2);
    let days = res.snapshot.daily_forecast.expect("forecast strip");
    assert_eq!(days.len(), 2);
    assert_eq!(days[1].condition_code, Some(61));
    assert_eq!(res.trace.len(), 1);
}

#[tokio::test]
async fn falls_back_to_secondary_after_both_primary_strategies() {
    let server = MockServer::start().await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"cod":"404","message":"city not found"}"#))
        .mount(&server)
        .await;
    Mock::given(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/v1/search"))
        .and(query_param("name", "Paris"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_search()))
        .mount(&server)
        .await;
    Mock::given(path("/v1/forecast"))
        .and(query_param("timezone", "auto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast()))
        .mount(&server)
        .await;

    let res = resolver(&server)
        .resolve_by_name_traced("Paris", Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    assert_eq!(
        res.trace.strategies(),
        vec![
            Strategy::PrimaryByName,
            Strategy::PrimaryByGeocodedCoordinates,
            Strategy::SecondaryByName,
        ]
    );
    let first = &res.trace.attempts()[0];
    assert_eq!(first.outcome, AttemptOutcome::HttpError);
    assert_eq!(first.status_code, Some(404));
    assert_eq!(res.trace.attempts()[1].outcome, AttemptOutcome::NoMatch);

    let snap = res.snapshot;
    assert_eq!(snap.source, ProviderId::OpenMeteo);
    assert_eq!(snap.location_name, "Paris");
    assert_eq!(snap.timezone_offset_seconds, 7200);
    // 18 km/h is 5 m/s
    assert!((snap.wind_speed - 5.0).abs() < 1e-9);
    assert_eq!(snap.daily_forecast.as_ref().map(Vec::len), Some(2));
    assert_eq!(snap.sunrise_epoch, None);
}

#[tokio::test]
async fn secondary_only_never_calls_primary_endpoints() {
    let server = MockServer::start().await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_owm()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(path("/v1/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_search()))
        .mount(&server)
        .await;
    Mock::given(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast()))
        .mount(&server)
        .await;

    let snap = resolver(&server)
        .resolve_by_name("Paris", Units::Imperial, ProviderMode::SecondaryOnly)
        .await
        .unwrap();

    assert_eq!(snap.source, ProviderId::OpenMeteo);
    assert_eq!(snap.temperature_current, 68.0);
}

#[tokio::test]
async fn total_failure_carries_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = resolver(&server)
        .resolve_by_name("Atlantis", Units::Metric, ProviderMode::Auto)
        .await
        .unwrap_err();

    let ResolveError::ResolutionFailed { query, trace } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(query, "Atlantis");
    assert_eq!(trace.len(), 3);
    assert!(trace.attempts().iter().all(|a| a.outcome != AttemptOutcome::Success));
    assert!(!err.to_string().contains("test-key"));
}

#[tokio::test]
async fn slow_primary_times_out_and_falls_back() {
    let server = MockServer::start().await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(paris_owm())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast()))
        .mount(&server)
        .await;

    let res = resolver_with(&server, Duration::from_millis(200), Some("test-key"))
        .resolve_by_coordinates_traced(48.85, 2.35, Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    assert_eq!(res.trace.attempts()[0].outcome, AttemptOutcome::Timeout);
    assert_eq!(res.snapshot.source, ProviderId::OpenMeteo);
    assert_eq!(res.snapshot.location_name, "48.85, 2.35");
}

#[tokio::test]
async fn missing_key_goes_straight_to_secondary() {
    let server = MockServer::start().await;
    Mock::given(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_owm()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast()))
        .mount(&server)
        .await;

    let res = resolver_with(&server, Duration::from_secs(5), None)
        .resolve_by_coordinates_traced(48.85, 2.35, Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    assert_eq!(res.trace.attempts()[0].outcome, AttemptOutcome::Skipped);
    assert_eq!(res.snapshot.source, ProviderId::OpenMeteo);
}

#[tokio::test]
async fn suggestions_swallow_errors() {
    let server = MockServer::start().await;
    Mock::given(path("/geo/1.0/direct"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let suggestions = resolver(&server).fetch_suggestions("Par", 5).await;
    assert!(suggestions.is_empty());
}

#[tokio::test]
async fn suggestions_list_primary_geocoder_hits() {
    let server = MockServer::start().await;
    Mock::given(path("/geo/1.0/direct"))
        .and(query_param("q", "Par"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "Paris", "lat": 48.85, "lon": 2.35, "country": "FR", "state": "Ile-de-France" },
            { "name": "Paris", "lat": 33.66, "lon": -95.55, "country": "US", "state": "Texas" }
        ])))
        .mount(&server)
        .await;

    let suggestions = resolver(&server).fetch_suggestions("Par", 5).await;
    let names: Vec<_> = suggestions.iter().map(|s| s.display_name()).collect();
    assert_eq!(names, vec!["Paris, Ile-de-France, FR", "Paris, Texas, US"]);
}

#[tokio::test]
async fn coordinate_resolution_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(path("/data/2.5/weather"))
        .and(query_param("lat", "48.85"))
        .and(query_param("lon", "2.35"))
        .respond_with(ResponseTemplate::new(200).set_body_json(paris_owm()))
        .expect(2)
        .mount(&server)
        .await;

    let resolver = resolver(&server);
    let a = resolver
        .resolve_by_coordinates(48.85, 2.35, Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();
    let b = resolver
        .resolve_by_coordinates(48.85, 2.35, Units::Metric, ProviderMode::Auto)
        .await
        .unwrap();

    assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
}

#[tokio::test]
async fn reverse_geocode_names_coordinates() {
    let server = MockServer::start().await;
    Mock::given(path("/geo/1.0/reverse"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "Paris", "lat": 48.85, "lon": 2.35, "country": "FR" }
        ])))
        .mount(&server)
        .await;

    let coords = skyline_core::Coordinates::new(48.85, 2.35).unwrap();
    let name = resolver(&server).reverse_geocode(coords).await;
    assert_eq!(name.as_deref(), Some("Paris"));
}
