//! Outbound HTTP GET with a hard deadline.
//!
//! The deadline covers sending the request and reading the body. When it
//! elapses the in-flight request future is dropped, which aborts the
//! connection and releases the timer; the same happens when the caller drops
//! the returned future early.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url, header::ACCEPT};
use serde::de::DeserializeOwned;

use crate::{
    error::FetchError,
    retry::{RetryPolicy, with_retry},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameters whose values must never reach logs or traces.
const SECRET_PARAMS: &[&str] = &["appid", "key", "api_key"];

#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

/// Perform a single GET, giving up after `deadline`.
pub async fn fetch_with_timeout(
    client: &Client,
    url: Url,
    deadline: Duration,
) -> Result<HttpReply, FetchError> {
    let exchange = async {
        let res = client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        Ok::<_, reqwest::Error>(HttpReply { status, body })
    };

    match tokio::time::timeout(deadline, exchange).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(err)) if err.is_timeout() => Err(FetchError::Timeout(deadline)),
        Ok(Err(err)) => Err(err.into()),
        Err(_elapsed) => Err(FetchError::Timeout(deadline)),
    }
}

/// Shared GET helper used by the provider adapters: deadline, optional
/// retry, status check and JSON decoding.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    retry: Option<RetryPolicy>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(Client::new(), timeout)
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout, retry: None }
    }

    pub fn with_retry(mut self, retry: Option<RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        let label = redact_url(url);
        tracing::debug!(url = %label, timeout = ?self.timeout, "GET");

        let client = &self.client;
        let timeout = self.timeout;

        with_retry(self.retry.as_ref(), &label, || async move {
            let reply = fetch_with_timeout(client, url.clone(), timeout).await?;
            if !reply.status.is_success() {
                return Err(FetchError::Http {
                    status: reply.status.as_u16(),
                    body: truncate_body(&reply.body),
                });
            }
            Ok(reply.body)
        })
        .await
    }

    /// GET `url` and decode a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        let body = self.get_text(url).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Build `{base}{path}?{query}`.
pub(crate) fn endpoint(base: &str, path: &str, query: &[(&str, String)]) -> Result<Url, FetchError> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse_with_params(&raw, query.iter().map(|(k, v)| (*k, v.as_str())))
        .map_err(|e| FetchError::Network(format!("invalid endpoint URL '{raw}': {e}")))
}

/// Render `url` with secret query values replaced by `***`.
pub fn redact_url(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if SECRET_PARAMS.contains(&k.as_ref()) {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    if !pairs.is_empty() {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[tokio::test]
    async fn times_out_within_tolerance_of_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let deadline = Duration::from_millis(200);
        // TLS setup in Client::new is slow; keep it out of the measurement.
        let client = Client::new();
        let started = Instant::now();
        let err = fetch_with_timeout(&client, url(&server, "/slow"), deadline)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err, FetchError::Timeout(deadline));
        assert!(elapsed >= deadline, "returned early: {elapsed:?}");
        assert!(
            elapsed < deadline + Duration::from_millis(100),
            "timeout overshot: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn non_success_status_becomes_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("city not found"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(2));
        let err = fetcher.get_text(&url(&server, "/missing")).await.unwrap_err();

        assert_eq!(
            err,
            FetchError::Http { status: 404, body: "city not found".into() }
        );
    }

    #[tokio::test]
    async fn retry_policy_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ok\":true}"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(Duration::from_secs(2))
            .with_retry(Some(RetryPolicy::new(2, 10, 50)));
        let value: serde_json::Value = fetcher.get_json(&url(&server, "/flaky")).await.unwrap();

        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn invalid_json_is_a_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::default();
        let err = fetcher
            .get_json::<serde_json::Value>(&url(&server, "/garbage"))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Validation(_)));
    }

    #[test]
    fn redacts_api_keys() {
        let url = Url::parse(
            "https://api.openweathermap.org/data/2.5/weather?q=Paris&units=metric&appid=SECRET",
        )
        .unwrap();
        let shown = redact_url(&url);

        assert!(!shown.contains("SECRET"));
        assert!(shown.contains("appid=***"));
        assert!(shown.contains("q=Paris"));
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let url = endpoint(
            "http://127.0.0.1:8080/",
            "/v1/search",
            &[("name", "São Paulo".to_string()), ("count", "1".to_string())],
        )
        .unwrap();
        assert_eq!(url.path(), "/v1/search");
        assert_eq!(url.query(), Some("name=S%C3%A3o+Paulo&count=1"));
        assert!(endpoint("not a url", "/x", &[]).is_err());
    }

    #[test]
    fn truncates_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
