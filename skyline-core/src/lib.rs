//! Core library for the `skyline` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The two weather providers and their normalization into one snapshot shape
//! - Fallback resolution with a per-call diagnostic trace
//!
//! It is used by `skyline-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod geocode;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod trace;
pub mod units;

pub use cache::{CachePolicy, FileCache, MemoryCache, SnapshotCache};
pub use config::{Config, ProviderConfig};
pub use error::{FetchError, ResolveError};
pub use fetch::HttpFetcher;
pub use model::{Coordinates, DailyForecast, LocationQuery, PlaceQuery, Suggestion, WeatherSnapshot};
pub use provider::{ProviderId, ProviderMode, WeatherProvider};
pub use resolver::{CacheStatus, Resolution, ResolverSettings, Strategy, WeatherResolver};
pub use trace::{Attempt, AttemptOutcome, FetchTrace};
pub use units::{Units, WindSpeedUnit};
