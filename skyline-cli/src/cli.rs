use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, Select};
use skyline_core::{
    CachePolicy, Config, FileCache, MemoryCache, ProviderId, ProviderMode, Resolution,
    ResolveError, SnapshotCache, Units, WeatherResolver, model::Coordinates,
};

use crate::output;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skyline", version, about = "Current weather with provider fallback")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials and preferences for a provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "open-meteo".
        provider: String,

        /// API key; prompted for when omitted.
        #[arg(long)]
        api_key: Option<String>,

        /// Default provider mode: auto, primary-only or secondary-only.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ProviderMode>,

        /// Default unit system: metric or imperial.
        #[arg(long, value_parser = parse_units)]
        units: Option<Units>,
    },

    /// Show current weather for one or more places, or for coordinates.
    Show {
        /// Place names such as "Paris" or "Portland, US".
        places: Vec<String>,

        #[arg(long, requires = "lon", allow_negative_numbers = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Overrides the configured unit system.
        #[arg(long, value_parser = parse_units)]
        units: Option<Units>,

        /// Overrides the configured provider mode.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ProviderMode>,

        /// Print the provider attempts behind each result.
        #[arg(long)]
        trace: bool,

        /// Print snapshots as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List place suggestions for a partially typed name.
    Suggest {
        partial: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

fn parse_units(s: &str) -> Result<Units, String> {
    Units::try_from(s).map_err(|e| e.to_string())
}

fn parse_mode(s: &str) -> Result<ProviderMode, String> {
    ProviderMode::try_from(s).map_err(|e| e.to_string())
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure {
                provider,
                api_key,
                mode,
                units,
            } => configure(&provider, api_key, mode, units),
            Command::Show {
                places,
                lat,
                lon,
                units,
                mode,
                trace,
                json,
            } => {
                let config = Config::load_with_env()?;
                let units = units.unwrap_or(config.resolver.units);
                let mode = mode.unwrap_or(config.resolver.provider_mode);
                let policy = config.cache_policy();
                let resolver = WeatherResolver::from_config(&config)
                    .with_cache(open_cache(&policy), policy);

                if mode == ProviderMode::PrimaryOnly && !resolver.has_primary() {
                    tracing::warn!("primary-only mode without an API key; every attempt will be skipped");
                }

                let opts = output::Options { trace, json };
                match (lat, lon) {
                    (Some(lat), Some(lon)) => {
                        show_coordinates(&resolver, lat, lon, units, mode, opts).await
                    }
                    _ if places.is_empty() => bail!("give at least one place or --lat/--lon"),
                    _ => show_places(&resolver, &places, units, mode, opts).await,
                }
            }
            Command::Suggest { partial, limit } => {
                let config = Config::load_with_env()?;
                let resolver = WeatherResolver::from_config(&config);
                if !resolver.has_primary() {
                    eprintln!(
                        "Suggestions need an OpenWeatherMap key; run `skyline configure openweather`."
                    );
                    return Ok(());
                }

                for s in resolver.fetch_suggestions(&partial, limit).await {
                    match s.coordinates {
                        Some(c) => println!("{}  ({})", s.display_name(), c.label()),
                        None => println!("{}", s.display_name()),
                    }
                }
                Ok(())
            }
        }
    }
}

fn configure(
    provider: &str,
    api_key: Option<String>,
    mode: Option<ProviderMode>,
    units: Option<Units>,
) -> anyhow::Result<()> {
    let provider_id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    if provider_id.requires_api_key() {
        let key = match api_key {
            Some(key) => key,
            None => Password::new(&format!("{} API key:", provider_id.display_name()))
                .without_confirmation()
                .prompt()
                .context("API key prompt aborted")?,
        };
        if key.trim().is_empty() {
            bail!("API key must not be empty");
        }
        config.upsert_provider_api_key(provider_id, key.trim().to_string());
    } else if api_key.is_some() {
        println!("{} needs no API key; ignoring --api-key.", provider_id.display_name());
    }

    let mode = match mode {
        Some(mode) => mode,
        None => {
            let current = ProviderMode::all()
                .iter()
                .position(|m| *m == config.resolver.provider_mode)
                .unwrap_or(0);
            Select::new("Provider mode:", ProviderMode::all().to_vec())
                .with_starting_cursor(current)
                .prompt()
                .context("provider mode prompt aborted")?
        }
    };
    config.set_provider_mode(mode);

    let units = match units {
        Some(units) => units,
        None => Select::new("Units:", vec![Units::Metric, Units::Imperial])
            .with_starting_cursor(usize::from(config.resolver.units == Units::Imperial))
            .prompt()
            .context("units prompt aborted")?,
    };
    config.resolver.units = units;

    config.save()?;
    println!(
        "Saved {} settings to {}",
        provider_id.display_name(),
        Config::config_file_path()?.display()
    );
    Ok(())
}

/// Snapshot cache shared between runs, falling back to memory when the
/// platform has no cache directory.
fn open_cache(policy: &CachePolicy) -> Arc<dyn SnapshotCache> {
    match Config::cache_file_path() {
        Ok(path) => Arc::new(FileCache::open(path, policy.retention())),
        Err(err) => {
            tracing::warn!(error = %err, "caching in memory only");
            Arc::new(MemoryCache::with_max_age(policy.retention()))
        }
    }
}

async fn show_places(
    resolver: &WeatherResolver,
    places: &[String],
    units: Units,
    mode: ProviderMode,
    opts: output::Options,
) -> anyhow::Result<()> {
    // Independent resolutions; each keeps its own trace.
    let lookups = places
        .iter()
        .map(|place| resolver.resolve_by_name_traced(place, units, mode));
    let results = futures::future::join_all(lookups).await;

    let mut failures = 0;
    for (place, result) in places.iter().zip(results) {
        if !report(place, result, opts)? {
            failures += 1;
        }
    }

    if failures == places.len() {
        bail!("no weather could be resolved");
    }
    Ok(())
}

async fn show_coordinates(
    resolver: &WeatherResolver,
    lat: f64,
    lon: f64,
    units: Units,
    mode: ProviderMode,
    opts: output::Options,
) -> anyhow::Result<()> {
    let mut result = resolver
        .resolve_by_coordinates_traced(lat, lon, units, mode)
        .await;

    // Providers without a place name fall back to the coordinate label.
    if let (Ok(res), Some(coords)) = (&mut result, Coordinates::new(lat, lon)) {
        if res.snapshot.location_name == coords.label() {
            if let Some(name) = resolver.reverse_geocode(coords).await {
                res.snapshot.location_name = name;
            }
        }
    }

    if !report(&format!("{lat}, {lon}"), result, opts)? {
        bail!("no weather could be resolved");
    }
    Ok(())
}

/// Print one result. Returns whether it succeeded.
fn report(
    label: &str,
    result: Result<Resolution, ResolveError>,
    opts: output::Options,
) -> anyhow::Result<bool> {
    match result {
        Ok(res) => {
            println!("{}", output::render(&res, opts, chrono::Utc::now())?);
            Ok(true)
        }
        Err(err) => {
            eprintln!("{label}: {err}");
            Ok(false)
        }
    }
}
