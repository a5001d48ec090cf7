use std::fmt::Write;

use chrono::{DateTime, Utc};
use skyline_core::{
    CacheStatus, Resolution, Units, WeatherSnapshot, model::DayPhase,
    provider::openmeteo::wmo_condition,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub trace: bool,
    pub json: bool,
}

pub fn render(res: &Resolution, opts: Options, now: DateTime<Utc>) -> anyhow::Result<String> {
    if opts.json {
        let value = if opts.trace {
            serde_json::json!({ "snapshot": res.snapshot, "trace": res.trace })
        } else {
            serde_json::to_value(&res.snapshot)?
        };
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut out = render_snapshot(&res.snapshot, now);
    match res.cache {
        CacheStatus::Miss => {}
        CacheStatus::Fresh => out.push_str("  (cached)\n"),
        CacheStatus::Stale => out.push_str("  (stale: every provider failed)\n"),
    }
    if opts.trace && !res.trace.is_empty() {
        let _ = write!(out, "  Attempts:\n{}", res.trace);
    }
    Ok(out.trim_end().to_string())
}

fn render_snapshot(s: &WeatherSnapshot, now: DateTime<Utc>) -> String {
    let deg = s.units.temperature_symbol();
    let mut out = String::new();

    let _ = writeln!(out, "{} ({})", s.location_name, s.source.display_name());

    let _ = write!(out, "  {:.1}{deg}", s.temperature_current);
    if let Some(feels) = s.temperature_feels_like {
        let _ = write!(out, ", feels like {feels:.1}{deg}");
    }
    let _ = writeln!(out, ", {}", s.condition_description);

    let secondary_wind = match s.units {
        Units::Metric => format!("{:.1} km/h", s.wind_speed_kmh()),
        Units::Imperial => format!("{:.1} m/s", s.wind_speed_mps()),
    };
    let _ = write!(
        out,
        "  Humidity {}%  Pressure {:.0} hPa  Wind {:.1} {} ({secondary_wind})",
        s.humidity_pct,
        s.pressure_hpa_or_standard(),
        s.wind_speed,
        s.wind_speed_unit.as_str(),
    );
    if let Some(compass) = s.wind_compass() {
        let _ = write!(out, " {compass}");
    }
    out.push('\n');

    if let Some(local) = s.local_time(now) {
        let phase = match s.day_phase(now.timestamp()) {
            DayPhase::Day => ", day",
            DayPhase::Night => ", night",
            DayPhase::Unknown => "",
        };
        let _ = writeln!(out, "  Local time {}{phase}", local.format("%H:%M"));
    }

    if let Some(days) = s.daily_forecast.as_deref() {
        out.push_str("  Forecast:\n");
        for day in days {
            let _ = write!(
                out,
                "    {}  {:.0}/{:.0}{deg}",
                day.date.format("%a %d %b"),
                day.temp_max,
                day.temp_min
            );
            if let Some(p) = day.precipitation_probability_pct {
                let _ = write!(out, "  rain {p}%");
            }
            if let Some(code) = day.condition_code {
                let _ = write!(out, "  {}", wmo_condition(code).1);
            }
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use skyline_core::{DailyForecast, FetchTrace, ProviderId, WindSpeedUnit};

    fn snapshot() -> WeatherSnapshot {
        WeatherSnapshot {
            location_name: "Paris".into(),
            coordinates: None,
            timezone_offset_seconds: 3600,
            units: Units::Metric,
            temperature_current: 18.2,
            temperature_feels_like: Some(17.6),
            humidity_pct: 62,
            pressure_hpa: None,
            wind_speed: 5.0,
            wind_speed_unit: WindSpeedUnit::MetersPerSecond,
            wind_direction_deg: Some(230),
            condition_main: "Clouds".into(),
            condition_description: "scattered clouds".into(),
            condition_icon: None,
            sunrise_epoch: Some(1_000),
            sunset_epoch: Some(2_000),
            observed_at: None,
            daily_forecast: Some(vec![DailyForecast {
                date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
                temp_max: 22.1,
                temp_min: 13.0,
                precipitation_probability_pct: Some(10),
                condition_code: Some(61),
            }]),
            source: ProviderId::OpenWeather,
        }
    }

    fn resolution() -> Resolution {
        Resolution {
            snapshot: snapshot(),
            trace: FetchTrace::new(),
            cache: CacheStatus::Miss,
        }
    }

    #[test]
    fn renders_text_report() {
        let now = Utc.timestamp_opt(1_500, 0).unwrap();
        let text = render(&resolution(), Options::default(), now).unwrap();

        assert!(text.starts_with("Paris (OpenWeatherMap)"));
        assert!(text.contains("18.2°C, feels like 17.6°C, scattered clouds"));
        // Missing pressure shows standard sea-level pressure.
        assert!(text.contains("Pressure 1013 hPa"));
        assert!(text.contains("Wind 5.0 m/s (18.0 km/h) SW"));
        assert!(text.contains("Local time 01:25, day"));
        assert!(text.contains("Mon 10 Jun  22/13°C  rain 10%"));
    }

    #[test]
    fn renders_json_snapshot() {
        let opts = Options { trace: false, json: true };
        let text = render(&resolution(), opts, Utc::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["location_name"], "Paris");
        assert_eq!(value["source"], "openweather");
    }
}
