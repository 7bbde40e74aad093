use std::fmt;
use std::path::PathBuf;

use chrono::{Datelike, Months, NaiveDate};

use crate::model::{DateRange, Day};
use crate::packer::DEFAULT_LANE_HEIGHT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Runtime settings, read from `PLANLINE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub rows_path: PathBuf,
    pub window: DateRange,
    pub lane_height: f64,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env(today: Day) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), today)
    }

    /// Window defaults to the calendar month containing `today`.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>, today: Day) -> Result<Self, ConfigError> {
        let rows_path = get("PLANLINE_ROWS").unwrap_or_else(|| "./rows.json".into()).into();

        let month_start = today.with_day(1).unwrap_or(today);
        let month_end = month_start
            .checked_add_months(Months::new(1))
            .and_then(|d| d.pred_opt())
            .unwrap_or(today);
        let start = date_var(&get, "PLANLINE_FROM")?.unwrap_or(month_start);
        let end = date_var(&get, "PLANLINE_TO")?.unwrap_or(month_end);
        let window = DateRange::checked(start, end).ok_or_else(|| ConfigError {
            var: "PLANLINE_TO",
            message: format!("{end} is before {start}"),
        })?;

        let lane_height: f64 = get("PLANLINE_LANE_HEIGHT")
            .and_then(|s| s.parse().ok())
            .filter(|h: &f64| h.is_finite() && *h > 0.0)
            .unwrap_or(DEFAULT_LANE_HEIGHT);

        let metrics_port: Option<u16> = get("PLANLINE_METRICS_PORT").and_then(|s| s.parse().ok());

        Ok(Self {
            rows_path,
            window,
            lane_height,
            metrics_port,
        })
    }
}

fn date_var(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<Day>, ConfigError> {
    let Some(raw) = get(var) else { return Ok(None) };
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|e| ConfigError {
            var,
            message: format!("{raw:?}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn d(y: i32, m: u32, day: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = Config::from_lookup(lookup(&[]), d(2024, 2, 14)).unwrap();
        assert_eq!(cfg.rows_path, PathBuf::from("./rows.json"));
        assert_eq!(cfg.window, DateRange::new(d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(cfg.lane_height, DEFAULT_LANE_HEIGHT);
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn explicit_values() {
        let cfg = Config::from_lookup(
            lookup(&[
                ("PLANLINE_ROWS", "/data/rows.json"),
                ("PLANLINE_FROM", "2024-01-01"),
                ("PLANLINE_TO", "2024-03-31"),
                ("PLANLINE_LANE_HEIGHT", "30"),
                ("PLANLINE_METRICS_PORT", "9100"),
            ]),
            d(2024, 6, 1),
        )
        .unwrap();
        assert_eq!(cfg.window.len_days(), 91);
        assert_eq!(cfg.lane_height, 30.0);
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn bad_lane_height_falls_back() {
        let cfg = Config::from_lookup(lookup(&[("PLANLINE_LANE_HEIGHT", "-3")]), d(2024, 1, 1)).unwrap();
        assert_eq!(cfg.lane_height, DEFAULT_LANE_HEIGHT);
    }

    #[test]
    fn malformed_or_reversed_window_is_error() {
        let err = Config::from_lookup(lookup(&[("PLANLINE_FROM", "01/02/2024")]), d(2024, 1, 1)).unwrap_err();
        assert_eq!(err.var, "PLANLINE_FROM");

        let err = Config::from_lookup(
            lookup(&[("PLANLINE_FROM", "2024-02-01"), ("PLANLINE_TO", "2024-01-01")]),
            d(2024, 1, 1),
        )
        .unwrap_err();
        assert_eq!(err.var, "PLANLINE_TO");
    }
}
