use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExplorerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = ExplorerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(ExplorerError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    #[default]
    Fi,
}

impl Locale {
    pub fn as_param(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Fi => "fi",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Granularity {
    #[value(name = "3min")]
    #[serde(rename = "3min")]
    ThreeMinutes,
    #[value(name = "15min")]
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[value(name = "hour", alias = "Hour")]
    Hour,
    #[value(name = "day", alias = "Day")]
    Day,
    #[value(name = "week", alias = "Week")]
    Week,
    #[value(name = "month", alias = "Month")]
    Month,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::ThreeMinutes,
        Granularity::FifteenMinutes,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
    ];

    /// Bucket width for the fixed-size granularities. Calendar buckets return `None`.
    pub fn fixed_width(self) -> Option<Duration> {
        match self {
            Granularity::ThreeMinutes => Some(Duration::minutes(3)),
            Granularity::FifteenMinutes => Some(Duration::minutes(15)),
            Granularity::Hour => Some(Duration::hours(1)),
            Granularity::Day | Granularity::Week | Granularity::Month => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::ThreeMinutes => write!(f, "3min"),
            Granularity::FifteenMinutes => write!(f, "15min"),
            Granularity::Hour => write!(f, "Hour"),
            Granularity::Day => write!(f, "Day"),
            Granularity::Week => write!(f, "Week"),
            Granularity::Month => write!(f, "Month"),
        }
    }
}

impl FromStr for Granularity {
    type Err = ExplorerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "3min" => Ok(Granularity::ThreeMinutes),
            "15min" => Ok(Granularity::FifteenMinutes),
            "hour" | "h" => Ok(Granularity::Hour),
            "day" | "d" => Ok(Granularity::Day),
            "week" | "w" => Ok(Granularity::Week),
            "month" | "m" => Ok(Granularity::Month),
            _ => Err(ExplorerError::InvalidGranularity(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    Mean,
    Sum,
    #[value(name = "ffill", alias = "forward-fill")]
    Ffill,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Mean => write!(f, "mean"),
            AggregationMode::Sum => write!(f, "sum"),
            AggregationMode::Ffill => write!(f, "ffill"),
        }
    }
}

/// Inclusive range of calendar days requested from the series endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ExplorerError> {
        if end < start {
            return Err(ExplorerError::InvalidRange(format!(
                "end date {end} is before start date {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn start_param(&self) -> String {
        format!("{}T00:00:00Z", self.start.format("%Y-%m-%d"))
    }

    pub fn end_param(&self) -> String {
        format!("{}T23:59:00Z", self.end.format("%Y-%m-%d"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetDescriptor {
    pub id: DatasetId,
    pub name_en: String,
    pub name_fi: String,
    pub data_period_en: String,
    pub data_period_fi: String,
    pub unit_en: String,
    pub unit_fi: String,
    pub search_score: f64,
    pub description_en: String,
    pub description_fi: String,
}

impl DatasetDescriptor {
    pub fn name(&self, locale: Locale) -> &str {
        pick(locale, &self.name_en, &self.name_fi)
    }

    pub fn data_period(&self, locale: Locale) -> &str {
        pick(locale, &self.data_period_en, &self.data_period_fi)
    }

    pub fn unit(&self, locale: Locale) -> &str {
        pick(locale, &self.unit_en, &self.unit_fi)
    }

    pub fn description(&self, locale: Locale) -> &str {
        pick(locale, &self.description_en, &self.description_fi)
    }

    pub fn interval_minutes(&self) -> Option<u32> {
        interval_minutes(&self.data_period_en)
    }
}

fn pick<'a>(locale: Locale, en: &'a str, fi: &'a str) -> &'a str {
    match locale {
        Locale::En if !en.is_empty() => en,
        Locale::Fi if !fi.is_empty() => fi,
        Locale::En => fi,
        Locale::Fi => en,
    }
}

/// Parses the provider's measurement interval label ("3 min", "15 min", "Hour", "1 h").
pub fn interval_minutes(label: &str) -> Option<u32> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*(\d+)?\s*(min|minutes?|h|hours?|d|days?)\s*$").unwrap()
    });
    let caps = pattern.captures(label)?;
    let count = match caps.get(1) {
        Some(value) => value.as_str().parse::<u32>().ok()?,
        None => 1,
    };
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    let scale = if unit.starts_with("min") {
        1
    } else if unit.starts_with('h') {
        60
    } else {
        24 * 60
    };
    count.checked_mul(scale)
}
