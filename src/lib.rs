use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod api;
pub mod config;
pub mod crossfilter;
pub mod dataset;
pub mod location;
pub mod weather;

pub use aggregate::{Aggregates, Dataset, GeoFeature, IncidentRecord, RawRow, RegionCount};
pub use config::Config;
pub use crossfilter::{ChartSeries, DashboardView, FilterEvent, FilterQuery, FilterState, MapFilter, Resolution};
pub use location::LocationClient;
pub use weather::{WeatherClient, WeatherQuery, WeatherRequest, WeatherSummary};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("failed to read incident data: {0}")]
    Csv(#[from] csv::Error),
    #[error("year and month filters cannot both be set")]
    ConflictingFilters,
    #[error("unknown month code: {0}")]
    UnknownMonth(String),
    #[error("invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },
    #[error("geospatial service url is not configured")]
    GeospatialNotConfigured,
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("invalid weather request: {0}")]
    InvalidWeatherRequest(String),
    #[error("no weather data available for the selected time")]
    NoWeatherData,
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

/// Calendar month, serialized as its three-letter code (`"Jan"`).
///
/// Deserializing goes through [`FromStr`], so codes are matched
/// case-insensitively wherever a month arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn code(self) -> &'static str {
        match self {
            Month::Jan => "Jan",
            Month::Feb => "Feb",
            Month::Mar => "Mar",
            Month::Apr => "Apr",
            Month::May => "May",
            Month::Jun => "Jun",
            Month::Jul => "Jul",
            Month::Aug => "Aug",
            Month::Sep => "Sep",
            Month::Oct => "Oct",
            Month::Nov => "Nov",
            Month::Dec => "Dec",
        }
    }

    pub fn full_name(self) -> &'static str {
        match self {
            Month::Jan => "January",
            Month::Feb => "February",
            Month::Mar => "March",
            Month::Apr => "April",
            Month::May => "May",
            Month::Jun => "June",
            Month::Jul => "July",
            Month::Aug => "August",
            Month::Sep => "September",
            Month::Oct => "October",
            Month::Nov => "November",
            Month::Dec => "December",
        }
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.code())
    }
}

impl FromStr for Month {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|month| month.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| DashboardError::UnknownMonth(trimmed.to_string()))
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}
