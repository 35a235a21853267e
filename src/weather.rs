//! Rainfall and soil-moisture lookup for a clicked point, backed by the
//! Open-Meteo hourly forecast archive.
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::location::{fetch_with_retry, validate_coordinates};
use crate::DashboardError;

const DEFAULT_TIME: &str = "23:59";
const HISTORY_DAYS: i64 = 6;
const HOURLY_CHART_POINTS: usize = 12;
const DAILY_CHART_DAYS: i64 = 5;
const HOURLY_VARIABLES: &str = "precipitation,soil_moisture_27_to_81cm";

/// Raw `/api/weather` query parameters.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WeatherQuery {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

/// A validated lookup: a point and the moment the rainfall windows end at.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeatherRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub end: NaiveDateTime,
}

impl TryFrom<WeatherQuery> for WeatherRequest {
    type Error = DashboardError;

    fn try_from(query: WeatherQuery) -> Result<Self, Self::Error> {
        let latitude = required_number(query.latitude.as_deref(), "latitude")?;
        let longitude = required_number(query.longitude.as_deref(), "longitude")?;
        validate_coordinates(latitude, longitude)?;

        let date = required(query.date.as_deref(), "date")?;
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| DashboardError::InvalidWeatherRequest(format!("date must be YYYY-MM-DD, got {date:?}")))?;
        let time = required(query.time.as_deref(), "time").unwrap_or(DEFAULT_TIME);
        let time = NaiveTime::parse_from_str(time, "%H:%M")
            .map_err(|_| DashboardError::InvalidWeatherRequest(format!("time must be HH:MM, got {time:?}")))?;

        Ok(Self {
            latitude,
            longitude,
            end: date.and_time(time),
        })
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, DashboardError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DashboardError::InvalidWeatherRequest(format!("missing {name}")))
}

fn required_number(value: Option<&str>, name: &str) -> Result<f64, DashboardError> {
    let value = required(value, name)?;
    value
        .parse()
        .map_err(|_| DashboardError::InvalidWeatherRequest(format!("{name} is not a number: {value:?}")))
}

/// Hourly block of an Open-Meteo forecast response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct HourlySeries {
    pub time: Vec<String>,
    #[serde(default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(default)]
    pub soil_moisture_27_to_81cm: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    hourly: HourlySeries,
}

/// One value per rainfall window, keyed the way the dashboard charts expect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RainfallWindows {
    #[serde(rename = "3_hr")]
    pub three_hours: f64,
    #[serde(rename = "6_hr")]
    pub six_hours: f64,
    #[serde(rename = "12_hr")]
    pub twelve_hours: f64,
    #[serde(rename = "1_day")]
    pub one_day: f64,
    #[serde(rename = "3_day")]
    pub three_days: f64,
    #[serde(rename = "5_day")]
    pub five_days: f64,
}

impl RainfallWindows {
    fn from_fn(value: impl Fn(i64) -> f64) -> Self {
        Self {
            three_hours: value(3),
            six_hours: value(6),
            twelve_hours: value(12),
            one_day: value(24),
            three_days: value(72),
            five_days: value(120),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourlyPoint {
    pub hour: String,
    pub cumulative: f64,
    pub intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub cumulative: f64,
    pub intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub soil_moisture: f64,
    pub cumulative_rainfall: RainfallWindows,
    pub rain_intensity: RainfallWindows,
    pub hourly_chart_data: Vec<HourlyPoint>,
    pub daily_chart_data: Vec<DailyPoint>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Sample {
    at: NaiveDateTime,
    rain: f64,
    soil_moisture: f64,
}

/// Condenses an hourly series into the window totals and chart series that
/// end at `end`. Missing readings count as zero; samples after `end` are
/// ignored.
pub fn summarize(hourly: &HourlySeries, end: NaiveDateTime) -> Result<WeatherSummary, DashboardError> {
    let samples = samples_until(hourly, end);
    let Some(last) = samples.last() else {
        return Err(DashboardError::NoWeatherData);
    };

    let cumulative = |hours: i64| {
        let start = end - TimeDelta::hours(hours);
        samples
            .iter()
            .filter(|sample| sample.at > start)
            .map(|sample| sample.rain)
            .sum::<f64>()
    };

    Ok(WeatherSummary {
        soil_moisture: last.soil_moisture,
        cumulative_rainfall: RainfallWindows::from_fn(&cumulative),
        rain_intensity: RainfallWindows::from_fn(|hours| cumulative(hours) / hours as f64),
        hourly_chart_data: hourly_chart(&samples),
        daily_chart_data: daily_chart(&samples, end),
    })
}

fn samples_until(hourly: &HourlySeries, end: NaiveDateTime) -> Vec<Sample> {
    let mut samples: Vec<Sample> = hourly
        .time
        .iter()
        .enumerate()
        .filter_map(|(index, time)| {
            let at = match NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M") {
                Ok(at) => at,
                Err(err) => {
                    tracing::warn!("skipping unparseable weather timestamp {:?}: {}", time, err);
                    return None;
                }
            };
            let reading = |values: &[Option<f64>]| values.get(index).copied().flatten().unwrap_or(0.0);
            Some(Sample {
                at,
                rain: reading(&hourly.precipitation),
                soil_moisture: reading(&hourly.soil_moisture_27_to_81cm),
            })
        })
        .filter(|sample| sample.at <= end)
        .collect();
    samples.sort_by_key(|sample| sample.at);
    samples
}

/// Running total over the last twelve readings.
fn hourly_chart(samples: &[Sample]) -> Vec<HourlyPoint> {
    let start = samples.len().saturating_sub(HOURLY_CHART_POINTS);
    let mut running = 0.0;
    samples[start..]
        .iter()
        .map(|sample| {
            running += sample.rain;
            HourlyPoint {
                hour: sample.at.format("%H:00").to_string(),
                cumulative: running,
                intensity: sample.rain,
            }
        })
        .collect()
}

/// Per-day totals for the calendar day of `end` and the four before it.
fn daily_chart(samples: &[Sample], end: NaiveDateTime) -> Vec<DailyPoint> {
    let first_day = end.date() - TimeDelta::days(DAILY_CHART_DAYS - 1);
    let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sample in samples.iter().filter(|sample| sample.at.date() >= first_day) {
        *totals.entry(sample.at.date()).or_insert(0.0) += sample.rain;
    }
    totals
        .into_iter()
        .map(|(day, total)| DailyPoint {
            date: day.format("%b %d").to_string(),
            cumulative: total,
            intensity: total / 24.0,
        })
        .collect()
}

pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("falling back to default http client: {}", err);
                reqwest::Client::new()
            });
        Self { client, base_url }
    }

    pub async fn fetch_weather(&self, request: &WeatherRequest) -> Result<WeatherSummary, DashboardError> {
        let url = forecast_url(&self.base_url, request);
        tracing::debug!("fetching weather: {}", url);
        let body = fetch_with_retry(&self.client, &url).await?;
        let forecast: ForecastResponse = serde_json::from_value(body)
            .map_err(|err| DashboardError::Upstream(format!("weather response parse failed: {err}")))?;
        summarize(&forecast.hourly, request.end)
    }
}

fn forecast_url(base_url: &str, request: &WeatherRequest) -> String {
    let start_date = (request.end - TimeDelta::days(HISTORY_DAYS)).date();
    let params = [
        ("latitude", request.latitude.to_string()),
        ("longitude", request.longitude.to_string()),
        ("hourly", HOURLY_VARIABLES.to_string()),
        ("start_date", start_date.format("%Y-%m-%d").to_string()),
        ("end_date", request.end.date().format("%Y-%m-%d").to_string()),
        ("timezone", "auto".to_string()),
        ("precipitation_unit", "inch".to_string()),
    ];
    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base_url, separator, query)
}
