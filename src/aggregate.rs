//! Incident ingestion and per-region monthly/yearly aggregation.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::Month;

/// Twelve counts, index 0 = January.
pub type MonthlyCounts = [u32; 12];
/// Year string as it appears in the source, mapped to a count.
pub type YearlyCounts = BTreeMap<String, u32>;

const TOP_REGION_LIMIT: usize = 5;

/// One row as delivered by the CSV collaborator. Every column is optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRow {
    pub region: Option<String>,
    pub date: Option<String>,
    pub lat: Option<String>,
    pub lon: Option<String>,
}

/// A row that survived region validation.
#[derive(Clone, Debug, PartialEq)]
pub struct IncidentRecord {
    pub region: String,
    pub date: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateStatus<'a> {
    Missing,
    Malformed,
    Valid { year: &'a str, month: Month },
}

impl IncidentRecord {
    pub fn from_raw(row: &RawRow) -> Option<Self> {
        let region = non_empty(row.region.as_deref())?;
        Some(Self {
            region: region.to_string(),
            date: non_empty(row.date.as_deref()).map(str::to_string),
            lat: parse_coordinate(row.lat.as_deref()),
            lon: parse_coordinate(row.lon.as_deref()),
        })
    }

    pub fn date_status(&self) -> DateStatus<'_> {
        match self.date.as_deref() {
            None => DateStatus::Missing,
            Some(date) => match parse_incident_date(date) {
                Some((year, month)) => DateStatus::Valid { year, month },
                None => DateStatus::Malformed,
            },
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }
}

/// Splits a `DD/MM/YYYY` date into its year string and month.
///
/// Exactly three `/`-separated parts are required, the year must be
/// non-empty and the month must be a number in `1..=12`. The day is not
/// inspected.
pub fn parse_incident_date(date: &str) -> Option<(&str, Month)> {
    let mut parts = date.split('/');
    let (_day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let year = year.trim();
    if year.is_empty() {
        return None;
    }
    let month_number: i64 = month.trim().parse().ok()?;
    let index = usize::try_from(month_number.checked_sub(1)?).ok()?;
    Some((year, Month::from_index(index)?))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_coordinate(value: Option<&str>) -> Option<f64> {
    non_empty(value)?
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Point for the incident map layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeoFeature {
    pub region: String,
    pub date: String,
    pub year: Option<i32>,
    pub lat: f64,
    pub lon: f64,
}

impl GeoFeature {
    fn from_record(record: &IncidentRecord) -> Option<Self> {
        let (lat, lon) = record.coordinates()?;
        let year = record
            .date
            .as_deref()
            .and_then(|date| date.split('/').nth(2))
            .and_then(|year| year.trim().parse::<i32>().ok());
        Some(Self {
            region: record.region.clone(),
            date: record.date.clone().unwrap_or_else(|| "N/A".to_string()),
            year,
            lat,
            lon,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCount {
    pub region: String,
    pub count: u32,
}

/// Counts derived once per dataset load. Never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregates {
    pub monthly_counts_by_region: BTreeMap<String, MonthlyCounts>,
    pub yearly_counts_by_region: BTreeMap<String, YearlyCounts>,
    pub invalid_row_count: usize,
    pub dated_row_count: usize,
    pub undated_row_count: usize,
    pub missing_region_count: usize,
    /// Geo-eligible rows per region, used for the top-regions ranking.
    pub region_counts: BTreeMap<String, u32>,
}

impl Aggregates {
    fn record(&mut self, record: &IncidentRecord) {
        if record.coordinates().is_some() {
            *self.region_counts.entry(record.region.clone()).or_insert(0) += 1;
        }

        match record.date_status() {
            DateStatus::Valid { year, month } => {
                self.dated_row_count += 1;
                self.monthly_counts_by_region
                    .entry(record.region.clone())
                    .or_insert([0; 12])[month.index()] += 1;
                *self
                    .yearly_counts_by_region
                    .entry(record.region.clone())
                    .or_default()
                    .entry(year.to_string())
                    .or_insert(0) += 1;
            }
            DateStatus::Malformed => {
                tracing::debug!(
                    "invalid row (bad date format or value): region={} date={:?}",
                    record.region,
                    record.date
                );
                self.invalid_row_count += 1;
            }
            DateStatus::Missing => {
                self.undated_row_count += 1;
            }
        }
    }

    /// Monthly counts for one region, or the elementwise sum over all regions.
    pub fn monthly_for(&self, region: Option<&str>) -> MonthlyCounts {
        match region {
            Some(region) => self
                .monthly_counts_by_region
                .get(region)
                .copied()
                .unwrap_or([0; 12]),
            None => self
                .monthly_counts_by_region
                .values()
                .fold([0; 12], |mut total, counts| {
                    for (slot, count) in total.iter_mut().zip(counts) {
                        *slot += count;
                    }
                    total
                }),
        }
    }

    /// Yearly counts for one region, or the per-year sum over all regions.
    pub fn yearly_for(&self, region: Option<&str>) -> YearlyCounts {
        match region {
            Some(region) => self
                .yearly_counts_by_region
                .get(region)
                .cloned()
                .unwrap_or_default(),
            None => {
                let mut total = YearlyCounts::new();
                for years in self.yearly_counts_by_region.values() {
                    for (year, count) in years {
                        *total.entry(year.clone()).or_insert(0) += count;
                    }
                }
                total
            }
        }
    }

    pub fn top_regions(&self, limit: usize) -> Vec<RegionCount> {
        let mut ranked: Vec<RegionCount> = self
            .region_counts
            .iter()
            .map(|(region, count)| RegionCount {
                region: region.clone(),
                count: *count,
            })
            .collect();
        // BTreeMap iteration already orders ties by name; the sort is stable.
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked.truncate(limit);
        ranked
    }
}

/// Everything built from one bulk load.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    records: Vec<IncidentRecord>,
    geo_features: Vec<GeoFeature>,
    aggregates: Aggregates,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub total_rows: usize,
    pub dated_rows: usize,
    pub undated_rows: usize,
    pub invalid_rows: usize,
    pub missing_region_rows: usize,
    pub mapped_rows: usize,
    pub top_regions: Vec<RegionCount>,
}

impl Dataset {
    pub fn ingest<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = RawRow>,
    {
        let mut dataset = Dataset::default();
        for row in rows {
            let Some(record) = IncidentRecord::from_raw(&row) else {
                tracing::debug!("skipping row without region: {:?}", row);
                dataset.aggregates.missing_region_count += 1;
                continue;
            };
            if let Some(feature) = GeoFeature::from_record(&record) {
                dataset.geo_features.push(feature);
            }
            dataset.aggregates.record(&record);
            dataset.records.push(record);
        }
        dataset
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    pub fn geo_features(&self) -> &[GeoFeature] {
        &self.geo_features
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    /// Distinct region names, sorted, for the region selector.
    pub fn regions(&self) -> Vec<String> {
        let mut regions: Vec<String> = self
            .records
            .iter()
            .map(|record| record.region.clone())
            .collect();
        regions.sort();
        regions.dedup();
        regions
    }

    pub fn summary(&self) -> DatasetSummary {
        let aggregates = &self.aggregates;
        DatasetSummary {
            total_rows: self.records.len() + aggregates.missing_region_count,
            dated_rows: aggregates.dated_row_count,
            undated_rows: aggregates.undated_row_count,
            invalid_rows: aggregates.invalid_row_count,
            missing_region_rows: aggregates.missing_region_count,
            mapped_rows: self.geo_features.len(),
            top_regions: aggregates.top_regions(TOP_REGION_LIMIT),
        }
    }
}
