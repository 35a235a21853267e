//! Bulk CSV loading for the incident dataset.
use std::io::Read;
use std::path::Path;

use crate::{Dataset, DashboardError, RawRow};

/// Column positions resolved once from the header row.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct ColumnMap {
    region: Option<usize>,
    date: Option<usize>,
    lat: Option<usize>,
    lon: Option<usize>,
}

impl ColumnMap {
    /// `lon` wins over `long` when a file carries both.
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let position = |name: &str| headers.iter().position(|header| header == name);
        Self {
            region: position("region"),
            date: position("date"),
            lat: position("lat"),
            lon: position("lon").or_else(|| position("long")),
        }
    }

    fn row(&self, record: &csv::StringRecord) -> RawRow {
        let field = |index: Option<usize>| {
            index
                .and_then(|index| record.get(index))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        RawRow {
            region: field(self.region),
            date: field(self.date),
            lat: field(self.lat),
            lon: field(self.lon),
        }
    }
}

/// Reads every row with a header-derived column mapping.
///
/// Short rows yield `None` for the missing trailing columns and extra
/// columns are ignored. Rows the reader cannot decode at all are logged and
/// skipped; only a failure to read the header aborts the load.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<RawRow>, DashboardError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let columns = ColumnMap::from_headers(reader.headers()?);
    if columns.region.is_none() {
        tracing::warn!("incident csv has no region column; every row will be counted as missing a region");
    }

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(columns.row(&record)),
            Err(err) => tracing::warn!("skipping undecodable csv row {}: {}", index + 1, err),
        }
    }
    Ok(rows)
}

pub fn load_rows(path: &Path) -> Result<Vec<RawRow>, DashboardError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    read_rows(file)
}

/// Loads and aggregates the dataset at `path`, falling back to an empty
/// dataset when the file cannot be read.
pub fn load_dataset(path: &Path) -> Dataset {
    match load_rows(path) {
        Ok(rows) => {
            let dataset = Dataset::ingest(rows);
            let summary = dataset.summary();
            tracing::info!(
                "loaded {} incident rows from {} ({} dated, {} undated, {} invalid, {} without region, {} mapped)",
                summary.total_rows,
                path.display(),
                summary.dated_rows,
                summary.undated_rows,
                summary.invalid_rows,
                summary.missing_region_rows,
                summary.mapped_rows
            );
            dataset
        }
        Err(err) => {
            tracing::warn!(
                "failed to load incidents from {}: {}; serving an empty dataset",
                path.display(),
                err
            );
            Dataset::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_with_long_alias() {
        let csv = "region,date,lat,long\n\
                   Region I,05/03/2020,10,120\n\
                   Region II,,,\n";
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].region.as_deref(), Some("Region I"));
        assert_eq!(rows[0].lon.as_deref(), Some("120"));
        assert_eq!(rows[1].date, None);
        assert_eq!(rows[1].lat, None);
    }

    #[test]
    fn tolerates_extra_and_missing_columns() {
        let csv = " region , date ,lat,lon,source\n\
                   CAR,09/09/2018,16.4,120.6,PAGASA\n\
                   CAR,10/09/2018\n";
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lat.as_deref(), Some("16.4"));
        assert_eq!(rows[1].date.as_deref(), Some("10/09/2018"));
        assert_eq!(rows[1].lon, None);

        let dataset = Dataset::ingest(rows);
        assert_eq!(dataset.aggregates().monthly_counts_by_region["CAR"][8], 2);
        assert_eq!(dataset.geo_features().len(), 1);
    }

    #[test]
    fn short_rows_still_count_as_dated() {
        let csv = "region,date,lat,lon\n\
                   Region I,05/03/2020\n\
                   Region I\n";
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date.as_deref(), Some("05/03/2020"));
        assert_eq!(rows[0].lat, None);
        assert_eq!(rows[1].date, None);

        let dataset = Dataset::ingest(rows);
        let aggregates = dataset.aggregates();
        assert_eq!(aggregates.monthly_counts_by_region["Region I"][2], 1);
        assert_eq!(aggregates.dated_row_count, 1);
        assert_eq!(aggregates.undated_row_count, 1);
        assert!(dataset.geo_features().is_empty());
    }

    #[test]
    fn prefers_lon_over_long_when_both_present() {
        let csv = "region,date,lat,lon,long\n\
                   Region I,05/03/2020,10,120,999\n\
                   Region I,06/03/2020,10,,121\n";
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lon.as_deref(), Some("120"));
        assert_eq!(rows[1].lon, None);
        assert_eq!(Dataset::ingest(rows).geo_features().len(), 1);
    }

    #[test]
    fn missing_region_column_counts_every_row_as_missing_region() {
        let csv = "date,lat,lon\n05/03/2020,10,120\n";
        let dataset = Dataset::ingest(read_rows(csv.as_bytes()).unwrap());
        assert_eq!(dataset.aggregates().missing_region_count, 1);
        assert!(dataset.records().is_empty());
    }

    #[test]
    fn empty_input_has_no_rows() {
        assert!(read_rows("".as_bytes()).unwrap().is_empty());
        assert!(read_rows("region,date,lat,lon\n".as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn missing_file_loads_empty_dataset() {
        let dataset = load_dataset(Path::new("does/not/exist.csv"));
        assert!(dataset.records().is_empty());
        assert_eq!(dataset.summary().total_rows, 0);
    }
}
