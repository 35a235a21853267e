//! Region/year/month cross-filtering for the two history charts.
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregates, Dataset, DateStatus, IncidentRecord, MonthlyCounts, YearlyCounts};
use crate::{DashboardError, Month};

pub const DEFAULT_MONTHLY_TITLE: &str = "History of All Landslides (Monthly)";
pub const DEFAULT_YEARLY_TITLE: &str = "History of All Landslides (Yearly)";

/// Current selection. Year and month are never both set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterQuery")]
pub struct FilterState {
    region: Option<String>,
    year: Option<String>,
    month: Option<Month>,
}

/// Loosely typed filter input as it arrives in a query string or JSON body.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterQuery {
    pub region: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
}

impl TryFrom<FilterQuery> for FilterState {
    type Error = DashboardError;

    fn try_from(query: FilterQuery) -> Result<Self, Self::Error> {
        let year = non_empty(query.year);
        let month = non_empty(query.month)
            .map(|code| code.parse::<Month>())
            .transpose()?;
        if year.is_some() && month.is_some() {
            return Err(DashboardError::ConflictingFilters);
        }
        Ok(Self {
            region: non_empty(query.region),
            year,
            month,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// A UI interaction that changes the filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterEvent {
    SetRegion {
        #[serde(default)]
        region: Option<String>,
    },
    ClickMonthBar {
        month: Month,
    },
    ClickYearBar {
        year: String,
    },
    Reset,
}

impl FilterState {
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn year(&self) -> Option<&str> {
        self.year.as_deref()
    }

    pub fn month(&self) -> Option<Month> {
        self.month
    }

    /// Selects a region (empty means all regions) and drops any year or month.
    pub fn set_region(&mut self, region: &str) {
        let region = region.trim();
        self.region = (!region.is_empty()).then(|| region.to_string());
        self.year = None;
        self.month = None;
    }

    pub fn click_month_bar(&mut self, month: Month) {
        if self.month == Some(month) {
            self.month = None;
        } else {
            self.month = Some(month);
            self.year = None;
        }
    }

    /// A blank year label is ignored.
    pub fn click_year_bar(&mut self, year: &str) {
        let year = year.trim();
        if year.is_empty() {
            return;
        }
        if self.year.as_deref() == Some(year) {
            self.year = None;
        } else {
            self.year = Some(year.to_string());
            self.month = None;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn apply(&mut self, event: &FilterEvent) {
        match event {
            FilterEvent::SetRegion { region } => self.set_region(region.as_deref().unwrap_or("")),
            FilterEvent::ClickMonthBar { month } => self.click_month_bar(*month),
            FilterEvent::ClickYearBar { year } => self.click_year_bar(year),
            FilterEvent::Reset => self.reset(),
        }
    }

    pub fn map_filter(&self) -> MapFilter {
        MapFilter {
            region_equals: self.region.clone(),
        }
    }

    pub fn show_reset_control(&self) -> bool {
        self.year.is_some() || self.month.is_some()
    }
}

/// Chart data for one filter state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub monthly_series: MonthlyCounts,
    pub yearly_series: YearlyCounts,
    pub monthly_chart_title: String,
    pub yearly_chart_title: String,
    pub show_reset_control: bool,
}

pub fn resolve(state: &FilterState, records: &[IncidentRecord], aggregates: &Aggregates) -> Resolution {
    let region = state.region();
    let mut monthly_chart_title = DEFAULT_MONTHLY_TITLE.to_string();
    let mut yearly_chart_title = DEFAULT_YEARLY_TITLE.to_string();

    let (monthly_series, yearly_series) = if let Some(month) = state.month() {
        yearly_chart_title = format!("Landslides in {} (by Year)", month.full_name());
        (
            aggregates.monthly_for(region),
            yearly_for_month(records, region, month),
        )
    } else if let Some(year) = state.year() {
        monthly_chart_title = format!("Monthly Landslides in {year}");
        (
            monthly_for_year(records, region, year),
            aggregates.yearly_for(region),
        )
    } else {
        (aggregates.monthly_for(region), aggregates.yearly_for(region))
    };

    Resolution {
        monthly_series,
        yearly_series,
        monthly_chart_title,
        yearly_chart_title,
        show_reset_control: state.show_reset_control(),
    }
}

fn in_region(record: &IncidentRecord, region: Option<&str>) -> bool {
    region.is_none_or(|region| record.region == region)
}

fn yearly_for_month(records: &[IncidentRecord], region: Option<&str>, month: Month) -> YearlyCounts {
    let mut yearly = YearlyCounts::new();
    for record in records.iter().filter(|record| in_region(record, region)) {
        if let DateStatus::Valid { year, month: record_month } = record.date_status() {
            if record_month == month {
                *yearly.entry(year.to_string()).or_insert(0) += 1;
            }
        }
    }
    yearly
}

fn monthly_for_year(records: &[IncidentRecord], region: Option<&str>, year: &str) -> MonthlyCounts {
    let mut monthly = [0; 12];
    for record in records.iter().filter(|record| in_region(record, region)) {
        if let DateStatus::Valid { year: record_year, month } = record.date_status() {
            if record_year == year {
                monthly[month.index()] += 1;
            }
        }
    }
    monthly
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<u32>,
    pub highlight_index: Option<usize>,
}

/// Feature filter for the incident map layer; `None` shows everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapFilter {
    pub region_equals: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub monthly_chart: ChartSeries,
    pub yearly_chart: ChartSeries,
    pub monthly_chart_title: String,
    pub yearly_chart_title: String,
    pub show_reset_control: bool,
    pub map_filter: MapFilter,
}

impl DashboardView {
    pub fn new(state: &FilterState, resolution: Resolution) -> Self {
        let monthly_chart = ChartSeries {
            labels: Month::ALL.iter().map(|month| month.code().to_string()).collect(),
            values: resolution.monthly_series.to_vec(),
            highlight_index: state.month().map(Month::index),
        };

        // BTreeMap keys iterate in ascending string order.
        let (labels, values): (Vec<String>, Vec<u32>) = resolution.yearly_series.into_iter().unzip();
        let highlight_index = state
            .year()
            .and_then(|year| labels.iter().position(|label| label == year));
        let yearly_chart = ChartSeries {
            labels,
            values,
            highlight_index,
        };

        Self {
            monthly_chart,
            yearly_chart,
            monthly_chart_title: resolution.monthly_chart_title,
            yearly_chart_title: resolution.yearly_chart_title,
            show_reset_control: resolution.show_reset_control,
            map_filter: state.map_filter(),
        }
    }
}

impl Dataset {
    pub fn resolve(&self, state: &FilterState) -> Resolution {
        resolve(state, self.records(), self.aggregates())
    }

    pub fn view(&self, state: &FilterState) -> DashboardView {
        DashboardView::new(state, self.resolve(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{row, scenario_rows};

    fn dataset() -> Dataset {
        let mut rows = scenario_rows();
        rows.extend([
            row("Region II", Some("14/03/2020"), None, None),
            row("Region II", Some("02/08/2019"), Some("15.1"), Some("120.9")),
            row("Region III", None, Some("7.0"), Some("125.6")),
        ]);
        Dataset::ingest(rows)
    }

    fn state(region: Option<&str>, year: Option<&str>, month: Option<&str>) -> FilterState {
        FilterState::try_from(FilterQuery {
            region: region.map(str::to_string),
            year: year.map(str::to_string),
            month: month.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn year_selection_rescans_months() {
        let dataset = Dataset::ingest(scenario_rows());
        let mut filter = FilterState::default();
        filter.click_year_bar("2020");

        let resolution = dataset.resolve(&filter);
        assert_eq!(resolution.monthly_series, [0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let expected: YearlyCounts = [("2020".to_string(), 1), ("2021".to_string(), 1)].into();
        assert_eq!(resolution.yearly_series, expected);
        assert_eq!(resolution.monthly_chart_title, "Monthly Landslides in 2020");
        assert_eq!(resolution.yearly_chart_title, DEFAULT_YEARLY_TITLE);
        assert!(resolution.show_reset_control);
    }

    #[test]
    fn month_selection_rescans_years() {
        let dataset = dataset();
        let resolution = dataset.resolve(&state(None, None, Some("Mar")));

        let expected: YearlyCounts = [("2020".to_string(), 2), ("2021".to_string(), 1)].into();
        assert_eq!(resolution.yearly_series, expected);
        assert_eq!(resolution.monthly_series, dataset.aggregates().monthly_for(None));
        assert_eq!(resolution.yearly_chart_title, "Landslides in March (by Year)");
        assert_eq!(resolution.monthly_chart_title, DEFAULT_MONTHLY_TITLE);
        assert!(resolution.show_reset_control);
    }

    #[test]
    fn region_filter_applies_to_rescans() {
        let dataset = dataset();

        let by_month = dataset.resolve(&state(Some("Region II"), None, Some("Mar")));
        let expected: YearlyCounts = [("2020".to_string(), 1)].into();
        assert_eq!(by_month.yearly_series, expected);
        assert_eq!(by_month.monthly_series[Month::Aug.index()], 1);

        let by_year = dataset.resolve(&state(Some("Region I"), Some("2021"), None));
        assert_eq!(by_year.monthly_series, [0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(by_year.yearly_series.len(), 2);
    }

    #[test]
    fn default_view_sums_all_regions() {
        let dataset = dataset();
        let resolution = dataset.resolve(&FilterState::default());
        let aggregates = dataset.aggregates();

        for (year, count) in &resolution.yearly_series {
            let expected: u32 = aggregates
                .yearly_counts_by_region
                .values()
                .map(|years| years.get(year).copied().unwrap_or(0))
                .sum();
            assert_eq!(*count, expected);
        }
        assert_eq!(resolution.monthly_series[Month::Mar.index()], 3);
        assert_eq!(resolution.monthly_chart_title, DEFAULT_MONTHLY_TITLE);
        assert_eq!(resolution.yearly_chart_title, DEFAULT_YEARLY_TITLE);
        assert!(!resolution.show_reset_control);
    }

    #[test]
    fn region_without_dated_rows_resolves_to_zero() {
        let dataset = dataset();
        let resolution = dataset.resolve(&state(Some("Region III"), None, None));
        assert_eq!(resolution.monthly_series, [0; 12]);
        assert!(resolution.yearly_series.is_empty());
        assert!(!resolution.show_reset_control);
    }

    #[test]
    fn resolving_twice_is_identical() {
        let dataset = dataset();
        for filter in [
            FilterState::default(),
            state(Some("Region I"), Some("2020"), None),
            state(None, None, Some("Aug")),
        ] {
            let first = dataset.view(&filter);
            let second = dataset.view(&filter);
            assert_eq!(first, second);
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }
    }

    #[test]
    fn double_click_restores_state() {
        for before in [
            FilterState::default(),
            state(Some("Region I"), None, None),
            state(Some("Region I"), None, Some("Feb")),
        ] {
            let mut filter = before.clone();
            filter.click_month_bar(Month::Feb);
            filter.click_month_bar(Month::Feb);
            assert_eq!(filter, before);
        }

        for before in [
            FilterState::default(),
            state(None, Some("2020"), None),
        ] {
            let mut filter = before.clone();
            filter.click_year_bar("2020");
            filter.click_year_bar("2020");
            assert_eq!(filter, before);
        }
    }

    #[test]
    fn clicking_across_dimensions_drops_the_other_selection() {
        let mut filter = state(Some("Region I"), Some("2020"), None);
        filter.click_month_bar(Month::Jul);
        filter.click_month_bar(Month::Jul);
        assert_eq!(filter, state(Some("Region I"), None, None));

        let mut filter = state(None, None, Some("Jul"));
        filter.click_month_bar(Month::Feb);
        assert_eq!(filter.month(), Some(Month::Feb));
    }

    #[test]
    fn year_and_month_are_mutually_exclusive() {
        let mut filter = FilterState::default();
        filter.click_month_bar(Month::May);
        filter.click_year_bar("2019");
        assert_eq!(filter.month(), None);
        assert_eq!(filter.year(), Some("2019"));

        filter.click_month_bar(Month::May);
        assert_eq!(filter.year(), None);
        assert_eq!(filter.month(), Some(Month::May));
    }

    #[test]
    fn region_change_and_reset_clear_selection() {
        let mut filter = state(Some("Region I"), None, Some("Jan"));
        filter.set_region(" Region II ");
        assert_eq!(filter, state(Some("Region II"), None, None));

        filter.click_year_bar("2020");
        filter.set_region("");
        assert_eq!(filter, FilterState::default());

        let mut filter = state(Some("Region I"), Some("2020"), None);
        filter.reset();
        assert_eq!(filter, FilterState::default());
        assert_eq!(filter.map_filter(), MapFilter::default());
    }

    #[test]
    fn applies_serialized_events() {
        let mut filter = FilterState::default();
        let events: Vec<FilterEvent> = serde_json::from_str(
            r#"[
                {"type": "set_region", "region": "Region I"},
                {"type": "click_year_bar", "year": "2021"},
                {"type": "click_month_bar", "month": "Mar"}
            ]"#,
        )
        .unwrap();
        for event in &events {
            filter.apply(event);
        }
        assert_eq!(filter, state(Some("Region I"), None, Some("Mar")));

        filter.apply(&FilterEvent::SetRegion { region: None });
        assert_eq!(filter, FilterState::default());
        filter.apply(&FilterEvent::ClickYearBar { year: "2020".to_string() });
        filter.apply(&FilterEvent::Reset);
        assert_eq!(filter, FilterState::default());
    }

    #[test]
    fn blank_year_click_is_ignored() {
        let mut filter = state(Some("Region I"), None, Some("Mar"));
        filter.click_year_bar("  ");
        assert_eq!(filter, state(Some("Region I"), None, Some("Mar")));

        let mut filter = FilterState::default();
        filter.click_year_bar("");
        assert_eq!(filter, FilterState::default());
        assert!(!filter.show_reset_control());

        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(serde_json::from_str::<FilterState>(&json).unwrap(), filter);
    }

    #[test]
    fn event_months_match_query_months_case_insensitively() {
        let event: FilterEvent =
            serde_json::from_str(r#"{"type": "click_month_bar", "month": "mar"}"#).unwrap();
        let mut from_event = FilterState::default();
        from_event.apply(&event);

        let from_query: FilterState = serde_json::from_str(r#"{"month": "mar"}"#).unwrap();
        assert_eq!(from_event, from_query);
        assert_eq!(from_event.month(), Some(Month::Mar));
    }

    #[test]
    fn rejects_conflicting_or_unknown_filters() {
        let conflicting = FilterState::try_from(FilterQuery {
            year: Some("2020".to_string()),
            month: Some("Jan".to_string()),
            ..FilterQuery::default()
        });
        assert!(matches!(conflicting, Err(DashboardError::ConflictingFilters)));

        let unknown = serde_json::from_str::<FilterState>(r#"{"month": "Smarch"}"#);
        assert!(unknown.is_err());

        let blank: FilterState =
            serde_json::from_str(r#"{"region": "", "year": " ", "month": null}"#).unwrap();
        assert_eq!(blank, FilterState::default());
    }

    #[test]
    fn view_carries_labels_highlights_and_map_filter() {
        let dataset = dataset();

        let view = dataset.view(&state(Some("Region I"), Some("2021"), None));
        assert_eq!(view.monthly_chart.labels.len(), 12);
        assert_eq!(view.monthly_chart.labels[0], "Jan");
        assert_eq!(view.monthly_chart.highlight_index, None);
        assert_eq!(view.yearly_chart.labels, vec!["2020", "2021"]);
        assert_eq!(view.yearly_chart.values, vec![1, 1]);
        assert_eq!(view.yearly_chart.highlight_index, Some(1));
        assert_eq!(view.map_filter.region_equals.as_deref(), Some("Region I"));

        let view = dataset.view(&state(None, None, Some("Mar")));
        assert_eq!(view.monthly_chart.highlight_index, Some(2));
        assert_eq!(view.yearly_chart.highlight_index, None);
        assert_eq!(view.map_filter, MapFilter::default());

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["showResetControl"], true);
        assert_eq!(json["mapFilter"]["regionEquals"], serde_json::Value::Null);
        assert_eq!(json["monthlyChart"]["highlightIndex"], 2);
    }

    #[test]
    fn yearly_labels_sort_ascending() {
        let dataset = dataset();
        let view = dataset.view(&FilterState::default());
        assert_eq!(view.yearly_chart.labels, vec!["2019", "2020", "2021"]);
        assert_eq!(view.yearly_chart.values, vec![1, 2, 1]);
    }
}
