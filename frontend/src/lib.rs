use wasm_bindgen::prelude::*;
use yew::prelude::*;

mod leaflet;

use gloo_net::http::Request;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use wasm_bindgen::JsCast;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bbox {
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
}

impl Default for Bbox {
    fn default() -> Self {
        Self {
            min_lat: 4.5,
            min_lon: 116.9,
            max_lat: 21.2,
            max_lon: 126.6,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct FilterState {
    region: Option<String>,
    year: Option<String>,
    month: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum FilterEvent {
    SetRegion { region: Option<String> },
    ClickMonthBar { month: String },
    ClickYearBar { year: String },
    Reset,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartSeries {
    labels: Vec<String>,
    values: Vec<u32>,
    highlight_index: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapFilter {
    region_equals: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardView {
    monthly_chart: ChartSeries,
    yearly_chart: ChartSeries,
    monthly_chart_title: String,
    yearly_chart_title: String,
    show_reset_control: bool,
    map_filter: MapFilter,
}

#[derive(Deserialize)]
struct EventResponse {
    state: FilterState,
    view: DashboardView,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionCount {
    region: String,
    count: u32,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    total_rows: usize,
    invalid_rows: usize,
    mapped_rows: usize,
    top_regions: Vec<RegionCount>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Geometry,
    properties: Incident,
}

#[derive(Deserialize)]
struct Geometry {
    coordinates: [f64; 2],
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Incident {
    region: String,
    date: String,
    year: Option<i32>,
    #[serde(skip)]
    lat: f64,
    #[serde(skip)]
    lon: f64,
}

impl From<Feature> for Incident {
    fn from(feature: Feature) -> Self {
        let [lon, lat] = feature.geometry.coordinates;
        Self {
            lat,
            lon,
            ..feature.properties
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct DashboardState {
    filter: FilterState,
    view: Option<DashboardView>,
    error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct LocationState {
    point: Option<(f64, f64)>,
    data: Option<Value>,
    loading: bool,
    error: Option<String>,
}

/// Rainfall window keys in display order.
const RAIN_WINDOWS: [(&str, &str); 6] = [
    ("3_hr", "3 hours"),
    ("6_hr", "6 hours"),
    ("12_hr", "12 hours"),
    ("1_day", "1 day"),
    ("3_day", "3 days"),
    ("5_day", "5 days"),
];

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct RainPoint {
    #[serde(alias = "hour", alias = "date")]
    label: String,
    cumulative: f64,
    intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct WeatherSummary {
    soil_moisture: f64,
    cumulative_rainfall: HashMap<String, f64>,
    rain_intensity: HashMap<String, f64>,
    hourly_chart_data: Vec<RainPoint>,
    daily_chart_data: Vec<RainPoint>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct WeatherState {
    summary: Option<WeatherSummary>,
    loading: bool,
    error: Option<String>,
}

#[wasm_bindgen(start)]
pub fn start() {
    yew::Renderer::<App>::new().render();
}

#[function_component(App)]
fn app() -> Html {
    let dashboard = use_state(DashboardState::default);
    let regions = use_state(Vec::<String>::new);
    let summary = use_state(|| None::<Summary>);
    let incidents = use_state(Vec::<Incident>::new);
    let location = use_state(LocationState::default);
    let weather_date = use_state(String::new);
    let weather = use_state(WeatherState::default);
    let map_ref = use_node_ref();
    let map_handle = use_mut_ref(|| None::<leaflet::MapHandle>);

    {
        let map_ref = map_ref.clone();
        let map_handle = map_handle.clone();
        let location = location.clone();
        use_effect_with((), move |_| {
            if let Some(element) = map_ref.cast::<web_sys::HtmlElement>() {
                let handle = leaflet::init_map(element, Bbox::default(), move |lat, lon| {
                    fetch_location(lat, lon, location.clone());
                });
                *map_handle.borrow_mut() = Some(handle);
            }
            || ()
        });
    }

    {
        let dashboard = dashboard.clone();
        let regions = regions.clone();
        let summary = summary.clone();
        let incidents = incidents.clone();
        use_effect_with((), move |_| {
            load_static_data(regions, summary, incidents);
            send_event(FilterState::default(), FilterEvent::Reset, dashboard);
            || ()
        });
    }

    {
        let map_handle = map_handle.clone();
        let map_filter = dashboard
            .view
            .as_ref()
            .map(|view| view.map_filter.clone())
            .unwrap_or_default();
        use_effect_with(((*incidents).clone(), map_filter), move |(incidents, filter)| {
            if let Some(ref handle) = *map_handle.borrow() {
                leaflet::update_points(handle, incidents, filter);
            }
            || ()
        });
    }

    {
        let weather = weather.clone();
        use_effect_with((location.point, (*weather_date).clone()), move |(point, date)| {
            if let Some((lat, lon)) = *point {
                if !date.is_empty() {
                    fetch_weather(lat, lon, date.clone(), weather);
                }
            }
            || ()
        });
    }

    let on_date = {
        let weather_date = weather_date.clone();
        Callback::from(move |event: Event| {
            let value = event
                .target()
                .and_then(|target| target.dyn_into::<web_sys::HtmlInputElement>().ok())
                .map(|input| input.value())
                .unwrap_or_default();
            weather_date.set(value);
        })
    };

    let dispatch = {
        let dashboard = dashboard.clone();
        Callback::from(move |event: FilterEvent| {
            send_event(dashboard.filter.clone(), event, dashboard.clone());
        })
    };

    let on_region = {
        let dispatch = dispatch.clone();
        Callback::from(move |event: Event| {
            let value = event
                .target()
                .and_then(|target| target.dyn_into::<web_sys::HtmlSelectElement>().ok())
                .map(|input| input.value())
                .unwrap_or_default();
            let region = (!value.is_empty()).then_some(value);
            dispatch.emit(FilterEvent::SetRegion { region });
        })
    };

    let on_reset = {
        let dispatch = dispatch.clone();
        Callback::from(move |_event: MouseEvent| dispatch.emit(FilterEvent::Reset))
    };

    let on_month = {
        let dispatch = dispatch.clone();
        Callback::from(move |month: String| dispatch.emit(FilterEvent::ClickMonthBar { month }))
    };

    let on_year = {
        let dispatch = dispatch.clone();
        Callback::from(move |year: String| dispatch.emit(FilterEvent::ClickYearBar { year }))
    };

    let selected_region = dashboard.filter.region.clone().unwrap_or_default();

    html! {
        <div class="app">
            <header>
                <div>
                    <p class="eyebrow">{"slidewatch"}</p>
                    <h1>{"Landslide history"}</h1>
                </div>
            </header>
            <main>
                <section class="card form-card">
                    <div class="grid">
                        <label>
                            {"Region"}
                            <select id="regionSelect" onchange={on_region}>
                                <option value="" selected={selected_region.is_empty()}>{"Show all"}</option>
                                { for regions.iter().map(|region| html! {
                                    <option value={region.clone()} selected={*region == selected_region}>{region.clone()}</option>
                                }) }
                            </select>
                        </label>
                        if dashboard.view.as_ref().is_some_and(|view| view.show_reset_control) {
                            <button id="resetFilters" onclick={on_reset}>{"Reset filters"}</button>
                        }
                    </div>
                    {render_summary((*summary).clone())}
                </section>

                <section class="card map-card">
                    <div class="results-layout">
                        <div class="map-panel">
                            <div id="map" ref={map_ref}></div>
                        </div>
                        <div class="results">
                            {render_location(&location)}
                            <label>
                                {"Rainfall up to"}
                                <input type="date" id="weatherDate" value={(*weather_date).clone()} onchange={on_date} />
                            </label>
                            {render_weather(location.point.is_some(), !weather_date.is_empty(), &weather)}
                        </div>
                    </div>
                </section>

                <section class="card charts-card">
                    {render_charts(&dashboard, on_month, on_year)}
                </section>
            </main>
        </div>
    }
}

fn render_summary(summary: Option<Summary>) -> Html {
    let Some(summary) = summary else {
        return html! {};
    };
    html! {
        <div class="summary">
            <p class="note">
                {format!(
                    "{} incidents, {} on the map, {} with unreadable dates",
                    summary.total_rows, summary.mapped_rows, summary.invalid_rows
                )}
            </p>
            <ol class="top-regions">
                { for summary.top_regions.iter().map(|entry| html! {
                    <li>{format!("{} ({})", entry.region, entry.count)}</li>
                }) }
            </ol>
        </div>
    }
}

fn render_charts(dashboard: &DashboardState, on_month: Callback<String>, on_year: Callback<String>) -> Html {
    if let Some(message) = dashboard.error.clone() {
        return html! { <div class="warning">{message}</div> };
    }
    let Some(view) = dashboard.view.as_ref() else {
        return html! { <div class="note">{"Loading incidents…"}</div> };
    };
    html! {
        <div class="charts">
            <div class="chart">
                <h3 id="monthly-chart-header-title">{view.monthly_chart_title.clone()}</h3>
                {render_bar_chart(&view.monthly_chart, "bar monthly", on_month)}
            </div>
            <div class="chart">
                <h3 id="yearly-chart-header-title">{view.yearly_chart_title.clone()}</h3>
                {render_bar_chart(&view.yearly_chart, "bar yearly", on_year)}
            </div>
        </div>
    }
}

fn render_bar_chart(series: &ChartSeries, bar_class: &'static str, on_click: Callback<String>) -> Html {
    if series.labels.is_empty() {
        return html! { <div class="note">{"No dated incidents for this selection."}</div> };
    }
    let max = series.values.iter().copied().max().unwrap_or(0).max(1) as f64;
    html! {
        <div class="bar-chart">
            { for series.labels.iter().zip(&series.values).enumerate().map(|(index, (label, value))| {
                let highlighted = series.highlight_index == Some(index);
                let class = classes!(bar_class, highlighted.then_some("highlighted"));
                let style = format!("height: {:.1}%;", *value as f64 / max * 100.0);
                let onclick = {
                    let on_click = on_click.clone();
                    let label = label.clone();
                    Callback::from(move |_event: MouseEvent| on_click.emit(label.clone()))
                };
                html! {
                    <div class="bar-slot" title={format!("{label}: {value}")} {onclick}>
                        <div {class} {style}></div>
                        <span class="bar-label">{label.clone()}</span>
                    </div>
                }
            }) }
        </div>
    }
}

fn render_location(location: &LocationState) -> Html {
    let Some((lat, lon)) = location.point else {
        return html! { <div class="note">{"Click the map to look up soil and slope data."}</div> };
    };
    let heading = html! { <h3>{format!("{:.4}, {:.4}", lat, lon)}</h3> };
    if location.loading {
        return html! { <>{heading}<div class="note">{"Fetching location data…"}</div></> };
    }
    if let Some(message) = location.error.clone() {
        return html! { <>{heading}<div class="warning">{message}</div></> };
    }
    let fields = match location.data.as_ref() {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| (format_label(key), format_value(value)))
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    html! {
        <>
            {heading}
            <dl class="location-detail">
                { for fields.into_iter().map(|(key, value)| html! {
                    <>
                        <dt>{key}</dt>
                        <dd>{value}</dd>
                    </>
                }) }
            </dl>
        </>
    }
}

fn render_weather(has_point: bool, has_date: bool, weather: &WeatherState) -> Html {
    if !has_point {
        return html! {};
    }
    if !has_date {
        return html! { <div class="note">{"Pick a date to load rainfall and soil moisture."}</div> };
    }
    if weather.loading {
        return html! { <div class="note">{"Fetching weather data…"}</div> };
    }
    if let Some(message) = weather.error.clone() {
        return html! { <div class="warning">{message}</div> };
    }
    let Some(summary) = weather.summary.as_ref() else {
        return html! {};
    };
    let window = |values: &HashMap<String, f64>, key: &str| {
        values.get(key).map(|value| format!("{value:.2}")).unwrap_or_else(|| "-".to_string())
    };
    let points = |points: &[RainPoint]| {
        html! {
            <ul class="rain-series">
                { for points.iter().map(|point| html! {
                    <li>{format!("{}: {:.2} in ({:.2} in/hr)", point.label, point.cumulative, point.intensity)}</li>
                }) }
            </ul>
        }
    };
    html! {
        <div class="weather">
            <p>{format!("Soil moisture (27-81 cm): {:.3}", summary.soil_moisture)}</p>
            <table class="rain-windows">
                <tr><th>{"Window"}</th><th>{"Rainfall (in)"}</th><th>{"Intensity (in/hr)"}</th></tr>
                { for RAIN_WINDOWS.iter().map(|(key, label)| html! {
                    <tr>
                        <td>{*label}</td>
                        <td>{window(&summary.cumulative_rainfall, key)}</td>
                        <td>{window(&summary.rain_intensity, key)}</td>
                    </tr>
                }) }
            </table>
            <h4>{"Last 12 hours"}</h4>
            {points(&summary.hourly_chart_data)}
            <h4>{"Last 5 days"}</h4>
            {points(&summary.daily_chart_data)}
        </div>
    }
}

fn load_static_data(
    regions: UseStateHandle<Vec<String>>,
    summary: UseStateHandle<Option<Summary>>,
    incidents: UseStateHandle<Vec<Incident>>,
) {
    wasm_bindgen_futures::spawn_local(async move {
        match get_json::<Vec<String>>("/api/regions").await {
            Ok(names) => regions.set(names),
            Err(err) => web_sys::console::warn_1(&JsValue::from_str(&err)),
        }
        match get_json::<Summary>("/api/summary").await {
            Ok(loaded) => summary.set(Some(loaded)),
            Err(err) => web_sys::console::warn_1(&JsValue::from_str(&err)),
        }
        match get_json::<FeatureCollection>("/api/incidents/geo").await {
            Ok(collection) => incidents.set(collection.features.into_iter().map(Incident::from).collect()),
            Err(err) => web_sys::console::warn_1(&JsValue::from_str(&err)),
        }
    });
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T, String> {
    let response = Request::get(url).send().await.map_err(|err| err.to_string())?;
    if !response.ok() {
        return Err(format!("{} returned {}", url, response.status()));
    }
    response.json::<T>().await.map_err(|err| err.to_string())
}

fn send_event(filter: FilterState, event: FilterEvent, dashboard: UseStateHandle<DashboardState>) {
    #[derive(Serialize)]
    struct EventRequest {
        state: FilterState,
        event: FilterEvent,
    }

    wasm_bindgen_futures::spawn_local(async move {
        let request = match Request::post("/api/dashboard/events").json(&EventRequest { state: filter, event }) {
            Ok(request) => request,
            Err(err) => {
                dashboard.set(DashboardState {
                    error: Some(err.to_string()),
                    ..(*dashboard).clone()
                });
                return;
            }
        };
        let result = match request.send().await {
            Ok(response) if response.ok() => response
                .json::<EventResponse>()
                .await
                .map_err(|err| err.to_string()),
            Ok(response) => Err(format!("dashboard update failed with status {}", response.status())),
            Err(err) => Err(err.to_string()),
        };
        match result {
            Ok(EventResponse { state, view }) => dashboard.set(DashboardState {
                filter: state,
                view: Some(view),
                error: None,
            }),
            Err(message) => dashboard.set(DashboardState {
                error: Some(message),
                ..(*dashboard).clone()
            }),
        }
    });
}

fn fetch_location(lat: f64, lon: f64, location: UseStateHandle<LocationState>) {
    wasm_bindgen_futures::spawn_local(async move {
        location.set(LocationState {
            point: Some((lat, lon)),
            loading: true,
            ..LocationState::default()
        });

        let url = format!(
            "/api/location?lat={}&lon={}",
            urlencoding::encode(&lat.to_string()),
            urlencoding::encode(&lon.to_string())
        );
        let result = match Request::get(&url).send().await {
            Ok(response) => {
                let ok = response.ok();
                match response.json::<Value>().await {
                    Ok(body) if ok => Ok(body),
                    Ok(body) => Err(body
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("location lookup failed")
                        .to_string()),
                    Err(err) => Err(err.to_string()),
                }
            }
            Err(err) => Err(err.to_string()),
        };

        location.set(match result {
            Ok(data) => LocationState {
                point: Some((lat, lon)),
                data: Some(data),
                ..LocationState::default()
            },
            Err(message) => LocationState {
                point: Some((lat, lon)),
                error: Some(message),
                ..LocationState::default()
            },
        });
    });
}

fn fetch_weather(lat: f64, lon: f64, date: String, weather: UseStateHandle<WeatherState>) {
    wasm_bindgen_futures::spawn_local(async move {
        weather.set(WeatherState {
            loading: true,
            ..WeatherState::default()
        });

        let url = format!(
            "/api/weather?latitude={}&longitude={}&date={}",
            urlencoding::encode(&lat.to_string()),
            urlencoding::encode(&lon.to_string()),
            urlencoding::encode(&date)
        );
        let result = match Request::get(&url).send().await {
            Ok(response) if response.ok() => response
                .json::<WeatherSummary>()
                .await
                .map_err(|err| err.to_string()),
            Ok(response) => Err(response
                .json::<Value>()
                .await
                .ok()
                .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("weather lookup failed with status {}", response.status()))),
            Err(err) => Err(err.to_string()),
        };

        weather.set(match result {
            Ok(summary) => WeatherState {
                summary: Some(summary),
                ..WeatherState::default()
            },
            Err(message) => WeatherState {
                error: Some(message),
                ..WeatherState::default()
            },
        });
    });
}

fn format_label(value: &str) -> String {
    value.replace('_', " ")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => "Unknown".to_string(),
        other => other.to_string(),
    }
}
