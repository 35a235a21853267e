use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use js_sys::{Array, Function, Object, Reflect};
use web_sys::HtmlElement;

use crate::{Bbox, Incident, MapFilter};

const DEFAULT_COLOR: &str = "#aaaaaa";
/// Lower year bound of each colour band, ascending.
const YEAR_STEPS: [(i32, &str); 4] = [
    (2014, "#FDB813"),
    (2019, "#F26522"),
    (2022, "#D93B24"),
    (2024, "#B30000"),
];

pub struct MapHandle {
    #[allow(dead_code)]
    map: JsValue,
    leaflet: JsValue,
    point_layer: JsValue,
}

pub fn init_map(element: HtmlElement, bbox: Bbox, on_click: impl Fn(f64, f64) + 'static) -> MapHandle {
    let global = js_sys::global();
    let leaflet = Reflect::get(&global, &JsValue::from_str("L"))
        .expect("Leaflet not loaded");

    let map = call_method(&leaflet, "map", &[element.into()])
        .expect("map init failed");
    let options = Object::new();
    Reflect::set(&options, &JsValue::from_str("maxZoom"), &JsValue::from_f64(18.0)).ok();
    Reflect::set(
        &options,
        &JsValue::from_str("attribution"),
        &JsValue::from_str("© OpenStreetMap contributors"),
    )
    .ok();

    let tile_layer = call_method(
        &leaflet,
        "tileLayer",
        &[
            JsValue::from_str("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"),
            options.into(),
        ],
    )
    .expect("tile layer init failed");
    call_method(&tile_layer, "addTo", &[map.clone()]).ok();

    let bounds = lat_lng_bounds(&leaflet, bbox);
    call_method(&map, "fitBounds", &[bounds]).ok();

    let point_layer = call_method(&leaflet, "layerGroup", &[])
        .expect("layerGroup init failed");
    call_method(&point_layer, "addTo", &[map.clone()]).ok();

    let callback = Closure::wrap(Box::new(move |event: JsValue| {
        let Ok(latlng) = Reflect::get(&event, &JsValue::from_str("latlng")) else {
            return;
        };
        let lat = Reflect::get(&latlng, &JsValue::from_str("lat")).ok().and_then(|v| v.as_f64());
        let lng = Reflect::get(&latlng, &JsValue::from_str("lng")).ok().and_then(|v| v.as_f64());
        if let (Some(lat), Some(lng)) = (lat, lng) {
            on_click(lat, lng);
        }
    }) as Box<dyn FnMut(JsValue)>);

    call_method(&map, "on", &[JsValue::from_str("click"), callback.as_ref().clone()]).ok();

    callback.forget();

    MapHandle { map, leaflet, point_layer }
}

/// Redraws incident points, keeping only those that pass `filter`.
pub fn update_points(handle: &MapHandle, incidents: &[Incident], filter: &MapFilter) {
    call_method(&handle.point_layer, "clearLayers", &[]).ok();

    for incident in incidents {
        if let Some(region) = filter.region_equals.as_deref() {
            if incident.region != region {
                continue;
            }
        }
        let latlng = Array::of2(
            &JsValue::from_f64(incident.lat),
            &JsValue::from_f64(incident.lon),
        );
        let options = Object::new();
        let color = point_color(incident.year);
        Reflect::set(&options, &JsValue::from_str("radius"), &JsValue::from_f64(5.0)).ok();
        Reflect::set(&options, &JsValue::from_str("color"), &JsValue::from_str(color)).ok();
        Reflect::set(&options, &JsValue::from_str("fillOpacity"), &JsValue::from_f64(0.7)).ok();

        let Ok(marker) = call_method(&handle.leaflet, "circleMarker", &[latlng.into(), options.into()]) else {
            continue;
        };
        let popup = format!(
            "<strong>{}</strong><br>{}",
            escape_html(&incident.region),
            escape_html(&incident.date)
        );
        call_method(&marker, "bindPopup", &[JsValue::from_str(&popup)]).ok();
        call_method(&marker, "addTo", &[handle.point_layer.clone()]).ok();
    }
}

/// Undated points and anything before the first step use the default colour.
fn point_color(year: Option<i32>) -> &'static str {
    let Some(year) = year else {
        return DEFAULT_COLOR;
    };
    YEAR_STEPS
        .iter()
        .rev()
        .find(|(start, _)| year >= *start)
        .map_or(DEFAULT_COLOR, |(_, color)| *color)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn call_method(target: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let function = Reflect::get(target, &JsValue::from_str(name))?;
    let function = function.dyn_into::<Function>()?;
    function.apply(target, &Array::from_iter(args.iter().cloned()))
}

fn lat_lng_bounds(leaflet: &JsValue, bbox: Bbox) -> JsValue {
    let sw = Array::of2(&JsValue::from_f64(bbox.min_lat), &JsValue::from_f64(bbox.min_lon));
    let ne = Array::of2(&JsValue::from_f64(bbox.max_lat), &JsValue::from_f64(bbox.max_lon));
    call_method(leaflet, "latLngBounds", &[sw.into(), ne.into()])
        .expect("bounds init failed")
}
