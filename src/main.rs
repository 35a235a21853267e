use std::sync::Arc;

use tower_http::services::ServeDir;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slidewatch::{
    api::{self, AppState},
    dataset::load_dataset,
    Config, LocationClient, WeatherClient,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    if config.geospatial_api_url.is_none() {
        tracing::warn!("GEOSPATIAL_API_URL is not set; location lookups will be rejected");
    }

    let state = AppState {
        dataset: Arc::new(load_dataset(&config.incidents_csv)),
        location: Arc::new(LocationClient::new(
            config.geospatial_api_url.clone(),
            config.location_timeout,
        )),
        weather: Arc::new(WeatherClient::new(
            config.weather_api_url.clone(),
            config.weather_timeout,
        )),
    };

    let app = api::router(state).nest_service(
        "/",
        ServeDir::new(&config.static_dir).append_index_html_on_directories(true),
    );

    let address = config.socket_address();
    tracing::info!("listening on http://{}", address);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .await
        .expect("server error");
}
