//! Runtime configuration read from the environment (and `.env`).
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub bind_address: IpAddr,
    pub port: u16,
    pub incidents_csv: PathBuf,
    pub static_dir: PathBuf,
    pub geospatial_api_url: Option<String>,
    pub location_timeout: Duration,
    pub weather_api_url: String,
    pub weather_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            tracing::debug!("no .env file loaded: {}", err);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let value = |key: &str| lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

        Self {
            bind_address: value("BIND_ADDRESS")
                .and_then(|value| value.parse().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            port: value("PORT")
                .and_then(|value| value.parse().ok())
                .unwrap_or(3000),
            incidents_csv: value("INCIDENTS_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public/csv/complete_landslide_1.csv")),
            static_dir: value("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            geospatial_api_url: value("GEOSPATIAL_API_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            location_timeout: Duration::from_secs(
                value("LOCATION_TIMEOUT_SECS")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(15),
            ),
            weather_api_url: value("WEATHER_API_URL")
                .unwrap_or_else(|| "https://api.open-meteo.com/v1/forecast".to_string()),
            weather_timeout: Duration::from_secs(
                value("WEATHER_TIMEOUT_SECS")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(10),
            ),
        }
    }

    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
