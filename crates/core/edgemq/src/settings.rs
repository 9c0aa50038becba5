//! Configuration surface (`spec.md` §6, Environment): `figment` layers a
//! `.env` file (via `dotenvy`) and process environment over built-in
//! defaults, the same pattern the teacher's config crates use for tunables.

use std::net::IpAddr;

use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Toml;
use figment::Figment;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mqtt_host: IpAddr,
    pub mqtt_port: u16,
    pub http_port: u16,
    pub management_port: u16,
    pub message_max_length: usize,
    pub publish_rate_limit: i64,
    pub message_expire_time: i64,
    pub cache_cleanup_interval: u64,
    pub timeseries_retention_days: i64,
    pub bridge_enabled: bool,
    pub broker_id: Option<String>,
    pub bridge_token: Option<String>,
    pub bridge_reconnect_interval: u64,
    pub user_token: Option<String>,
    pub db_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            mqtt_host: IpAddr::from([0, 0, 0, 0]),
            mqtt_port: 1883,
            http_port: 3000,
            management_port: 3001,
            message_max_length: 1024,
            publish_rate_limit: 1000,
            message_expire_time: 120_000,
            cache_cleanup_interval: 10_000,
            timeseries_retention_days: 30,
            bridge_enabled: false,
            broker_id: None,
            bridge_token: None,
            bridge_reconnect_interval: 5_000,
            user_token: None,
            db_path: None,
        }
    }
}

impl Settings {
    /// Loads `{config_dir}/edgemq.toml` (if present) then the process
    /// environment, each layer overriding the defaults above.
    pub fn load(config_dir: &str) -> anyhow::Result<Settings> {
        let _ = dotenvy::dotenv();
        let toml_path = format!("{config_dir}/edgemq.toml");
        let settings = Figment::new()
            .merge(Toml::file(toml_path))
            .merge(Env::raw())
            .extract()?;
        Ok(settings)
    }

    pub fn mqtt_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.mqtt_host, self.mqtt_port)
    }
}
