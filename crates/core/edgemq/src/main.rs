//! Binary entrypoint: CLI parsing, logging init, and handing off to
//! [`app::Application`] (`spec.md` §6).

mod app;
mod frame;
mod mqtt_server;
mod router;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::app::Application;
use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "edgemq", about = "Lightweight MQTT broker for IoT devices")]
struct Cli {
    /// Directory holding `edgemq.toml`, if any.
    #[arg(long, default_value = ".")]
    config_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config_dir)?;
    let app = Application::build(settings)?;
    app.run().await
}
