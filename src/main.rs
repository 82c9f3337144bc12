mod app;
mod console;
mod error;
mod menu;
mod model;
mod nav;
mod render;
mod services;
mod settings;
mod theme;
mod ui;
mod widgets;

use anyhow::Result;
use settings::SystemSettings;
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn init_tracing(sys: &SystemSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&sys.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let file = fs::create_dir_all(&sys.log_directory).and_then(|_| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(sys.log_directory.join("pen-deck.log"))
    });
    match file {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn main() -> Result<()> {
    let settings = ui::load_settings()?;
    init_tracing(&settings.system());
    ui::run(settings)
}
