mod app;
mod handler;
mod tui;
mod ui;

use std::fs::{self, File};
use std::sync::Mutex;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use app::App;
use isupplier_core::Config;

/// Log to `<data_dir>/isupplier/isupplier.log`; stderr belongs to the terminal UI
fn init_logging() -> Result<()> {
    let dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
        .join("isupplier");
    fs::create_dir_all(&dir)?;
    let file = File::options()
        .create(true)
        .append(true)
        .open(dir.join("isupplier.log"))?;

    let filter = EnvFilter::try_from_env("ISUPPLIER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = init_logging() {
        eprintln!("Logging disabled: {}", e);
    }

    let config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not load config, using defaults");
        let mut config = Config::new();
        config.apply_env(|key| std::env::var(key).ok());
        config
    });
    info!(lang = config.default_language.as_str(), "starting iSupplier assistant");

    handler::resolve_desktop_commands();
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut events = tui::EventHandler::new();
    let result = run(&mut terminal, &mut events, &config).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, events: &mut tui::EventHandler, config: &Config) -> Result<()> {
    let mut app = App::new(config, events.sender())?;

    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(&mut app, event).await?;
        }
    }

    app.voice.stop();
    info!("assistant closed");
    Ok(())
}
