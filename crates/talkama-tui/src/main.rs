use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Result;
use talkama_core::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

/// Log to a file in the config directory; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let log_dir = Config::config_dir()?;
    std::fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("talkama.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = init_logging() {
        eprintln!("Logging disabled: {}", e);
    }

    let config = Config::load()
        .unwrap_or_else(|e| {
            warn!("could not load config, using defaults: {}", e);
            Config::new()
        })
        .with_env_overrides();
    info!(host = ?config.host, model = ?config.default_model, "starting");

    let mut app = App::new(&config);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    if app.directory.current_host().is_some() {
        app.refresh_models(None);
    }

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
