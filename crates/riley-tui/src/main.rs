mod app;
mod handler;
mod logging;
mod tui;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use riley_core::{
    embedder_for, load_index, ChatEngine, ChatError, Config, EngineSettings,
    OpenAIClient, RagChatEngine,
};
use tracing::{error, info};

use app::App;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let _log_guard = logging::init(&config)?;
    info!(?config, "starting");

    let engine = match build_engine(&config) {
        Ok(engine) => engine,
        Err(err) => {
            error!(error = %err, "startup failed");
            return Err(anyhow::Error::new(err).context("Rainbow Riley could not start"));
        }
    };

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, App::new(engine, config.model.clone())).await;
    tui::restore()?;

    info!("session ended");
    result
}

/// Check the secret, load the index and wire up the chat engine. Every
/// failure here is fatal; no chat is possible without them.
fn build_engine(config: &Config) -> Result<Arc<dyn ChatEngine>, ChatError> {
    let client = OpenAIClient::from_config(config)?;

    eprintln!(
        "Balancing the 5 flavour elements... Please wait while we create a harmonious culinary experience!"
    );
    let index = Arc::new(load_index(&config.index_dir)?);
    let embedder = embedder_for(index.layout(), &client, config);
    info!(embedder = embedder.model_name(), nodes = index.len(), "chat engine ready");

    Ok(Arc::new(RagChatEngine::new(
        index,
        embedder,
        client,
        EngineSettings::from(config),
    )))
}

async fn run(terminal: &mut Tui, mut app: App) -> Result<()> {
    let mut events = EventHandler::new();

    loop {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        // Drawn once with the indicator showing, then block on the call.
        if app.dispatch_requested {
            app.dispatch().await;
            continue;
        }

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
