//! scene-cycler
//!
//! Connects to OBS Studio over obs-websocket and rotates the program scene
//! through the operator's chosen set on a timer.

use anyhow::Result;
use scene_cycler::cycle::{CycleEngine, SceneSwitcher};
use scene_cycler::obs::ObsSession;
use scene_cycler::prefs::{JsonFileBackend, PrefsStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("scene-cycler starting...");

    // Load preferences
    let backend = JsonFileBackend::at_default_path()?;
    let prefs_path = backend.path().to_path_buf();
    let prefs = PrefsStore::load(Arc::new(backend))?;
    info!("Preferences loaded from {:?}", prefs_path);

    let settings = prefs.get();
    if settings.included_scenes.is_empty() {
        warn!(
            "No scenes are marked for cycling; add names to included_scenes in {:?}",
            prefs_path
        );
    }

    // Connect to OBS (the WebSocket server must be enabled there)
    let session = match ObsSession::connect(
        &settings.host,
        settings.port,
        settings.password.as_deref(),
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to connect to OBS: {:#}", e);
            error!("Make sure OBS is running and its WebSocket server is enabled.");
            std::process::exit(1);
        }
    };

    let snapshot = session.snapshot();
    info!(
        "Connected to OBS at {}:{}; {} scenes, current scene {:?}",
        settings.host,
        settings.port,
        snapshot.scenes.len(),
        snapshot.current_scene
    );

    let switcher: Arc<dyn SceneSwitcher> = Arc::new(session.clone());
    let engine = CycleEngine::new(switcher, prefs.clone());
    engine.start_cycling();

    tokio::signal::ctrl_c().await?;

    engine.stop_cycling();
    info!("scene-cycler shutting down");

    Ok(())
}
