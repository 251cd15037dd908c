//! OBS WebSocket session.
//!
//! Connects once at construction, mirrors the server's scene and transition
//! state into a subscribable snapshot, and exposes the commands the control
//! surface needs. There is no reconnect logic; losing the session means
//! creating a new one.

use anyhow::{Context, Result};
use base64::Engine;
use futures::future::{try_join_all, BoxFuture};
use futures::{Stream, StreamExt};
use obws::events::Event;
use obws::Client;
use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::state::{
    pending_switch, sort_scenes, transition_kind_for, ObsState, SceneEntry, TransitionEntry,
    TransitionKind,
};
use crate::cycle::SceneSwitcher;
use crate::store::{Store, Subscription};

const PREVIEW_WIDTH: u32 = 640;
const PREVIEW_HEIGHT: u32 = 360;

/// Extra wait beyond the configured transition duration before giving up on
/// the transition-ended event. Cut transitions do not always raise it.
const TRANSITION_END_GRACE: Duration = Duration::from_secs(1);

/// Live session with the OBS WebSocket server.
#[derive(Clone)]
pub struct ObsSession {
    client: Arc<Client>,
    store: Store<ObsState>,
    transition_ended: Arc<Notify>,
}

impl ObsSession {
    /// Connect to OBS and take the initial state snapshot.
    ///
    /// Any connection, handshake, or initial-fetch failure fails the whole
    /// session construction.
    pub async fn connect(host: &str, port: u16, password: Option<&str>) -> Result<Self> {
        let client = Client::connect(host, port, password)
            .await
            .context("Failed to connect to OBS WebSocket")?;

        let events = client
            .events()
            .context("Failed to subscribe to OBS events")?;
        let client = Arc::new(client);

        let initial = fetch_initial_state(&client).await?;
        let store = Store::new(initial);
        let transition_ended = Arc::new(Notify::new());

        tokio::spawn(run_event_pump(
            Arc::clone(&client),
            store.clone(),
            Arc::clone(&transition_ended),
            events,
        ));

        Ok(Self {
            client,
            store,
            transition_ended,
        })
    }

    /// Get a snapshot of the mirrored state.
    pub fn snapshot(&self) -> ObsState {
        self.store.get()
    }

    /// Register a listener for snapshot changes.
    pub fn subscribe<F: Fn(&ObsState) + Send + 'static>(&self, listener: F) -> Subscription {
        self.store.subscribe(listener)
    }

    /// Stage the scene the next triggered transition switches to. Purely
    /// local; OBS is not contacted.
    pub fn set_next_scene(&self, scene: Option<String>) {
        self.store.update(|state| state.next_scene = scene);
    }

    /// Select the named scene transition.
    pub async fn set_transition(&self, name: &str) -> Result<()> {
        self.client
            .transitions()
            .set_current(name)
            .await
            .context("Failed to set the scene transition")
    }

    /// Change the duration of the current scene transition.
    pub async fn set_transition_duration(&self, duration: Duration) -> Result<()> {
        self.client
            .transitions()
            .set_current_duration(
                duration
                    .try_into()
                    .context("Transition duration out of range")?,
            )
            .await
            .context("Failed to set the transition duration")
    }

    /// Switch the program scene to the staged one.
    ///
    /// Resolves once a transition-ended event arrives, or after the
    /// transition duration plus a grace period, whichever comes first.
    /// Without a staged scene differing from the current one this resolves
    /// immediately and OBS is not contacted.
    pub async fn trigger_transition(&self) -> Result<()> {
        let snapshot = self.store.get();
        let Some(target) = pending_switch(&snapshot) else {
            return Ok(());
        };

        // Arm the waiter before issuing the command so an end event racing
        // the command completion is not missed.
        let mut ended = pin!(self.transition_ended.notified());
        ended.as_mut().enable();

        self.client
            .scenes()
            .set_current_program_scene(target.as_str())
            .await
            .context("Failed to set the program scene")?;

        let wait = snapshot.transition_duration + TRANSITION_END_GRACE;
        let _ = tokio::time::timeout(wait, ended).await;

        Ok(())
    }
}

impl SceneSwitcher for ObsSession {
    fn scene_names(&self) -> Vec<String> {
        self.store
            .get()
            .scenes
            .into_iter()
            .map(|scene| scene.name)
            .collect()
    }

    fn current_scene(&self) -> String {
        self.store.get().current_scene
    }

    fn set_next_scene(&self, scene: Option<String>) {
        ObsSession::set_next_scene(self, scene);
    }

    fn trigger_transition(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(ObsSession::trigger_transition(self))
    }
}

async fn fetch_initial_state(client: &Client) -> Result<ObsState> {
    let scene_list = client
        .scenes()
        .list()
        .await
        .context("Failed to fetch the scene list")?;
    let current_transition = client
        .transitions()
        .current()
        .await
        .context("Failed to fetch the current transition")?;
    let cursor = client
        .transitions()
        .current_cursor()
        .await
        .context("Failed to fetch the transition cursor")?;
    let catalog = client
        .transitions()
        .list()
        .await
        .context("Failed to fetch the transition catalog")?;

    let scenes = sort_scenes(
        scene_list
            .scenes
            .into_iter()
            .map(|scene| SceneEntry {
                name: scene.id.name,
                index: scene.index,
            })
            .collect(),
    );
    let names: Vec<String> = scenes.iter().map(|scene| scene.name.clone()).collect();
    let scene_previews = fetch_scene_previews(client, &names).await?;

    let transitions: Vec<TransitionEntry> = catalog
        .transitions
        .into_iter()
        .map(|transition| TransitionEntry {
            kind: TransitionKind::from_kind_str(&transition.kind),
            name: transition.id.name,
            fixed: transition.fixed,
            configurable: transition.configurable,
        })
        .collect();
    let transition_kind = transition_kind_for(&transitions, &current_transition.id.name);

    Ok(ObsState {
        current_scene: scene_list
            .current_program_scene
            .map(|scene| scene.name)
            .unwrap_or_default(),
        next_scene: None,
        transition_name: current_transition.id.name,
        transition_duration: current_transition
            .duration
            .map(|d| d.unsigned_abs())
            .unwrap_or(Duration::ZERO),
        transition_kind,
        scene_is_transitioning: cursor < 1.0,
        scenes,
        transitions,
        scene_previews,
    })
}

/// Fetch a preview screenshot for every named scene. The requests run
/// concurrently and the whole fetch fails if any single one does.
async fn fetch_scene_previews(
    client: &Client,
    names: &[String],
) -> Result<HashMap<String, Vec<u8>>> {
    let previews = try_join_all(names.iter().map(|name| async move {
        let payload = client
            .sources()
            .take_screenshot(obws::requests::sources::TakeScreenshot {
                source: name.as_str().into(),
                width: Some(PREVIEW_WIDTH),
                height: Some(PREVIEW_HEIGHT),
                format: "jpg",
                compression_quality: None,
            })
            .await
            .with_context(|| format!("Failed to fetch a preview of scene {:?}", name))?;

        anyhow::Ok((name.clone(), decode_screenshot(&payload)?))
    }))
    .await?;

    Ok(previews.into_iter().collect())
}

/// Strip the data-URI header OBS puts in front of screenshot payloads, then
/// decode the base64 remainder.
fn decode_screenshot(payload: &str) -> Result<Vec<u8>> {
    let encoded = payload
        .split_once(',')
        .map(|(_, data)| data)
        .unwrap_or(payload);

    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("Failed to decode screenshot data")
}

async fn run_event_pump(
    client: Arc<Client>,
    store: Store<ObsState>,
    transition_ended: Arc<Notify>,
    events: impl Stream<Item = Event> + Send + 'static,
) {
    let mut events = pin!(events);

    while let Some(event) = events.next().await {
        handle_event(&client, &store, &transition_ended, event).await;
    }

    debug!("OBS event stream ended");
}

async fn handle_event(
    client: &Client,
    store: &Store<ObsState>,
    transition_ended: &Notify,
    event: Event,
) {
    match event {
        Event::SceneListChanged { scenes } => {
            let entries = sort_scenes(
                scenes
                    .into_iter()
                    .map(|scene| SceneEntry {
                        name: scene.name,
                        index: scene.index,
                    })
                    .collect(),
            );
            let names: Vec<String> = entries.iter().map(|scene| scene.name.clone()).collect();

            match fetch_scene_previews(client, &names).await {
                Ok(previews) => store.update(|state| {
                    state.scenes = entries;
                    state.scene_previews = previews;
                }),
                Err(e) => {
                    // Keep the authoritative list even when previews lag.
                    warn!("Failed to refresh scene previews: {:#}", e);
                    store.update(|state| state.scenes = entries);
                }
            }
        }
        Event::CurrentProgramSceneChanged { id } => {
            store.update(|state| state.current_scene = id.name);
        }
        Event::CurrentSceneTransitionChanged { id } => {
            store.update(|state| {
                state.transition_kind = transition_kind_for(&state.transitions, &id.name);
                state.transition_name = id.name;
            });
        }
        Event::CurrentSceneTransitionDurationChanged { duration } => {
            store.update(|state| state.transition_duration = duration.unsigned_abs());
        }
        Event::SceneTransitionStarted { .. } => {
            store.update(|state| state.scene_is_transitioning = true);
        }
        Event::SceneTransitionEnded { .. } => {
            store.update(|state| state.scene_is_transitioning = false);
            transition_ended.notify_waiters();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_screenshot_strips_the_data_uri_header() {
        let decoded = decode_screenshot("data:image/jpg;base64,aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_decode_screenshot_accepts_bare_base64() {
        let decoded = decode_screenshot("aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_decode_screenshot_rejects_garbage() {
        assert!(decode_screenshot("data:image/jpg;base64,???").is_err());
    }
}
