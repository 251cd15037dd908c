//! Automatic scene cycling.
//!
//! Drives a frame-interval timer that advances the program scene once per
//! cycle interval, picking a random scene from the operator's rotation.

use anyhow::Result;
use futures::future::BoxFuture;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

use crate::prefs::PrefsStore;
use crate::store::{Store, Subscription};

/// How often cycling progress is recomputed while active.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Scene operations the cycling engine needs from the remote session.
pub trait SceneSwitcher: Send + Sync {
    /// Known scene names in display order.
    fn scene_names(&self) -> Vec<String>;

    /// Name of the active program scene.
    fn current_scene(&self) -> String;

    /// Stage the scene the next triggered transition switches to.
    fn set_next_scene(&self, scene: Option<String>);

    /// Switch to the staged scene, resolving once the transition has run.
    fn trigger_transition(&self) -> BoxFuture<'_, Result<()>>;
}

/// Cycling engine snapshot.
#[derive(Debug, Clone, Default)]
pub struct CycleState {
    /// Whether automatic cycling is active.
    pub cycling: bool,

    /// Fraction of the current cycle interval elapsed, in [0, 1].
    pub progress: f64,

    /// When the current cycle began. Pinned on the first tick after a cycle
    /// starts and overwritten when the next cycle begins.
    pub cycle_started: Option<Instant>,

    /// UI flag: the operator is editing the rotation.
    pub selecting: bool,

    /// UI flag: the scene list is filtered to the rotation.
    pub filter: bool,
}

/// Timer-driven engine that rotates through eligible scenes.
#[derive(Clone)]
pub struct CycleEngine {
    state: Store<CycleState>,
    switcher: Arc<dyn SceneSwitcher>,
    prefs: PrefsStore,
}

impl CycleEngine {
    pub fn new(switcher: Arc<dyn SceneSwitcher>, prefs: PrefsStore) -> Self {
        Self {
            state: Store::new(CycleState::default()),
            switcher,
            prefs,
        }
    }

    /// Get a snapshot of the engine state.
    pub fn get(&self) -> CycleState {
        self.state.get()
    }

    /// Register a listener for engine state changes.
    pub fn subscribe<F: Fn(&CycleState) + Send + 'static>(&self, listener: F) -> Subscription {
        self.state.subscribe(listener)
    }

    /// Begin cycling. Does nothing if cycling is already active.
    pub fn start_cycling(&self) {
        if self.state.get().cycling {
            return;
        }

        self.state.update(|state| {
            state.cycling = true;
            state.progress = 0.0;
            state.cycle_started = None;
        });
        info!("Scene cycling started");

        self.spawn_tick_loop();
    }

    /// End cycling. Does nothing if cycling is not active.
    ///
    /// There is no cancellation handle; the running tick loop observes the
    /// flag on its next tick and terminates itself.
    pub fn stop_cycling(&self) {
        if !self.state.get().cycling {
            return;
        }

        self.state.update(|state| {
            state.cycling = false;
            state.progress = 0.0;
        });
        info!("Scene cycling stopped");
    }

    pub fn toggle_selecting(&self) {
        self.state.update(|state| state.selecting = !state.selecting);
    }

    pub fn toggle_filter(&self) {
        self.state.update(|state| state.filter = !state.filter);
    }

    fn spawn_tick_loop(&self) {
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(FRAME_INTERVAL).await;
                if !engine.tick(Instant::now()).await {
                    break;
                }
            }
        });
    }

    /// One progress step. Returns whether the loop should keep ticking.
    async fn tick(&self, now: Instant) -> bool {
        if !self.state.get().cycling {
            return false;
        }

        let interval_ms = self.prefs.get().cycle_interval_ms;
        let mut advance = false;
        self.state.update(|state| {
            let started = *state.cycle_started.get_or_insert(now);
            let progress =
                now.saturating_duration_since(started).as_millis() as f64 / interval_ms as f64;
            // The advance decision tests the progress stored by the previous
            // tick, not the value just computed.
            if state.progress >= 1.0 {
                advance = true;
            } else {
                state.progress = progress;
            }
        });

        if advance {
            if let Err(e) = self.switcher.trigger_transition().await {
                // The tick loop dies here; only a stop/start restarts it.
                error!("Scene transition failed: {:#}", e);
                return false;
            }
            self.switcher.set_next_scene(self.choose_random_next_scene());
            self.state.update(|state| {
                state.cycle_started = Some(Instant::now());
                state.progress = 0.0;
            });
        }

        true
    }

    /// Pick a random scene from the rotation, excluding the active one.
    /// Yields `None` when no scene qualifies.
    fn choose_random_next_scene(&self) -> Option<String> {
        let current = self.switcher.current_scene();
        let included = self.prefs.get().included_scenes;

        let candidates: Vec<String> = self
            .switcher
            .scene_names()
            .into_iter()
            .filter(|name| *name != current)
            .filter(|name| included.contains(name))
            .collect();

        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}
