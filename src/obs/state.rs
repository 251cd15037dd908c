//! Mirrored OBS state types.

use std::collections::HashMap;
use std::time::Duration;

/// Visual effect family of a scene transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Cut,
    Fade,
}

impl TransitionKind {
    /// Map an obs-websocket transition kind string. Anything that is not a
    /// fade behaves as a cut.
    pub fn from_kind_str(kind: &str) -> Self {
        if kind == "fade_transition" {
            Self::Fade
        } else {
            Self::Cut
        }
    }
}

/// A scene as reported by OBS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneEntry {
    pub name: String,
    /// Index assigned by OBS, counted from the bottom of its list.
    pub index: usize,
}

/// An entry of the scene transition catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEntry {
    pub name: String,
    pub kind: TransitionKind,
    /// Whether the transition has a fixed duration.
    pub fixed: bool,
    /// Whether the transition supports custom settings.
    pub configurable: bool,
}

/// Snapshot of the mirrored OBS session.
#[derive(Debug, Clone)]
pub struct ObsState {
    /// Active program scene.
    pub current_scene: String,

    /// Scene staged for the next triggered transition. Local only; OBS is
    /// not told about it until the transition is triggered.
    pub next_scene: Option<String>,

    /// Currently selected scene transition.
    pub transition_name: String,
    pub transition_duration: Duration,
    pub transition_kind: TransitionKind,

    /// Whether a scene transition is running right now.
    pub scene_is_transitioning: bool,

    /// Known scenes in display order.
    pub scenes: Vec<SceneEntry>,

    /// Available scene transitions.
    pub transitions: Vec<TransitionEntry>,

    /// JPEG preview bytes per scene name.
    pub scene_previews: HashMap<String, Vec<u8>>,
}

/// Put scenes into display order. OBS hands out reversed indexes, so the
/// highest index comes first.
pub(crate) fn sort_scenes(mut scenes: Vec<SceneEntry>) -> Vec<SceneEntry> {
    scenes.sort_by(|a, b| a.index.cmp(&b.index));
    scenes.reverse();
    scenes
}

/// Kind of the named transition, falling back to a cut for names missing
/// from the catalog.
pub(crate) fn transition_kind_for(transitions: &[TransitionEntry], name: &str) -> TransitionKind {
    transitions
        .iter()
        .find(|transition| transition.name == name)
        .map(|transition| transition.kind)
        .unwrap_or(TransitionKind::Cut)
}

/// Target of a pending scene switch: the staged scene, if it is set and
/// differs from the active one.
pub(crate) fn pending_switch(state: &ObsState) -> Option<String> {
    match &state.next_scene {
        Some(next) if *next != state.current_scene => Some(next.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, index: usize) -> SceneEntry {
        SceneEntry {
            name: name.to_string(),
            index,
        }
    }

    fn state_with(current: &str, next: Option<&str>) -> ObsState {
        ObsState {
            current_scene: current.to_string(),
            next_scene: next.map(str::to_string),
            transition_name: "Fade".to_string(),
            transition_duration: Duration::from_millis(300),
            transition_kind: TransitionKind::Fade,
            scene_is_transitioning: false,
            scenes: Vec::new(),
            transitions: Vec::new(),
            scene_previews: HashMap::new(),
        }
    }

    #[test]
    fn test_scenes_display_in_descending_index_order() {
        let sorted = sort_scenes(vec![entry("A", 2), entry("B", 0), entry("C", 1)]);

        let names: Vec<&str> = sorted.iter().map(|scene| scene.name.as_str()).collect();
        assert_eq!(names, ["A", "C", "B"]);
    }

    #[test]
    fn test_transition_kind_lookup() {
        let transitions = vec![
            TransitionEntry {
                name: "Fade".to_string(),
                kind: TransitionKind::Fade,
                fixed: false,
                configurable: true,
            },
            TransitionEntry {
                name: "Cut".to_string(),
                kind: TransitionKind::Cut,
                fixed: true,
                configurable: false,
            },
        ];

        assert_eq!(transition_kind_for(&transitions, "Fade"), TransitionKind::Fade);
        assert_eq!(transition_kind_for(&transitions, "Cut"), TransitionKind::Cut);
        // Unknown names behave as cuts.
        assert_eq!(transition_kind_for(&transitions, "Swipe"), TransitionKind::Cut);
    }

    #[test]
    fn test_kind_string_mapping() {
        assert_eq!(TransitionKind::from_kind_str("fade_transition"), TransitionKind::Fade);
        assert_eq!(TransitionKind::from_kind_str("cut_transition"), TransitionKind::Cut);
        assert_eq!(TransitionKind::from_kind_str("swipe_transition"), TransitionKind::Cut);
    }

    #[test]
    fn test_pending_switch_requires_a_staged_differing_scene() {
        assert_eq!(pending_switch(&state_with("Intro", None)), None);
        assert_eq!(pending_switch(&state_with("Intro", Some("Intro"))), None);
        assert_eq!(
            pending_switch(&state_with("Intro", Some("Outro"))),
            Some("Outro".to_string())
        );
    }
}
