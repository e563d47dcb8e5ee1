use std::{collections::HashMap, path::PathBuf};

use crate::{config::KeyConfig, geofile::feature::FeatureId};

/// Everything the render surface and the host can tell the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    FeatureClicked(FeatureId),
    /// Vertex edit on the highlighted feature; carries the whole new geometry.
    GeometryChanged(geo::Geometry),
    KeyPressed(char),
    JumpSubmitted(String),
    /// The view stopped moving; carries the new center.
    ViewSettled(geo::Coord),
    OpenRequested(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Commit,
    Discard,
    Save,
}

/// Key to action table. Keys are matched case-insensitively.
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: HashMap<char, Action>,
}

impl KeyMap {
    pub fn new(bindings: impl IntoIterator<Item = (char, Action)>) -> Self {
        Self {
            bindings: bindings
                .into_iter()
                .map(|(key, action)| (key.to_ascii_lowercase(), action))
                .collect(),
        }
    }

    pub fn action_for(&self, key: char) -> Option<Action> {
        self.bindings.get(&key.to_ascii_lowercase()).copied()
    }
}

impl From<&KeyConfig> for KeyMap {
    fn from(keys: &KeyConfig) -> Self {
        KeyMap::new([
            (keys.commit, Action::Commit),
            (keys.discard, Action::Discard),
            (keys.save, Action::Save),
        ])
    }
}
