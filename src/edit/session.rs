use crate::{
    edit::store::FeatureStore,
    error::{SessionError, StoreError},
    geofile::feature::{Feature, FeatureId},
};

/// Working copy of the selected feature. Detached from the store until committed.
#[derive(Debug, Clone, PartialEq)]
pub struct EditCandidate {
    pub id: FeatureId,
    pub feature: Feature,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// A feature is selected and its candidate still equals the stored feature.
    Selected(EditCandidate),
    /// The candidate geometry has been changed at least once.
    Editing(EditCandidate),
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Selected(_) => "selected",
            SessionState::Editing(_) => "editing",
        }
    }
}

/// Tracks the single feature open for editing. The session refers to the store by identifier only and never
/// mutates it except through `commit`.
#[derive(Debug, Default)]
pub struct EditSession {
    state: SessionState,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SessionState::Idle)
    }

    pub fn candidate(&self) -> Option<&EditCandidate> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::Selected(candidate) | SessionState::Editing(candidate) => Some(candidate),
        }
    }

    pub fn selected_id(&self) -> Option<FeatureId> {
        self.candidate().map(|candidate| candidate.id)
    }

    /// Bind to the stored feature `id`, dropping any previous selection. If `id` is unknown the previous
    /// selection is kept.
    pub fn select(
        &mut self,
        store: &FeatureStore,
        id: FeatureId,
    ) -> Result<(), SessionError> {
        let feature = store
            .get(id)
            .ok_or(StoreError::NotFound(id))?
            .clone();
        if let Some(previous) = self.discard() {
            log::debug!("Selection of feature {} replaced by {}", previous, id);
        }
        self.state = SessionState::Selected(EditCandidate { id, feature });
        Ok(())
    }

    /// Take a new candidate geometry from the render surface. Last write wins.
    pub fn on_geometry_changed(&mut self, geometry: geo::Geometry) -> Result<(), SessionError> {
        let state = std::mem::take(&mut self.state);
        self.state = match state {
            SessionState::Selected(mut candidate) | SessionState::Editing(mut candidate) => {
                candidate.feature.geometry = Some(geometry);
                SessionState::Editing(candidate)
            }
            SessionState::Idle => {
                return Err(SessionError::InvalidState {
                    operation: "change geometry",
                    state: SessionState::Idle.name(),
                })
            }
        };
        Ok(())
    }

    /// Write the candidate back into `store`. If the bound feature no longer exists the session stays bound
    /// so the user can retry or discard.
    pub fn commit(&mut self, store: &mut FeatureStore) -> Result<FeatureId, SessionError> {
        let candidate = self.candidate().cloned().ok_or(SessionError::InvalidState {
            operation: "commit",
            state: self.state.name(),
        })?;
        store
            .replace(candidate.id, candidate.feature)
            .map_err(|err| SessionError::StaleSelection(candidate.id, err))?;
        log::info!("Committed edit of feature {}", candidate.id);
        self.state = SessionState::Idle;
        Ok(candidate.id)
    }

    /// Drop the candidate without touching the store. Returns the identifier that was selected, if any.
    pub fn discard(&mut self) -> Option<FeatureId> {
        let id = self.selected_id();
        self.state = SessionState::Idle;
        id
    }
}
