use std::{path::PathBuf, sync::Arc};

use tokio::sync::mpsc::UnboundedSender;

use crate::{
    address::lookup::{AddressInfo, AddressLookup},
    config::Config,
    edit::{session::EditSession, store::FeatureStore},
    error::{SaveError, SessionError, StoreError},
    geofile::feature::{FeatureCollection, FeatureId},
    persist::pipeline::{destination_base, PersistencePipeline, SaveReport},
};

use super::{
    events::{Action, KeyMap, SurfaceEvent},
    jump::parse_lng_lat,
    surface::{Notification, RenderSurface},
};

/// Result of work the controller started in the background.
#[derive(Debug)]
pub enum Completion {
    Loaded {
        sequence: u64,
        path: PathBuf,
        result: Result<FeatureCollection, StoreError>,
    },
    Saved(Result<SaveReport, SaveError>),
    AddressResolved {
        sequence: u64,
        result: Result<Option<AddressInfo>, String>,
    },
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub keymap: KeyMap,
    pub source_encoding: String,
    pub conversion_crs: String,
    pub initial_center: geo::Coord,
    pub initial_zoom: u8,
    pub jump_zoom: u8,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            keymap: KeyMap::from(&config.keys),
            source_encoding: config.source_encoding.clone(),
            conversion_crs: config.conversion.crs.clone(),
            initial_center: geo::Coord {
                x: config.view.initial_lng,
                y: config.view.initial_lat,
            },
            initial_zoom: config.view.initial_zoom,
            jump_zoom: config.view.jump_zoom,
        }
    }
}

/// Translates render surface events into store, session and persistence operations.
///
/// Event handling never waits on I/O: loads, saves and address lookups run as tasks on the runtime and
/// report back through `complete`.
pub struct Controller<S: RenderSurface> {
    settings: ControllerSettings,
    store: FeatureStore,
    session: EditSession,
    surface: S,
    pipeline: Arc<PersistencePipeline>,
    lookup: Option<Arc<AddressLookup>>,
    completions: UnboundedSender<Completion>,
    save_in_flight: bool,
    load_sequence: u64,
    lookup_sequence: u64,
}

impl<S: RenderSurface> Controller<S> {
    pub fn new(
        settings: ControllerSettings,
        mut surface: S,
        pipeline: PersistencePipeline,
        lookup: Option<AddressLookup>,
        completions: UnboundedSender<Completion>,
    ) -> Self {
        surface.set_view(settings.initial_center, settings.initial_zoom);
        Self {
            settings,
            store: FeatureStore::new(),
            session: EditSession::new(),
            surface,
            pipeline: Arc::new(pipeline),
            lookup: lookup.map(Arc::new),
            completions,
            save_in_flight: false,
            load_sequence: 0,
            lookup_sequence: 0,
        }
    }

    pub fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_saving(&self) -> bool {
        self.save_in_flight
    }

    pub fn handle(&mut self, event: SurfaceEvent) {
        log::debug!("Handling {:?}", event);
        match event {
            SurfaceEvent::FeatureClicked(id) => self.select(id),
            SurfaceEvent::GeometryChanged(geometry) => self.geometry_changed(geometry),
            SurfaceEvent::KeyPressed(key) => match self.settings.keymap.action_for(key) {
                Some(action) => self.run(action),
                None => log::debug!("No action bound to {:?}", key),
            },
            SurfaceEvent::JumpSubmitted(text) => self.jump(&text),
            SurfaceEvent::ViewSettled(center) => self.view_settled(center),
            SurfaceEvent::OpenRequested(path) => self.open(path),
        }
    }

    pub fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded {
                sequence,
                path,
                result,
            } => self.loaded(sequence, path, result),
            Completion::Saved(result) => self.saved(result),
            Completion::AddressResolved { sequence, result } => {
                self.address_resolved(sequence, result)
            }
        }
    }

    fn run(&mut self, action: Action) {
        match action {
            Action::Commit => self.commit(),
            Action::Discard => self.discard(),
            Action::Save => self.save(),
        }
    }

    /// Start reading `path`. The current collection stays in place until the read succeeds, and a read that
    /// finishes after a newer request is dropped.
    pub fn open(&mut self, path: PathBuf) {
        log::info!("Loading {:?}", path);
        self.load_sequence += 1;
        let sequence = self.load_sequence;
        let encoding = self.settings.source_encoding.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = FeatureStore::read(path.clone(), encoding).await;
            let _ = completions.send(Completion::Loaded {
                sequence,
                path,
                result,
            });
        });
    }

    fn loaded(
        &mut self,
        sequence: u64,
        path: PathBuf,
        result: Result<FeatureCollection, StoreError>,
    ) {
        if sequence != self.load_sequence {
            log::info!("Dropping superseded load of {:?}", path);
            return;
        }
        let installed = result.and_then(|collection| self.store.install(&path, collection));
        match installed {
            Ok(count) => {
                if self.session.discard().is_some() {
                    self.surface.clear_highlight();
                }
                if let Some(crs) = self.store.crs() {
                    if crs != self.settings.conversion_crs {
                        log::warn!(
                            "{:?} declares {} but will be saved as {}; coordinates are not reprojected",
                            path,
                            crs,
                            self.settings.conversion_crs
                        );
                    }
                }
                self.surface.render_collection(self.store.features());
                if let Some(bounds) = self.store.current_bounds() {
                    self.surface.fit_bounds(bounds);
                }
                log::info!("Loaded {} features from {:?}", count, path);
            }
            Err(err) => {
                log::error!("{}", err);
                self.surface.notify(Notification::Error(err.to_string()));
            }
        }
    }

    fn select(&mut self, id: FeatureId) {
        let previous = self.session.selected_id();
        match self.session.select(&self.store, id) {
            Ok(()) => {
                if previous.is_some() {
                    self.surface.clear_highlight();
                }
                if let Some(candidate) = self.session.candidate() {
                    self.surface
                        .highlight(&candidate.feature, candidate.feature.is_editable());
                }
            }
            Err(err) => {
                log::warn!("Could not select feature {}: {}", id, err);
                self.surface
                    .notify(Notification::Error("feature not found.".to_string()));
            }
        }
    }

    fn geometry_changed(&mut self, geometry: geo::Geometry) {
        if let Some(candidate) = self.session.candidate() {
            if !candidate.feature.is_editable() {
                log::warn!("Feature {} is not editable", candidate.id);
                self.surface
                    .notify(Notification::Error("feature is not editable.".to_string()));
                return;
            }
        }
        if let Err(err) = self.session.on_geometry_changed(geometry) {
            log::error!("Geometry change rejected: {}", err);
            self.surface.notify(Notification::Error(err.to_string()));
        }
    }

    fn commit(&mut self) {
        match self.session.commit(&mut self.store) {
            Ok(_) => {
                self.surface.clear_highlight();
                self.surface.render_collection(self.store.features());
            }
            Err(SessionError::InvalidState { .. }) => {
                self.surface
                    .notify(Notification::Error("no feature selected.".to_string()));
            }
            Err(err) => {
                log::warn!("{}", err);
                self.surface
                    .notify(Notification::Error("feature not found.".to_string()));
            }
        }
    }

    fn discard(&mut self) {
        if let Some(id) = self.session.discard() {
            log::debug!("Discarded selection of feature {}", id);
            self.surface.clear_highlight();
        }
    }

    fn save(&mut self) {
        if self.save_in_flight {
            self.surface
                .notify(Notification::Error("save already in progress".to_string()));
            return;
        }
        let (snapshot, source_path) = match (self.store.snapshot(), self.store.source_path()) {
            (Ok(snapshot), Some(source_path)) => (snapshot, source_path.to_path_buf()),
            _ => {
                self.surface
                    .notify(Notification::Error(SaveError::NothingLoaded.to_string()));
                return;
            }
        };
        if !self.session.is_idle() {
            log::info!("Saving without the uncommitted edit of the selected feature");
        }

        self.save_in_flight = true;
        let base = destination_base(&source_path);
        let pipeline = Arc::clone(&self.pipeline);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = pipeline.save_snapshot(snapshot, &base).await;
            let _ = completions.send(Completion::Saved(result));
        });
    }

    fn saved(&mut self, result: Result<SaveReport, SaveError>) {
        self.save_in_flight = false;
        match result {
            Ok(report) => self.surface.notify(Notification::Success(format!(
                "{} saved",
                report.shapefile_path.display()
            ))),
            Err(err) => {
                log::error!("{}", err);
                self.surface.notify(Notification::Error(err.to_string()));
            }
        }
    }

    fn jump(&mut self, text: &str) {
        match parse_lng_lat(text) {
            Ok(center) => self.surface.set_view(center, self.settings.jump_zoom),
            Err(err) => self.surface.notify(Notification::Error(err.to_string())),
        }
    }

    fn view_settled(&mut self, center: geo::Coord) {
        let lookup = match &self.lookup {
            Some(lookup) => Arc::clone(lookup),
            None => return,
        };
        self.lookup_sequence += 1;
        let sequence = self.lookup_sequence;
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = lookup.lookup(center).await.map_err(|err| err.to_string());
            let _ = completions.send(Completion::AddressResolved { sequence, result });
        });
    }

    fn address_resolved(&mut self, sequence: u64, result: Result<Option<AddressInfo>, String>) {
        if sequence != self.lookup_sequence {
            log::debug!("Dropping stale address response {}", sequence);
            return;
        }
        match result {
            Ok(Some(info)) => {
                if let Some(boundary) = &info.boundary {
                    self.surface.show_boundary(boundary);
                }
                self.surface.show_address(&info.description);
            }
            Ok(None) => {}
            Err(text) => self.surface.show_address(&text),
        }
    }
}
