use std::path::{Path, PathBuf};

use geo::BoundingRect;
use rayon::prelude::*;

use crate::{
    crs::crs_utils::spatial_ref_declaration,
    error::StoreError,
    geofile::{
        feature::{Feature, FeatureCollection, FeatureId, FEATURE_KEY},
        gdal_geofile::read_features_from_geofile,
    },
};

struct LoadedCollection {
    source_path: PathBuf,
    collection: FeatureCollection,
}

/// Owner of the authoritative feature collection of the currently loaded shapefile.
///
/// Every installed feature carries its identifier under `FEATURE_KEY`. The collection is only mutated by
/// `install` (wholesale) and `replace` (one element, by identifier).
#[derive(Default)]
pub struct FeatureStore {
    loaded: Option<LoadedCollection>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a shapefile and its attribute sidecar and install the result.
    /// On failure the previously installed collection is kept.
    pub async fn load(&mut self, path: &Path, encoding: &str) -> Result<usize, StoreError> {
        let collection = Self::read(path.to_path_buf(), encoding.to_string()).await?;
        self.install(path, collection)
    }

    /// Read a shapefile on the blocking pool without touching any store.
    pub async fn read(path: PathBuf, encoding: String) -> Result<FeatureCollection, StoreError> {
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || read_shapefile(&task_path, &encoding))
            .await
            .map_err(|err| StoreError::SourceRead {
                path: path.clone(),
                reason: err.to_string(),
            })?
            .map_err(|err| StoreError::SourceRead {
                path,
                reason: format!("{:#}", err),
            })
    }

    /// Replace the current collection with `collection`, tagging its features with identifiers 1..N in order.
    pub fn install(
        &mut self,
        source_path: &Path,
        mut collection: FeatureCollection,
    ) -> Result<usize, StoreError> {
        if collection
            .features
            .iter()
            .any(|feature| feature.attributes.contains_key(FEATURE_KEY))
        {
            return Err(StoreError::SourceRead {
                path: source_path.to_path_buf(),
                reason: format!("source data already uses the reserved field {}", FEATURE_KEY),
            });
        }
        for (index, feature) in collection.features.iter_mut().enumerate() {
            feature.set_id(FeatureId(index as u64 + 1));
        }
        let count = collection.len();
        log::info!("Installed {} features from {:?}", count, source_path);
        self.loaded = Some(LoadedCollection {
            source_path: source_path.to_path_buf(),
            collection,
        });
        Ok(count)
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|loaded| loaded.source_path.as_path())
    }

    pub fn crs(&self) -> Option<&str> {
        self.loaded
            .as_ref()
            .and_then(|loaded| loaded.collection.crs.as_deref())
    }

    pub fn features(&self) -> &[Feature] {
        match &self.loaded {
            Some(loaded) => &loaded.collection.features,
            None => &[],
        }
    }

    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features().iter().find(|feature| feature.id() == Some(id))
    }

    /// Substitute the feature tagged `id` in place. Returns the feature that was replaced.
    pub fn replace(&mut self, id: FeatureId, mut feature: Feature) -> Result<Feature, StoreError> {
        let features = match &mut self.loaded {
            Some(loaded) => &mut loaded.collection.features,
            None => return Err(StoreError::NotFound(id)),
        };
        let position = features
            .iter()
            .position(|candidate| candidate.id() == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        feature.set_id(id);
        log::debug!("Replacing feature {} at position {}", id, position);
        Ok(std::mem::replace(&mut features[position], feature))
    }

    /// Deep copy of the current collection with identifiers stripped.
    pub fn snapshot(&self) -> Result<FeatureCollection, StoreError> {
        let loaded = self.loaded.as_ref().ok_or(StoreError::NotLoaded)?;
        let mut snapshot = loaded.collection.clone();
        snapshot.features.par_iter_mut().for_each(Feature::strip_id);
        Ok(snapshot)
    }

    /// Bounding envelope of all features, `None` when nothing with extent is loaded.
    pub fn current_bounds(&self) -> Option<geo::Rect> {
        self.features()
            .par_iter()
            .filter_map(|feature| feature.geometry.as_ref()?.bounding_rect())
            .reduce_with(|a, b| {
                geo::Rect::new(
                    geo::Coord {
                        x: a.min().x.min(b.min().x),
                        y: a.min().y.min(b.min().y),
                    },
                    geo::Coord {
                        x: a.max().x.max(b.max().x),
                        y: a.max().y.max(b.max().y),
                    },
                )
            })
    }
}

fn read_shapefile(path: &Path, encoding: &str) -> anyhow::Result<FeatureCollection> {
    if !path.exists() {
        return Err(anyhow::anyhow!("Shapefile {:?} not found", path));
    }
    let sidecar_path = path.with_extension("dbf");
    if !sidecar_path.exists() {
        return Err(anyhow::anyhow!(
            "Attribute file {:?} not found",
            sidecar_path
        ));
    }

    log::info!("Reading features from {:?}", path);
    let encoding_option = format!("ENCODING={}", encoding);
    let layer = read_features_from_geofile(path, &[encoding_option.as_str()])?;
    let crs = match layer.spatial_ref {
        Some(spatial_ref) => Some(spatial_ref_declaration(&spatial_ref)?),
        None => {
            log::warn!("{:?} does not declare a coordinate reference system", path);
            None
        }
    };
    Ok(FeatureCollection::new(layer.features, crs))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use serde_json::json;
    use testdir::testdir;

    use crate::{
        error::StoreError,
        geofile::{
            feature::{Attributes, Feature, FeatureCollection, FeatureId, FEATURE_KEY},
            gdal_geofile::{write_features_to_geofile, GdalDriverType},
        },
    };

    use super::FeatureStore;

    fn square(x: f64, y: f64, name: &str) -> Feature {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(name));
        Feature::new(
            geo::Geometry::Polygon(geo::Polygon::new(
                vec![(x, y), (x, y + 1.0), (x + 1.0, y + 1.0), (x + 1.0, y), (x, y)].into(),
                vec![],
            )),
            attributes,
        )
    }

    fn store_with(features: Vec<Feature>) -> FeatureStore {
        let mut store = FeatureStore::new();
        store
            .install("parcels.shp".as_ref(), FeatureCollection::new(features, None))
            .unwrap();
        store
    }

    #[test]
    fn test_install_assigns_sequential_ids() {
        let store = store_with(vec![
            square(0.0, 0.0, "a"),
            square(1.0, 0.0, "b"),
            square(2.0, 0.0, "c"),
        ]);
        let ids: Vec<Option<FeatureId>> = store.features().iter().map(Feature::id).collect();
        assert_eq!(
            vec![Some(FeatureId(1)), Some(FeatureId(2)), Some(FeatureId(3))],
            ids
        );
    }

    #[test]
    fn test_install_rejects_reserved_key() {
        let mut feature = square(0.0, 0.0, "a");
        feature
            .attributes
            .insert(FEATURE_KEY.to_string(), json!(99));
        let mut store = store_with(vec![square(5.0, 5.0, "kept")]);

        let result = store.install(
            "other.shp".as_ref(),
            FeatureCollection::new(vec![feature], None),
        );
        assert!(matches!(result, Err(StoreError::SourceRead { .. })));
        assert_eq!(1, store.features().len());
        assert_eq!(Some("parcels.shp".as_ref()), store.source_path());
    }

    #[test]
    fn test_replace_is_positional() {
        let mut store = store_with(vec![
            square(0.0, 0.0, "a"),
            square(1.0, 0.0, "b"),
            square(2.0, 0.0, "c"),
        ]);
        let before = store.features().to_vec();

        let replacement = square(10.0, 10.0, "b2");
        let replaced = store.replace(FeatureId(2), replacement).unwrap();

        assert_eq!(before[1], replaced);
        assert_eq!(before[0], store.features()[0]);
        assert_eq!(before[2], store.features()[2]);
        assert_eq!(Some(FeatureId(2)), store.features()[1].id());
        assert_eq!(Some(&json!("b2")), store.features()[1].attributes.get("name"));
    }

    #[test]
    fn test_replace_unknown_id_leaves_store_unchanged() {
        let mut store = store_with(vec![square(0.0, 0.0, "a")]);
        let before = store.features().to_vec();

        let result = store.replace(FeatureId(5), square(3.0, 3.0, "x"));

        assert!(matches!(result, Err(StoreError::NotFound(FeatureId(5)))));
        assert_eq!(before, store.features());
    }

    #[test]
    fn test_snapshot_strips_ids_without_mutating() {
        let store = store_with(vec![square(0.0, 0.0, "a"), square(1.0, 0.0, "b")]);

        let snapshot = store.snapshot().unwrap();

        assert_eq!(2, snapshot.len());
        assert!(snapshot
            .features
            .iter()
            .all(|feature| !feature.attributes.contains_key(FEATURE_KEY)));
        assert!(store.features().iter().all(|feature| feature.id().is_some()));
    }

    #[test]
    fn test_snapshot_without_collection_fails() {
        assert!(matches!(
            FeatureStore::new().snapshot(),
            Err(StoreError::NotLoaded)
        ));
    }

    #[test]
    fn test_current_bounds_covers_all_features() {
        let store = store_with(vec![square(0.0, 0.0, "a"), square(4.0, -2.0, "b")]);
        let bounds = store.current_bounds().unwrap();
        assert_abs_diff_eq!(0.0, bounds.min().x);
        assert_abs_diff_eq!(-2.0, bounds.min().y);
        assert_abs_diff_eq!(5.0, bounds.max().x);
        assert_abs_diff_eq!(1.0, bounds.max().y);
        assert!(FeatureStore::new().current_bounds().is_none());
    }

    #[tokio::test]
    async fn test_load_shapefile() {
        let shapefile_path = testdir!().join("parcels.shp");
        write_features_to_geofile(
            &[square(0.0, 0.0, "a"), square(1.0, 0.0, "b")],
            &shapefile_path,
            None,
            GdalDriverType::Shapefile.name(),
            &["ENCODING=UTF-8"],
        )
        .unwrap();

        let mut store = FeatureStore::new();
        let count = store.load(&shapefile_path, "UTF-8").await.unwrap();

        assert_eq!(2, count);
        assert_eq!(Some(FeatureId(2)), store.features()[1].id());
        assert_eq!(Some(&json!("b")), store.features()[1].attributes.get("name"));
        assert!(store
            .crs()
            .map_or(false, |crs| crs == "EPSG:4326" || crs.contains("WGS")));
    }

    #[tokio::test]
    async fn test_load_keeps_null_shape_records() {
        let shapefile_path = testdir!().join("parcels.shp");
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("orphan"));
        write_features_to_geofile(
            &[
                square(0.0, 0.0, "a"),
                Feature::without_geometry(attributes),
                square(3.0, 0.0, "c"),
            ],
            &shapefile_path,
            None,
            GdalDriverType::Shapefile.name(),
            &[],
        )
        .unwrap();

        let mut store = FeatureStore::new();
        assert_eq!(3, store.load(&shapefile_path, "UTF-8").await.unwrap());

        let orphan = store.get(FeatureId(2)).unwrap();
        assert!(orphan.geometry.is_none());
        assert!(!orphan.is_editable());
        let bounds = store.current_bounds().unwrap();
        assert_abs_diff_eq!(0.0, bounds.min().x);
        assert_abs_diff_eq!(4.0, bounds.max().x);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_collection() {
        let mut store = store_with(vec![square(0.0, 0.0, "a")]);

        let result = store
            .load(&testdir!().join("missing.shp"), "UTF-8")
            .await;

        assert!(matches!(result, Err(StoreError::SourceRead { .. })));
        assert_eq!(1, store.features().len());
        assert_eq!(Some("parcels.shp".as_ref()), store.source_path());
    }

    #[tokio::test]
    async fn test_load_requires_attribute_sidecar() {
        let shapefile_path = testdir!().join("parcels.shp");
        write_features_to_geofile(
            &[square(0.0, 0.0, "a")],
            &shapefile_path,
            None,
            GdalDriverType::Shapefile.name(),
            &[],
        )
        .unwrap();
        std::fs::remove_file(shapefile_path.with_extension("dbf")).unwrap();

        let result = FeatureStore::new().load(&shapefile_path, "UTF-8").await;
        assert!(matches!(result, Err(StoreError::SourceRead { .. })));
    }
}
