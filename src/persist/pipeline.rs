use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::{
    edit::store::FeatureStore,
    error::SaveError,
    geofile::{feature::FeatureCollection, geojson::write_collection_to_geojson},
};

use super::conversion::ConversionGateway;

pub const INTERCHANGE_EXTENSION: &str = "geojson";
pub const SHAPEFILE_EXTENSION: &str = "shp";

/// Files produced by a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub interchange_path: PathBuf,
    pub shapefile_path: PathBuf,
    pub feature_count: usize,
}

/// `<directory>/<file stem>` of a source path. Files without an extension keep their full name.
pub fn destination_base(source_path: &Path) -> PathBuf {
    let name = source_path
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    match source_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

fn with_appended_extension(base: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(base.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// Writes the store's content as interchange GeoJSON, then regenerates the shapefile from it.
pub struct PersistencePipeline {
    gateway: ConversionGateway,
}

impl PersistencePipeline {
    pub fn new(gateway: ConversionGateway) -> Self {
        Self { gateway }
    }

    pub async fn save(
        &self,
        store: &FeatureStore,
        destination_base: &Path,
    ) -> Result<SaveReport, SaveError> {
        let snapshot = store.snapshot().map_err(|_| SaveError::NothingLoaded)?;
        self.save_snapshot(snapshot, destination_base).await
    }

    /// Save an already detached snapshot. The interchange file is fully written before conversion starts and
    /// is left in place when conversion fails.
    pub async fn save_snapshot(
        &self,
        snapshot: FeatureCollection,
        destination_base: &Path,
    ) -> Result<SaveReport, SaveError> {
        let interchange_path = with_appended_extension(destination_base, INTERCHANGE_EXTENSION);
        let shapefile_path = with_appended_extension(destination_base, SHAPEFILE_EXTENSION);

        log::info!(
            "Writing {} features to {:?}",
            snapshot.len(),
            interchange_path
        );
        write_collection_to_geojson(&snapshot, &interchange_path)
            .await
            .map_err(|source| SaveError::Serialization {
                path: interchange_path.clone(),
                source,
            })?;

        self.gateway
            .convert(&interchange_path, &shapefile_path)
            .await
            .map_err(|source| SaveError::Conversion {
                path: shapefile_path.clone(),
                interchange_path: interchange_path.clone(),
                source,
            })?;

        log::info!("Saved {:?}", shapefile_path);
        Ok(SaveReport {
            interchange_path,
            shapefile_path,
            feature_count: snapshot.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use approx::assert_abs_diff_eq;
    use geo::CoordsIter;
    use rstest::rstest;
    use serde_json::json;
    use testdir::testdir;

    use crate::{
        edit::{session::EditSession, store::FeatureStore},
        error::SaveError,
        geofile::{
            feature::{Attributes, Feature, FeatureCollection, FeatureId, FEATURE_KEY},
            gdal_geofile::{
                read_features_from_geofile, write_features_to_geofile, write_features_with_fields,
                GdalDriverType,
            },
        },
        persist::conversion::{ConversionGateway, ExternalTool, InProcessConverter},
    };

    use super::{destination_base, PersistencePipeline};

    fn parcel(x: f64, name: &str) -> Feature {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!(name));
        Feature::new(
            geo::Geometry::Polygon(geo::Polygon::new(
                vec![(x, 36.0), (x, 36.5), (x + 0.5, 36.5), (x + 0.5, 36.0), (x, 36.0)].into(),
                vec![],
            )),
            attributes,
        )
    }

    fn external(program: &str) -> PersistencePipeline {
        PersistencePipeline::new(ConversionGateway::External(ExternalTool {
            program: PathBuf::from(program),
            crs: "EPSG:4326".to_string(),
            encoding: "UTF-8".to_string(),
            timeout: None,
        }))
    }

    fn in_process() -> PersistencePipeline {
        PersistencePipeline::new(ConversionGateway::InProcess(InProcessConverter {
            crs: "EPSG:4326".to_string(),
            encoding: "UTF-8".to_string(),
        }))
    }

    fn installed_store(source_path: &Path) -> FeatureStore {
        let mut store = FeatureStore::new();
        store
            .install(
                source_path,
                FeatureCollection::new(vec![parcel(126.0, "a"), parcel(127.0, "b")], None),
            )
            .unwrap();
        store
    }

    #[rstest]
    #[case("/data/parcels.shp", "/data/parcels")]
    #[case("/data/parcels.v2.shp", "/data/parcels.v2")]
    #[case("/data/parcels", "/data/parcels")]
    fn test_destination_base(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(PathBuf::from(expected), destination_base(source.as_ref()));
    }

    #[tokio::test]
    async fn test_save_without_collection_writes_nothing() {
        let test_dir = testdir!();
        let result = external("true")
            .save(&FeatureStore::new(), &test_dir.join("parcels"))
            .await;

        assert!(matches!(result, Err(SaveError::NothingLoaded)));
        assert_eq!(0, std::fs::read_dir(&test_dir).unwrap().count());
    }

    #[tokio::test]
    async fn test_save_writes_stripped_interchange_file() {
        let test_dir = testdir!();
        let base = test_dir.join("parcels");
        let store = installed_store(&test_dir.join("parcels.shp"));

        let report = external("true").save(&store, &base).await.unwrap();

        assert_eq!(test_dir.join("parcels.geojson"), report.interchange_path);
        assert_eq!(test_dir.join("parcels.shp"), report.shapefile_path);
        assert_eq!(2, report.feature_count);
        let contents = std::fs::read_to_string(&report.interchange_path).unwrap();
        assert!(!contents.contains(FEATURE_KEY));
        assert!(contents.contains("\"name\": \"b\""));
        assert!(store.features().iter().all(|feature| feature.id().is_some()));
    }

    #[tokio::test]
    async fn test_conversion_failure_keeps_interchange_file() {
        let test_dir = testdir!();
        let store = installed_store(&test_dir.join("parcels.shp"));

        let result = external("false").save(&store, &test_dir.join("parcels")).await;

        match result {
            Err(SaveError::Conversion {
                interchange_path, ..
            }) => assert!(interchange_path.exists()),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_serialization_failure_skips_conversion() {
        let test_dir = testdir!();
        let store = installed_store(&test_dir.join("parcels.shp"));

        // A missing conversion program would report a conversion error if it were ever invoked.
        let result = external("/nonexistent/ogr2ogr")
            .save(&store, &test_dir.join("missing").join("parcels"))
            .await;

        assert!(matches!(result, Err(SaveError::Serialization { .. })));
    }

    fn assert_equivalent(expected: &[Feature], actual: &[Feature]) {
        assert_eq!(expected.len(), actual.len());
        for (expected, actual) in expected.iter().zip(actual) {
            assert_eq!(expected.attributes.get("name"), actual.attributes.get("name"));
            assert_eq!(expected.id(), actual.id());
            let expected_coords: Vec<geo::Coord> =
                expected.geometry.iter().flat_map(|g| g.coords_iter()).collect();
            let actual_coords: Vec<geo::Coord> =
                actual.geometry.iter().flat_map(|g| g.coords_iter()).collect();
            assert_eq!(expected_coords.len(), actual_coords.len());
            for (a, b) in expected_coords.iter().zip(&actual_coords) {
                assert_abs_diff_eq!(a.x, b.x, epsilon = 1e-9);
                assert_abs_diff_eq!(a.y, b.y, epsilon = 1e-9);
            }
        }
    }

    async fn round_trip(pipeline: PersistencePipeline) {
        let test_dir = testdir!();
        let shapefile_path = test_dir.join("parcels.shp");
        write_features_to_geofile(
            &[parcel(126.0, "a"), parcel(127.0, "b"), parcel(128.0, "c")],
            &shapefile_path,
            None,
            GdalDriverType::Shapefile.name(),
            &["ENCODING=UTF-8"],
        )
        .unwrap();

        let mut store = FeatureStore::new();
        store.load(&shapefile_path, "UTF-8").await.unwrap();
        let loaded = store.features().to_vec();

        pipeline
            .save(&store, &destination_base(&shapefile_path))
            .await
            .unwrap();

        let mut reloaded = FeatureStore::new();
        reloaded.load(&shapefile_path, "UTF-8").await.unwrap();
        assert_equivalent(&loaded, reloaded.features());
        assert!(reloaded
            .snapshot()
            .unwrap()
            .features
            .iter()
            .all(|feature| !feature.attributes.contains_key(FEATURE_KEY)));
    }

    #[tokio::test]
    async fn test_round_trip_in_process() {
        round_trip(in_process()).await;
    }

    #[tokio::test]
    #[ignore = "requires ogr2ogr on PATH"]
    async fn test_round_trip_ogr2ogr() {
        round_trip(external("ogr2ogr")).await;
    }

    #[tokio::test]
    async fn test_committed_edit_is_saved() {
        let test_dir = testdir!();
        let shapefile_path = test_dir.join("parcels.shp");
        let mut store = installed_store(&shapefile_path);
        let mut session = EditSession::new();
        let moved = geo::Geometry::Polygon(geo::Polygon::new(
            vec![(140.0, 36.0), (140.0, 36.5), (140.5, 36.5), (140.0, 36.0)].into(),
            vec![],
        ));

        session.select(&store, FeatureId(2)).unwrap();
        session.on_geometry_changed(moved).unwrap();
        session.commit(&mut store).unwrap();
        in_process()
            .save(&store, &destination_base(&shapefile_path))
            .await
            .unwrap();

        let mut reloaded = FeatureStore::new();
        reloaded.load(&shapefile_path, "UTF-8").await.unwrap();
        assert_equivalent(store.features(), reloaded.features());
        assert_eq!(Some(&json!("b")), reloaded.features()[1].attributes.get("name"));
    }

    #[tokio::test]
    async fn test_in_process_save_keeps_field_types() {
        let test_dir = testdir!();
        let shapefile_path = test_dir.join("parcels.shp");
        let mut feature = parcel(126.0, "a");
        feature.attributes.insert("lots".to_string(), json!(12));
        feature
            .attributes
            .insert("surveyed".to_string(), json!("2023-01-05"));
        let declared = vec![
            ("name".to_string(), gdal::vector::OGRFieldType::OFTString),
            ("lots".to_string(), gdal::vector::OGRFieldType::OFTInteger),
            ("surveyed".to_string(), gdal::vector::OGRFieldType::OFTDate),
        ];
        write_features_with_fields(
            &[feature],
            &declared,
            &shapefile_path,
            None,
            GdalDriverType::Shapefile.name(),
            &["ENCODING=UTF-8"],
        )
        .unwrap();

        let mut store = FeatureStore::new();
        store.load(&shapefile_path, "UTF-8").await.unwrap();
        in_process()
            .save(&store, &destination_base(&shapefile_path))
            .await
            .unwrap();

        let layer = read_features_from_geofile(&shapefile_path, &[]).unwrap();
        assert_eq!(declared, layer.fields);
        assert_eq!(
            Some(&json!("2023-01-05")),
            layer.features[0].attributes.get("surveyed")
        );
    }
}
