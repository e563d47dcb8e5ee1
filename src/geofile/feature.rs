use std::fmt;

use serde_json::Value;

/// Attribute key under which the load-session identifier is stored. Shapefile field names are at most
/// ten characters long, so this key cannot collide with a column of the source data.
pub const FEATURE_KEY: &str = "__featureKey__";

/// Attribute values of a feature, keyed by field name. Values are JSON typed so they pass through the
/// GeoJSON interchange file unchanged.
pub type Attributes = serde_json::Map<String, Value>;

/// Identifier assigned to a feature when its collection is loaded. Identifiers run from 1 to N in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One record of a collection. Shapefiles may hold records with a null shape, so the geometry is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<geo::Geometry>,
    pub attributes: Attributes,
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self::new(value, Attributes::new())
    }
}

impl Feature {
    pub fn new(geometry: geo::Geometry, attributes: Attributes) -> Self {
        Self {
            geometry: Some(geometry),
            attributes,
        }
    }

    pub fn without_geometry(attributes: Attributes) -> Self {
        Self {
            geometry: None,
            attributes,
        }
    }

    /// The identifier stored under `FEATURE_KEY`, if the feature has been tagged.
    pub fn id(&self) -> Option<FeatureId> {
        self.attributes
            .get(FEATURE_KEY)
            .and_then(Value::as_u64)
            .map(FeatureId)
    }

    pub fn set_id(&mut self, id: FeatureId) {
        self.attributes
            .insert(FEATURE_KEY.to_string(), Value::from(id.0));
    }

    pub fn strip_id(&mut self) {
        self.attributes.remove(FEATURE_KEY);
    }

    /// Whether the render surface should offer vertex editing for this feature.
    pub fn is_editable(&self) -> bool {
        matches!(
            self.geometry,
            Some(geo::Geometry::Polygon(_) | geo::Geometry::MultiPolygon(_))
        )
    }
}

impl From<&Feature> for geojson::Feature {
    fn from(feature: &Feature) -> Self {
        geojson::Feature {
            bbox: None,
            geometry: feature
                .geometry
                .as_ref()
                .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
            id: None,
            properties: Some(feature.attributes.clone()),
            foreign_members: None,
        }
    }
}

/// Ordered features of one loaded source plus its coordinate reference declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<String>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>, crs: Option<String>) -> Self {
        Self { features, crs }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<&FeatureCollection> for geojson::FeatureCollection {
    fn from(collection: &FeatureCollection) -> Self {
        collection.features.iter().map(geojson::Feature::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Attributes, Feature, FeatureId, FEATURE_KEY};

    fn square() -> geo::Geometry {
        geo::Geometry::Polygon(geo::Polygon::new(
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)].into(),
            vec![],
        ))
    }

    #[test]
    fn test_id_is_stored_in_attributes() {
        let mut feature = Feature::from(square());
        assert_eq!(None, feature.id());

        feature.set_id(FeatureId(7));
        assert_eq!(Some(FeatureId(7)), feature.id());
        assert_eq!(Some(&json!(7)), feature.attributes.get(FEATURE_KEY));

        feature.strip_id();
        assert_eq!(None, feature.id());
        assert!(feature.attributes.is_empty());
    }

    #[test]
    fn test_only_polygons_are_editable() {
        assert!(Feature::from(square()).is_editable());
        assert!(!Feature::from(geo::Geometry::Point(geo::Point::new(1.0, 2.0))).is_editable());
        assert!(!Feature::without_geometry(Attributes::new()).is_editable());
    }

    #[test]
    fn test_null_geometry_becomes_null_geojson_geometry() {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("orphan"));
        let geojson_feature = geojson::Feature::from(&Feature::without_geometry(attributes));
        assert!(geojson_feature.geometry.is_none());
        assert_eq!(Some(&json!("orphan")), geojson_feature.property("name"));
    }

    #[test]
    fn test_feature_to_geojson_keeps_properties() {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), json!("parcel"));
        let feature = Feature::new(square(), attributes);

        let geojson_feature = geojson::Feature::from(&feature);
        assert_eq!(
            Some(&json!("parcel")),
            geojson_feature.property("name")
        );
        let geometry = geojson_feature.geometry.unwrap();
        assert!(matches!(geometry.value, geojson::Value::Polygon(_)));
    }
}
