use std::{io, path::Path};

use super::feature::FeatureCollection;

/// Pretty-print a feature collection as GeoJSON, overwriting `output_filepath`.
pub async fn write_collection_to_geojson(
    collection: &FeatureCollection,
    output_filepath: &Path,
) -> io::Result<()> {
    let feature_collection = geojson::FeatureCollection::from(collection);
    let geojson_contents = serde_json::to_string_pretty(&feature_collection)?;
    tokio::fs::write(output_filepath, geojson_contents).await
}
