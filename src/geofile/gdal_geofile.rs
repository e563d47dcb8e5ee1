use anyhow::{anyhow, Context};
use gdal::vector::{FieldValue, LayerAccess, OGRFieldType};
use indicatif::ProgressBar;
use serde_json::Value;
use std::{collections::HashSet, fs, path::Path};

use super::feature::{Attributes, Feature};

/// Sibling files GDAL produces or reads for one shapefile.
const SHAPEFILE_PARTS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

pub enum GdalDriverType {
    Shapefile,
    GeoJson,
}

impl GdalDriverType {
    pub fn name(&self) -> &'static str {
        match self {
            GdalDriverType::Shapefile => "ESRI Shapefile",
            GdalDriverType::GeoJson => "GeoJSON",
        }
    }
}

/// Field name and OGR type, in layer order.
pub type FieldDefinition = (String, OGRFieldType::Type);

/// Content of a single-layer vector file.
pub struct GeofileLayer {
    pub features: Vec<Feature>,
    pub spatial_ref: Option<gdal::spatial_ref::SpatialRef>,
    pub fields: Vec<FieldDefinition>,
}

/// Write `features`, typing each field from its values.
pub fn write_features_to_geofile(
    features: &[Feature],
    output_filepath: &Path,
    crs: Option<&gdal::spatial_ref::SpatialRef>,
    driver: &str,
    layer_creation_options: &[&str],
) -> anyhow::Result<()> {
    write_features_with_fields(
        features,
        &[],
        output_filepath,
        crs,
        driver,
        layer_creation_options,
    )
}

/// Write `features` with the `declared` field types. Fields that are not declared are typed from their values.
pub fn write_features_with_fields(
    features: &[Feature],
    declared: &[FieldDefinition],
    output_filepath: &Path,
    crs: Option<&gdal::spatial_ref::SpatialRef>,
    driver: &str,
    layer_creation_options: &[&str],
) -> anyhow::Result<()> {
    gdal::DriverManager::register_all();
    let driver = gdal::DriverManager::get_driver_by_name(driver).context("Getting GDAL driver")?;

    let layer_type = {
        use gdal::vector::OGRwkbGeometryType::*;
        match features.iter().find_map(|feature| feature.geometry.as_ref()) {
            // A collection without any shape still gets a layer so the output file exists.
            None => wkbPolygon,
            Some(geo::Geometry::Point(_)) => wkbPoint,
            Some(geo::Geometry::LineString(_)) => wkbLineString,
            Some(geo::Geometry::Polygon(_)) => wkbPolygon,
            Some(geo::Geometry::MultiPoint(_)) => wkbMultiPoint,
            Some(geo::Geometry::MultiLineString(_)) => wkbMultiLineString,
            Some(geo::Geometry::MultiPolygon(_)) => wkbMultiPolygon,
            Some(geometry) => {
                return Err(anyhow!("Cannot write geometry type {:?} to file.", {
                    geometry
                }))
            }
        }
    };

    let crs = match crs {
        Some(crs) => crs.clone(),
        None => crate::crs::crs_utils::epsg_4326()?,
    };
    log::debug!("Using spatial ref {} for writing geofile", crs.name()?);

    let layer_name = output_filepath
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("");
    let mut dataset = driver.create_vector_only(output_filepath)?;
    let layer_options = gdal::LayerOptions {
        name: layer_name,
        srs: Some(&crs),
        ty: layer_type,
        options: if layer_creation_options.is_empty() {
            None
        } else {
            Some(layer_creation_options)
        },
    };

    let mut layer = dataset.create_layer(layer_options)?;

    let field_definitions = get_field_definitions(features, declared);
    let field_definitions: Vec<(&str, OGRFieldType::Type)> = field_definitions
        .iter()
        .map(|(field_name, field_type)| (field_name as &str, *field_type))
        .collect();
    layer.create_defn_fields(&field_definitions)?;

    log::info!(
        "Writing {} features to {:?}",
        features.len(),
        output_filepath
    );
    let bar = ProgressBar::new(features.len() as u64);
    for feature in features {
        let mut gdal_feature = gdal::vector::Feature::new(layer.defn())?;
        if let Some(geometry) = &feature.geometry {
            let wkb = wkb::geom_to_wkb(geometry)
                .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))?;
            gdal_feature.set_geometry(gdal::vector::Geometry::from_wkb(&wkb)?)?;
        }
        // GDAL coerces each value to the declared type of its field.
        for (key, value) in &feature.attributes {
            if let Some(value) = json_to_field_value(value) {
                gdal_feature.set_field(key, &value)?;
            }
        }
        gdal_feature.create(&layer)?;

        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(())
}

/// Declared fields first, then undeclared fields in order of first appearance. The type of an undeclared field
/// is taken from its first non-null value.
fn get_field_definitions(features: &[Feature], declared: &[FieldDefinition]) -> Vec<FieldDefinition> {
    let mut seen: HashSet<String> = declared.iter().map(|(name, _)| name.clone()).collect();
    let mut definitions = declared.to_vec();
    for feature in features {
        for (key, value) in &feature.attributes {
            if value.is_null() || seen.contains(key) {
                continue;
            }
            seen.insert(key.clone());
            definitions.push((key.clone(), field_type_for(value)));
        }
    }
    definitions
}

fn field_type_for(value: &Value) -> OGRFieldType::Type {
    match value {
        Value::Bool(_) => OGRFieldType::OFTInteger,
        Value::Number(number) => match number.as_i64() {
            Some(integer) if i32::try_from(integer).is_ok() => OGRFieldType::OFTInteger,
            Some(_) => OGRFieldType::OFTInteger64,
            None => OGRFieldType::OFTReal,
        },
        _ => OGRFieldType::OFTString,
    }
}

fn json_to_field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => Some(FieldValue::IntegerValue(*flag as i32)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Some(FieldValue::Integer64Value(integer)),
            None => number.as_f64().map(FieldValue::RealValue),
        },
        Value::String(text) => Some(FieldValue::StringValue(text.clone())),
        other => Some(FieldValue::StringValue(other.to_string())),
    }
}

fn field_value_to_json(value: Option<FieldValue>) -> Value {
    match value {
        None => Value::Null,
        Some(FieldValue::IntegerValue(integer)) => Value::from(integer),
        Some(FieldValue::Integer64Value(integer)) => Value::from(integer),
        Some(FieldValue::RealValue(real)) => serde_json::Number::from_f64(real)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(FieldValue::StringValue(text)) => Value::String(text),
        Some(FieldValue::DateValue(date)) => Value::String(date.to_string()),
        Some(FieldValue::DateTimeValue(datetime)) => Value::String(datetime.to_rfc3339()),
        Some(other) => other.into_string().map(Value::String).unwrap_or(Value::Null),
    }
}

/// Read all features of a single-layer vector file, together with the layer's spatial reference if it declares
/// one and its field definitions. Records with a null shape are kept without geometry.
pub fn read_features_from_geofile(
    filepath: &Path,
    open_options: &[&str],
) -> anyhow::Result<GeofileLayer> {
    gdal::DriverManager::register_all();
    let open_options = gdal::DatasetOptions {
        open_flags: gdal::GdalOpenFlags::GDAL_OF_VECTOR,
        open_options: if open_options.is_empty() {
            None
        } else {
            Some(open_options)
        },
        ..Default::default()
    };
    let dataset = gdal::Dataset::open_ex(filepath, open_options)
        .with_context(|| format!("Opening {:?}", filepath))?;

    let layer_count = dataset.layer_count();
    if 0 == layer_count || 1 < layer_count {
        return Err(anyhow!(
            "Found {} layers, only one layer is supported.",
            layer_count
        ));
    }
    let mut layer = dataset.layer(0)?;
    let spatial_ref = match layer.spatial_ref() {
        Ok(mut spatial_ref) => {
            // Shapefile .prj files rarely carry an authority code; let GDAL identify one when it can.
            if let Err(err) = spatial_ref.auto_identify_epsg() {
                log::debug!("Could not identify EPSG code for {:?}: {}", filepath, err);
            }
            Some(spatial_ref)
        }
        Err(_) => None,
    };
    let fields: Vec<FieldDefinition> = layer
        .defn()
        .fields()
        .map(|field| (field.name(), field.field_type()))
        .collect();

    let bar = ProgressBar::new(layer.feature_count());
    let mut features = Vec::new();
    for (index, gdal_feature) in layer.features().enumerate() {
        let geometry = match gdal_feature.geometry_by_index(0) {
            Ok(geometry) => {
                let wkb = geometry.wkb()?;
                Some(
                    wkb::wkb_to_geom(&mut wkb.as_slice())
                        .map_err(|err| anyhow!("Could not read geometry from WKB, {:?}", err))?,
                )
            }
            Err(_) => {
                log::warn!("Feature {} of {:?} has no geometry", index, filepath);
                None
            }
        };

        let mut attributes = Attributes::new();
        for (field_name, value) in gdal_feature.fields() {
            attributes.insert(field_name, field_value_to_json(value));
        }
        features.push(Feature {
            geometry,
            attributes,
        });
        bar.inc(1);
    }
    bar.finish_and_clear();
    log::debug!("Read {} features from {:?}", features.len(), filepath);
    Ok(GeofileLayer {
        features,
        spatial_ref,
        fields,
    })
}

/// Delete every sibling file of a shapefile so GDAL can create it from scratch.
pub fn remove_shapefile(shapefile_path: &Path) -> anyhow::Result<()> {
    for extension in SHAPEFILE_PARTS {
        let part = shapefile_path.with_extension(extension);
        if part.exists() {
            fs::remove_file(&part).with_context(|| format!("Removing {:?}", part))?;
        }
    }
    Ok(())
}

/// Move the shapefile at `source_path` over the one at `target_path`. Parts the target had but the source lacks
/// are removed.
pub fn replace_shapefile(source_path: &Path, target_path: &Path) -> anyhow::Result<()> {
    remove_shapefile(target_path)?;
    for extension in SHAPEFILE_PARTS {
        let part = source_path.with_extension(extension);
        if part.exists() {
            let target = target_path.with_extension(extension);
            fs::rename(&part, &target)
                .with_context(|| format!("Moving {:?} to {:?}", part, target))?;
        }
    }
    Ok(())
}
