use anyhow::anyhow;

pub type EpsgCode = u32;

pub fn epsg_4326() -> anyhow::Result<gdal::spatial_ref::SpatialRef> {
    gdal::spatial_ref::SpatialRef::from_epsg(4326)
        .map_err(|err| anyhow!("Could not create EPSG:4326 spatial ref. {}", err))
}

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}

/// Describe a spatial reference the way it is declared to the conversion tool: `EPSG:<code>` when the
/// reference carries an EPSG authority code, its WKT otherwise.
pub fn spatial_ref_declaration(spatial_ref: &gdal::spatial_ref::SpatialRef) -> anyhow::Result<String> {
    if let (Ok(name), Ok(code)) = (spatial_ref.auth_name(), spatial_ref.auth_code()) {
        if name == "EPSG" {
            return Ok(epsg_code_to_authority_string(code as EpsgCode));
        }
    }
    Ok(spatial_ref.to_wkt()?)
}
