use crate::error::ValidationError;

/// Parse a `longitude,latitude` jump target.
pub fn parse_lng_lat(input: &str) -> Result<geo::Coord, ValidationError> {
    let parts: Vec<&str> = input.trim().split(',').collect();
    if parts.len() != 2 {
        return Err(ValidationError::MissingSeparator);
    }
    let lng = parse_finite(parts[0])?;
    let lat = parse_finite(parts[1])?;
    Ok(geo::Coord { x: lng, y: lat })
}

fn parse_finite(token: &str) -> Result<f64, ValidationError> {
    match token.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ValidationError::NotANumber),
    }
}
