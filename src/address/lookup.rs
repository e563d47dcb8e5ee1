use serde::Deserialize;
use serde_json::Value;

/// One administrative area containing the queried point, as returned by the address service.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AddressRecord {
    pub district: Option<String>,
    pub level: Option<i64>,
    pub name: Option<String>,
    pub lnglats: Vec<(f64, f64)>,
}

/// What the map shows for the current view center.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressInfo {
    pub boundary: Option<geo::Polygon>,
    pub description: String,
}

pub struct AddressLookup {
    client: reqwest::Client,
    endpoint: String,
}

impl AddressLookup {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("shape-edit")
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Query the service for `center`. `Ok(None)` means the response carried nothing to display.
    pub async fn lookup(&self, center: geo::Coord) -> Result<Option<AddressInfo>, reqwest::Error> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("lon", center.x), ("lat", center.y)])
            .send()
            .await?;
        let body = response.text().await?;
        Ok(parse_address_response(&body))
    }
}

/// Interpret a service response. Anything but a non-empty JSON array of records is ignored.
pub fn parse_address_response(body: &str) -> Option<AddressInfo> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            log::debug!("Ignoring malformed address response: {}", err);
            return None;
        }
    };
    if !value.is_array() {
        return None;
    }
    let records: Vec<AddressRecord> = serde_json::from_value(value).ok()?;
    if records.is_empty() {
        return None;
    }

    let boundary = records
        .iter()
        .find(|record| record.lnglats.len() > 2)
        .map(|record| geo::Polygon::new(record.lnglats.clone().into(), vec![]));
    let description = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let level = record.level.map(|level| level.to_string()).unwrap_or_default();
            let name = record.name.as_deref().unwrap_or_default();
            if index == 0 {
                let district = record.district.as_deref().unwrap_or_default();
                format!("{} [{}] {}", district, level, name)
            } else {
                format!("[{}] {}", level, name)
            }
        })
        .collect::<Vec<String>>()
        .join(" / ");
    Some(AddressInfo {
        boundary,
        description,
    })
}
