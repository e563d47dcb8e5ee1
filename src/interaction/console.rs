use std::path::PathBuf;

use geo::BoundingRect;
use tokio::sync::mpsc::UnboundedSender;

use crate::geofile::feature::{Feature, FeatureId, FEATURE_KEY};

use super::{
    events::SurfaceEvent,
    surface::{Notification, RenderSurface},
};

pub const USAGE: &str = "\
commands:
  click <id>              select a feature
  edit <geojson geometry> replace the geometry of the selected feature
  <key>                   a single character, e.g. u (commit), x (discard), s (save)
  goto <lng,lat>          center the view
  open <path>             load another shapefile
  help                    show this message
  quit                    exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Event(SurfaceEvent),
    Help,
    Quit,
}

/// Turn one line of console input into a command. Blank lines yield `None`.
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let command = match word {
        "quit" | "exit" => ConsoleCommand::Quit,
        "help" => ConsoleCommand::Help,
        "click" => {
            let id = rest
                .parse::<u64>()
                .map_err(|_| format!("invalid feature id {:?}", rest))?;
            ConsoleCommand::Event(SurfaceEvent::FeatureClicked(FeatureId(id)))
        }
        "edit" => {
            let geometry: geojson::Geometry =
                serde_json::from_str(rest).map_err(|err| format!("invalid geometry: {}", err))?;
            let geometry = geo::Geometry::<f64>::try_from(geometry)
                .map_err(|err| format!("invalid geometry: {}", err))?;
            ConsoleCommand::Event(SurfaceEvent::GeometryChanged(geometry))
        }
        "goto" => ConsoleCommand::Event(SurfaceEvent::JumpSubmitted(rest.to_string())),
        "open" if !rest.is_empty() => {
            ConsoleCommand::Event(SurfaceEvent::OpenRequested(PathBuf::from(rest)))
        }
        _ => {
            let mut chars = line.chars();
            match (chars.next(), chars.next()) {
                (Some(key), None) => ConsoleCommand::Event(SurfaceEvent::KeyPressed(key)),
                _ => return Err(format!("unknown command {:?}, try help", line)),
            }
        }
    };
    Ok(Some(command))
}

/// Text stand-in for a map display. View changes settle immediately and are reported back as events.
pub struct ConsoleSurface {
    events: UnboundedSender<ConsoleCommand>,
}

impl ConsoleSurface {
    pub fn new(events: UnboundedSender<ConsoleCommand>) -> Self {
        Self { events }
    }

    fn settle(&self, center: geo::Coord) {
        let _ = self
            .events
            .send(ConsoleCommand::Event(SurfaceEvent::ViewSettled(center)));
    }
}

fn describe(feature: &Feature) -> String {
    let id = feature
        .id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let kind = match &feature.geometry {
        None => "Null",
        Some(geo::Geometry::Polygon(_)) => "Polygon",
        Some(geo::Geometry::MultiPolygon(_)) => "MultiPolygon",
        Some(geo::Geometry::Point(_)) => "Point",
        Some(geo::Geometry::MultiPoint(_)) => "MultiPoint",
        Some(geo::Geometry::LineString(_)) => "LineString",
        Some(geo::Geometry::MultiLineString(_)) => "MultiLineString",
        Some(_) => "Geometry",
    };
    let attributes: Vec<String> = feature
        .attributes
        .iter()
        .filter(|(key, _)| key.as_str() != FEATURE_KEY)
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("[{}] {} {}", id, kind, attributes.join(" "))
}

impl RenderSurface for ConsoleSurface {
    fn render_collection(&mut self, features: &[Feature]) {
        println!("{} features", features.len());
        for feature in features {
            println!("  {}", describe(feature));
        }
    }

    fn highlight(&mut self, feature: &Feature, editable: bool) {
        let mode = if editable { "editing" } else { "selected" };
        println!("{} {}", mode, describe(feature));
        if let Some(bounds) = feature.geometry.as_ref().and_then(|g| g.bounding_rect()) {
            println!(
                "  bounds ({}, {}) - ({}, {})",
                bounds.min().x,
                bounds.min().y,
                bounds.max().x,
                bounds.max().y
            );
        }
    }

    fn clear_highlight(&mut self) {
        println!("selection cleared");
    }

    fn fit_bounds(&mut self, bounds: geo::Rect) {
        println!(
            "view fitted to ({}, {}) - ({}, {})",
            bounds.min().x,
            bounds.min().y,
            bounds.max().x,
            bounds.max().y
        );
        self.settle(bounds.center());
    }

    fn set_view(&mut self, center: geo::Coord, zoom: u8) {
        println!("view centered on {},{} at zoom {}", center.x, center.y, zoom);
        self.settle(center);
    }

    fn show_boundary(&mut self, boundary: &geo::Polygon) {
        println!("boundary with {} points", boundary.exterior().0.len());
    }

    fn show_address(&mut self, text: &str) {
        println!("address: {}", text);
    }

    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::Success(message) => println!("ok: {}", message),
            Notification::Error(message) => eprintln!("error: {}", message),
        }
    }
}
