use crate::geofile::feature::Feature;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Success(String),
    Error(String),
}

/// What the controller needs from a map display: drawing features, framing the view and passing
/// short-lived messages to the user. Vertex editing happens on the surface itself and comes back as
/// `SurfaceEvent::GeometryChanged`.
pub trait RenderSurface {
    /// Redraw the whole collection, dropping whatever was drawn before.
    fn render_collection(&mut self, features: &[Feature]);
    /// Draw `feature` on top of the collection, with vertex editing when `editable`.
    fn highlight(&mut self, feature: &Feature, editable: bool);
    fn clear_highlight(&mut self);
    fn fit_bounds(&mut self, bounds: geo::Rect);
    fn set_view(&mut self, center: geo::Coord, zoom: u8);
    fn show_boundary(&mut self, boundary: &geo::Polygon);
    fn show_address(&mut self, text: &str);
    fn notify(&mut self, notification: Notification);
}
