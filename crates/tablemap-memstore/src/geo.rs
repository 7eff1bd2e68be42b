//! Geo point parsing and distance math for geo predicates and sorters.

/// Mean earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Parse `"lat,lon"`. Whitespace around either number is allowed.
    pub fn parse(s: &str) -> Option<Self> {
        let (lat, lon) = s.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some(Self { lat, lon })
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    pub fn in_bounding_box(&self, top_left: &GeoPoint, bottom_right: &GeoPoint) -> bool {
        self.lat <= top_left.lat
            && self.lat >= bottom_right.lat
            && self.lon >= top_left.lon
            && self.lon <= bottom_right.lon
    }

    /// Ray casting on the plane spanned by lon/lat. Points on an edge may
    /// fall either way.
    pub fn in_polygon(&self, vertices: &[GeoPoint]) -> bool {
        if vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let (a, b) = (&vertices[i], &vertices[j]);
            if (a.lat > self.lat) != (b.lat > self.lat)
                && self.lon < (b.lon - a.lon) * (self.lat - a.lat) / (b.lat - a.lat) + a.lon
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}
