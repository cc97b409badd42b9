use rand::Rng;

const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in meters between two `[lon, lat]` points in degrees.
pub fn haversine_meters(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (phi_a, phi_b) = (a[1].to_radians(), b[1].to_radians());
    let half_dphi = (phi_b - phi_a) / 2.0;
    let half_dlambda = (b[0] - a[0]).to_radians() / 2.0;
    let h = half_dphi.sin().powi(2) + phi_a.cos() * phi_b.cos() * half_dlambda.sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Plain Euclidean distance in coordinate space (degrees).
///
/// Nearest-node search ranks candidates by this, not by great-circle
/// distance: it is what the k-d tree's axis-aligned pruning bound is valid for.
#[inline(always)]
pub fn euclidean(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let dx = ax - bx;
    let dy = ay - by;
    (dx * dx + dy * dy).sqrt()
}

/// Smallest axis-aligned box containing a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// The empty box; extending it with a point yields that point.
    pub fn empty() -> Self {
        Self {
            min_lon: f64::INFINITY,
            min_lat: f64::INFINITY,
            max_lon: f64::NEG_INFINITY,
            max_lat: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_lon > self.max_lon || self.min_lat > self.max_lat
    }

    pub fn extend(&mut self, lon: f64, lat: f64) {
        self.min_lon = self.min_lon.min(lon);
        self.min_lat = self.min_lat.min(lat);
        self.max_lon = self.max_lon.max(lon);
        self.max_lat = self.max_lat.max(lat);
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        (self.min_lon..=self.max_lon).contains(&lon) && (self.min_lat..=self.max_lat).contains(&lat)
    }

    /// Uniformly random (lon, lat) inside the box. `None` for an empty box.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        let lon = self.min_lon + (self.max_lon - self.min_lon) * rng.random::<f64>();
        let lat = self.min_lat + (self.max_lat - self.min_lat) * rng.random::<f64>();
        Some((lon, lat))
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}
