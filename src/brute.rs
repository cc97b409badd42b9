use crate::geo::euclidean;
use crate::locations::Locations;

/// Linear scan over every location. Fills `found` with all locations at the
/// minimal distance and returns it, `+inf` if there are none.
///
/// Reference answer for the k-d tree: distances are computed with the same
/// argument order so both sides compare bit-identical values.
pub fn nearest_iterative(locations: &Locations, lon: f64, lat: f64, found: &mut Vec<usize>) -> f64 {
    found.clear();
    let mut best = f64::INFINITY;
    for (loc, p) in locations.points().iter().enumerate() {
        let d = euclidean(lon, lat, p[0], p[1]);
        if d < best {
            best = d;
            found.clear();
            found.push(loc);
        } else if d == best {
            found.push(loc);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_closest_location() {
        let locations = Locations::from_points([(0, 0.0, 0.0), (1, 3.0, 4.0), (2, 1.0, 1.0)]);
        let mut found = Vec::new();
        assert_eq!(nearest_iterative(&locations, 3.0, 4.0, &mut found), 0.0);
        assert_eq!(found, vec![1]);
        let d = nearest_iterative(&locations, 0.9, 0.9, &mut found);
        assert!((d - 0.02f64.sqrt()).abs() < 1e-12);
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn keeps_every_tied_location() {
        let locations = Locations::from_points([(0, -1.0, 0.0), (1, 1.0, 0.0), (2, 0.0, 1.0), (3, 0.0, 3.0)]);
        let mut found = vec![42];
        assert_eq!(nearest_iterative(&locations, 0.0, 0.0, &mut found), 1.0);
        assert_eq!(found, vec![0, 1, 2]);
    }

    #[test]
    fn empty_set_is_infinitely_far() {
        let mut found = vec![1, 2];
        assert_eq!(nearest_iterative(&Locations::default(), 0.0, 0.0, &mut found), f64::INFINITY);
        assert!(found.is_empty());
    }
}
