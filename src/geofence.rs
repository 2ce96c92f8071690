//! Geo-fence predicate for harvest coordinates.
//!
//! Zones are circles in plain degrees: squared lat/lon difference against
//! the squared radius, no great-circle math. Species without a configured
//! zone are accepted anywhere on the globe.

use crate::config::GeoZone;

#[derive(Debug, Clone, Default)]
pub struct GeoFenceChecker {
    zones: Vec<GeoZone>,
}

impl GeoFenceChecker {
    pub fn new(zones: Vec<GeoZone>) -> Self {
        Self { zones }
    }

    pub fn is_within_zone(&self, lat: f64, lon: f64, species: &str) -> bool {
        if !is_valid_coordinate(lat, lon) {
            return false;
        }
        let mut zones = self.zones.iter().filter(|z| z.species == species).peekable();
        if zones.peek().is_none() {
            return true;
        }
        zones.any(|zone| {
            let d_lat = lat - zone.center_lat;
            let d_lon = lon - zone.center_lon;
            d_lat * d_lat + d_lon * d_lon <= zone.radius_deg * zone.radius_deg
        })
    }
}

fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> GeoFenceChecker {
        GeoFenceChecker::new(vec![GeoZone {
            species: "Neem".into(),
            center_lat: 30.0,
            center_lon: 78.0,
            radius_deg: 2.0,
        }])
    }

    #[test]
    fn test_boundary_radius_passes() {
        let c = checker();
        assert!(c.is_within_zone(32.0, 78.0, "Neem"));
        assert!(c.is_within_zone(30.0, 76.0, "Neem"));
        assert!(!c.is_within_zone(33.0, 78.0, "Neem"));
        assert!(!c.is_within_zone(30.0, 75.0, "Neem"));
    }

    #[test]
    fn test_unzoned_species_accepted_anywhere() {
        let c = checker();
        assert!(c.is_within_zone(-45.0, 170.0, "Tulsi"));
    }

    #[test]
    fn test_out_of_range_always_rejected() {
        let c = checker();
        for species in ["Neem", "Tulsi"] {
            assert!(!c.is_within_zone(91.0, 78.0, species));
            assert!(!c.is_within_zone(30.0, 181.0, species));
            assert!(!c.is_within_zone(-90.5, 0.0, species));
            assert!(!c.is_within_zone(f64::NAN, 0.0, species));
        }
        assert!(c.is_within_zone(90.0, 180.0, "Tulsi"));
    }

    #[test]
    fn test_default_neem_zone() {
        let c = GeoFenceChecker::new(crate::config::GeoConfig::default().zones);
        assert!(c.is_within_zone(30.268804, 77.993259, "Neem"));
        assert!(c.is_within_zone(30.5, 78.2, "Neem"));
        assert!(!c.is_within_zone(28.47, 77.50, "Neem"));
    }
}
