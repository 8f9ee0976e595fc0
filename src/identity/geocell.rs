use std::path::PathBuf;

use crate::error::{CdbError, Result};

/// Per-latitude-zone longitude extent in degrees, indexed by zone 0..10.
///
/// Zone 0 covers the equatorial band (|lat| < 50) with 1° longitude cells;
/// zones widen toward the poles as meridians converge.
const LONGITUDE_EXTENT_DEGREES: [i32; 11] = [1, 1, 2, 3, 4, 6, 12, 12, 12, 12, 12];

/// Latitude band upper bounds (exclusive), in degrees, matching the zone table above.
/// Zone index is found by the first band whose bound exceeds `|lat|`.
const ZONE_LATITUDE_BOUNDS: [i32; 11] = [50, 50, 70, 75, 80, 86, 89, 90, 90, 90, 90];

/// A 1°-latitude x variable-longitude cell on the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeoCell {
    latitude: i32,
    longitude: i32,
}

impl GeoCell {
    /// Construct a GeoCell, validating `lat in [-90, 90]` and `lon in [-180, 180]`.
    pub fn new(latitude: i32, longitude: i32) -> Result<Self> {
        if !(-90..=90).contains(&latitude) {
            return Err(CdbError::OutOfRange(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !(-180..=180).contains(&longitude) {
            return Err(CdbError::OutOfRange(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(self) -> i32 {
        self.latitude
    }

    pub fn longitude(self) -> i32 {
        self.longitude
    }

    /// The zone index 0..10 the cell's latitude falls into (symmetric about the equator).
    pub fn zone(self) -> usize {
        zone_from_latitude(self.latitude)
    }

    /// Longitude extent in degrees for this cell's zone.
    pub fn lon_extent_degrees(self) -> i32 {
        LONGITUDE_EXTENT_DEGREES[self.zone()]
    }

    /// Latitude extent in degrees; always 1 for CDB geocells.
    pub fn lat_extent_degrees(self) -> i32 {
        1
    }

    /// Directory name for the latitude component: `N32` / `S32`.
    pub fn latitude_directory_name(self) -> String {
        let (hemisphere, value) = if self.latitude < 0 {
            ('S', -self.latitude)
        } else {
            ('N', self.latitude)
        };
        format!("{hemisphere}{value}")
    }

    /// Directory name for the longitude component: `E118` / `W118` (zero-padded to 3 digits).
    pub fn longitude_directory_name(self) -> String {
        let (hemisphere, value) = if self.longitude < 0 {
            ('W', -self.longitude)
        } else {
            ('E', self.longitude)
        };
        format!("{hemisphere}{value:03}")
    }

    /// `Tiles/<Lat>/<Lon>` relative to the CDB or output root.
    pub fn relative_path(self) -> PathBuf {
        PathBuf::from("Tiles")
            .join(self.latitude_directory_name())
            .join(self.longitude_directory_name())
    }

    /// Parse a latitude directory component such as `N32` or `S04`.
    pub fn parse_latitude(s: &str) -> Option<i32> {
        let mut chars = s.chars();
        let hemisphere = chars.next()?;
        let rest: String = chars.collect();
        let value: i32 = rest.parse().ok()?;
        match hemisphere {
            'N' => Some(value),
            'S' => Some(-value),
            _ => None,
        }
    }

    /// Parse a longitude directory component such as `E118` or `W007`.
    pub fn parse_longitude(s: &str) -> Option<i32> {
        let mut chars = s.chars();
        let hemisphere = chars.next()?;
        let rest: String = chars.collect();
        let value: i32 = rest.parse().ok()?;
        match hemisphere {
            'E' => Some(value),
            'W' => Some(-value),
            _ => None,
        }
    }

    /// Parse `(latitude_component, longitude_component)` directory names into a GeoCell.
    pub fn from_directory_names(lat: &str, lon: &str) -> Result<Self> {
        let latitude = Self::parse_latitude(lat)
            .ok_or_else(|| CdbError::ParseFailure(format!("invalid latitude directory '{lat}'")))?;
        let longitude = Self::parse_longitude(lon)
            .ok_or_else(|| CdbError::ParseFailure(format!("invalid longitude directory '{lon}'")))?;
        Self::new(latitude, longitude)
    }
}

/// Free function mirroring the upstream zone lookup: returns 0..10.
pub fn zone_from_latitude(latitude: i32) -> usize {
    let abs_lat = latitude.unsigned_abs() as i32;
    for (zone, &bound) in ZONE_LATITUDE_BOUNDS.iter().enumerate() {
        if abs_lat < bound {
            return zone;
        }
    }
    ZONE_LATITUDE_BOUNDS.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_rejects_out_of_range_latitude() {
        assert!(GeoCell::new(91, 0).is_err());
        assert!(GeoCell::new(-91, 0).is_err());
    }

    #[test]
    fn construct_rejects_out_of_range_longitude() {
        assert!(GeoCell::new(0, 181).is_err());
        assert!(GeoCell::new(0, -181).is_err());
    }

    #[test]
    fn construct_accepts_boundary_values() {
        assert!(GeoCell::new(90, 180).is_ok());
        assert!(GeoCell::new(-90, -180).is_ok());
    }

    #[test]
    fn directory_names_match_spec_examples() {
        let cell = GeoCell::new(32, -118).unwrap();
        assert_eq!(cell.latitude_directory_name(), "N32");
        assert_eq!(cell.longitude_directory_name(), "W118");

        let cell = GeoCell::new(-32, 118).unwrap();
        assert_eq!(cell.latitude_directory_name(), "S32");
        assert_eq!(cell.longitude_directory_name(), "E118");
    }

    #[test]
    fn longitude_is_zero_padded_to_three_digits() {
        let cell = GeoCell::new(0, 7).unwrap();
        assert_eq!(cell.longitude_directory_name(), "E007");
    }

    #[test]
    fn relative_path_is_tiles_lat_lon() {
        let cell = GeoCell::new(32, -118).unwrap();
        assert_eq!(cell.relative_path(), PathBuf::from("Tiles/N32/W118"));
    }

    #[test]
    fn equatorial_zone_has_one_degree_longitude() {
        let cell = GeoCell::new(0, 0).unwrap();
        assert_eq!(cell.zone(), 0);
        assert_eq!(cell.lon_extent_degrees(), 1);
    }

    #[test]
    fn polar_zone_has_twelve_degree_longitude() {
        let cell = GeoCell::new(89, 0).unwrap();
        assert_eq!(cell.lon_extent_degrees(), 12);
    }

    #[test]
    fn zone_is_symmetric_about_equator() {
        assert_eq!(zone_from_latitude(60), zone_from_latitude(-60));
    }

    #[test]
    fn lat_extent_is_always_one_degree() {
        let cell = GeoCell::new(45, 0).unwrap();
        assert_eq!(cell.lat_extent_degrees(), 1);
    }

    #[test]
    fn parse_latitude_hemispheres() {
        assert_eq!(GeoCell::parse_latitude("N32"), Some(32));
        assert_eq!(GeoCell::parse_latitude("S32"), Some(-32));
        assert_eq!(GeoCell::parse_latitude("X32"), None);
        assert_eq!(GeoCell::parse_latitude("Nxx"), None);
    }

    #[test]
    fn parse_longitude_hemispheres() {
        assert_eq!(GeoCell::parse_longitude("E118"), Some(118));
        assert_eq!(GeoCell::parse_longitude("W118"), Some(-118));
        assert_eq!(GeoCell::parse_longitude("Q118"), None);
    }

    #[test]
    fn from_directory_names_round_trips() {
        let cell = GeoCell::new(32, -118).unwrap();
        let parsed =
            GeoCell::from_directory_names(&cell.latitude_directory_name(), &cell.longitude_directory_name())
                .unwrap();
        assert_eq!(parsed, cell);
    }

    #[test]
    fn from_directory_names_rejects_malformed_input() {
        assert!(GeoCell::from_directory_names("bad", "W118").is_err());
        assert!(GeoCell::from_directory_names("N32", "bad").is_err());
    }
}
