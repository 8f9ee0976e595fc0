//! WGS84 geodetic <-> ECEF conversion and the root transform every tileset
//! places at its GeoCell origin.
//!
//! CDB content is already geodetic WGS84 -- there is no unit scaling, axis
//! convention, or CRS reprojection to do here, unlike an arbitrary mesh
//! ingestion pipeline. The only job left is placing each geocell's tileset at
//! its ECEF origin with a local East-North-Up frame.

pub mod ecef;

use ecef::{build_root_transform, enu_rotation_matrix, geodetic_to_ecef};

use crate::identity::GeoCell;

/// The root transform for a geocell's tileset: ECEF origin at the geocell's
/// south-west corner, oriented to local East-North-Up.
pub fn geocell_root_transform(geocell: GeoCell) -> [f64; 16] {
    let lon = geocell.longitude() as f64;
    let lat = geocell.latitude() as f64;
    let ecef = geodetic_to_ecef(lon, lat, 0.0);
    let enu = enu_rotation_matrix(lon, lat);
    build_root_transform(ecef, enu)
}
