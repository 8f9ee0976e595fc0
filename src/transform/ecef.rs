/// WGS84 semi-major axis in metres.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 first eccentricity squared: e² = 2f - f²
const WGS84_E2: f64 = 2.0 * WGS84_F - WGS84_F * WGS84_F;

/// Convert geodetic (longitude, latitude, altitude) to ECEF XYZ.
///
/// Inputs are in **degrees** and metres.  Returns `[X, Y, Z]` in metres.
pub fn geodetic_to_ecef(lon_deg: f64, lat_deg: f64, alt_m: f64) -> [f64; 3] {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let sin_lon = lon.sin();
    let cos_lon = lon.cos();

    // Radius of curvature in the prime vertical
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    let x = (n + alt_m) * cos_lat * cos_lon;
    let y = (n + alt_m) * cos_lat * sin_lon;
    let z = (n * (1.0 - WGS84_E2) + alt_m) * sin_lat;

    [x, y, z]
}

/// Build the 4×4 East-North-Up rotation matrix for a given geodetic point.
///
/// Returns a column-major `[f64; 16]` matrix suitable for `tileset.json`
/// `root.transform`.
pub fn enu_rotation_matrix(lon_deg: f64, lat_deg: f64) -> [f64; 16] {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();

    let sin_lon = lon.sin();
    let cos_lon = lon.cos();
    let sin_lat = lat.sin();
    let cos_lat = lat.cos();

    // ENU basis vectors expressed in ECEF:
    //   East  = (-sin_lon,          cos_lon,         0       )
    //   North = (-sin_lat*cos_lon, -sin_lat*sin_lon, cos_lat )
    //   Up    = ( cos_lat*cos_lon,  cos_lat*sin_lon, sin_lat )
    //
    // Column-major 4×4 (translation = 0 here; combined in build_root_transform)
    #[rustfmt::skip]
    let m = [
        // column 0 (East)
        -sin_lon,
        cos_lon,
        0.0,
        0.0,
        // column 1 (North)
        -sin_lat * cos_lon,
        -sin_lat * sin_lon,
        cos_lat,
        0.0,
        // column 2 (Up)
        cos_lat * cos_lon,
        cos_lat * sin_lon,
        sin_lat,
        0.0,
        // column 3 (translation placeholder)
        0.0,
        0.0,
        0.0,
        1.0,
    ];

    m
}

/// Combine an ECEF origin and an ENU rotation into a 4×4 root transform.
///
/// Result is a column-major matrix that places the model at `ecef_origin`
/// with local axes oriented to ENU.
pub fn build_root_transform(ecef_origin: [f64; 3], enu_matrix: [f64; 16]) -> [f64; 16] {
    let mut m = enu_matrix;
    // Set the translation column (column 3, rows 0-2)
    m[12] = ecef_origin[0];
    m[13] = ecef_origin[1];
    m[14] = ecef_origin[2];
    m
}

/// Return the 4×4 identity matrix (column-major).
pub fn identity_transform() -> [f64; 16] {
    #[rustfmt::skip]
    let m = [
        1.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    ];
    m
}
