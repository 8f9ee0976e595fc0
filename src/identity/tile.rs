use std::path::PathBuf;

use crate::error::{CdbError, Result};

use super::dataset::Dataset;
use super::geocell::GeoCell;

/// Maximum positive LOD permitted by the CDB spec.
pub const MAX_LEVEL: i32 = 23;
/// Minimum (most negative) LOD permitted by the CDB spec.
pub const MIN_LEVEL: i32 = -10;

/// A geodetic rectangle in radians plus a height range in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub min_height: f64,
    pub max_height: f64,
}

impl BoundingRegion {
    /// Whether a geodetic point (radians) lies within the rectangle.
    pub fn contains(&self, lon_rad: f64, lat_rad: f64) -> bool {
        lon_rad >= self.west && lon_rad <= self.east && lat_rad >= self.south && lat_rad <= self.north
    }

    /// Area of the rectangle in steradian-equivalent lon*lat units (not
    /// solid-angle corrected -- sufficient for the planar partition property
    /// this crate tests, since all sibling tiles share the same latitude band).
    pub fn planar_area(&self) -> f64 {
        (self.east - self.west) * (self.north - self.south)
    }
}

/// The unit of CDB identity: `(GeoCell, Dataset, CS_1, CS_2, Level, UREF, RREF)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CdbTile {
    geocell: GeoCell,
    dataset: Dataset,
    cs1: u32,
    cs2: u32,
    level: i32,
    uref: u32,
    rref: u32,
}

impl CdbTile {
    /// Construct a tile, validating the level/UREF/RREF invariants from the data model.
    pub fn new(
        geocell: GeoCell,
        dataset: Dataset,
        cs1: u32,
        cs2: u32,
        level: i32,
        uref: u32,
        rref: u32,
    ) -> Result<Self> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return Err(CdbError::OutOfRange(format!(
                "level {level} outside [{MIN_LEVEL}, {MAX_LEVEL}]"
            )));
        }
        if level < 0 {
            if uref != 0 || rref != 0 {
                return Err(CdbError::OutOfRange(format!(
                    "negative level {level} requires UREF=RREF=0, got ({uref}, {rref})"
                )));
            }
        } else {
            let bound = 1u32 << level;
            if uref >= bound || rref >= bound {
                return Err(CdbError::OutOfRange(format!(
                    "UREF/RREF ({uref}, {rref}) must be < 2^{level} = {bound}"
                )));
            }
        }

        Ok(Self {
            geocell,
            dataset,
            cs1,
            cs2,
            level,
            uref,
            rref,
        })
    }

    pub fn geocell(self) -> GeoCell {
        self.geocell
    }

    pub fn dataset(self) -> Dataset {
        self.dataset
    }

    pub fn cs1(self) -> u32 {
        self.cs1
    }

    pub fn cs2(self) -> u32 {
        self.cs2
    }

    pub fn level(self) -> i32 {
        self.level
    }

    pub fn uref(self) -> u32 {
        self.uref
    }

    pub fn rref(self) -> u32 {
        self.rref
    }

    /// The same `(geocell, level, UREF, RREF)` address under a different
    /// dataset -- used to look up a co-located counterpart, e.g. the
    /// imagery tile backing an elevation tile's texture.
    pub fn with_dataset(self, dataset: Dataset) -> Result<CdbTile> {
        CdbTile::new(
            self.geocell,
            dataset,
            self.cs1,
            self.cs2,
            self.level,
            self.uref,
            self.rref,
        )
    }

    /// The parent tile, or `None` at the root of the negative-LOD chain (L = -10).
    pub fn parent(self) -> Option<CdbTile> {
        if self.level == MIN_LEVEL {
            return None;
        }
        let parent_level = self.level - 1;
        let (parent_uref, parent_rref) = if self.level > 0 {
            (self.uref / 2, self.rref / 2)
        } else {
            (0, 0)
        };
        CdbTile::new(
            self.geocell,
            self.dataset,
            self.cs1,
            self.cs2,
            parent_level,
            parent_uref,
            parent_rref,
        )
        .ok()
    }

    /// The sole child of a negative-LOD tile. Fails if `self.level >= 0`.
    pub fn negative_child(self) -> Result<CdbTile> {
        if self.level >= 0 {
            return Err(CdbError::PreconditionViolation(format!(
                "negative_child called on non-negative level {}",
                self.level
            )));
        }
        CdbTile::new(
            self.geocell,
            self.dataset,
            self.cs1,
            self.cs2,
            self.level + 1,
            0,
            0,
        )
    }

    fn positive_child(self, delta_uref: u32, delta_rref: u32) -> Result<CdbTile> {
        if self.level < 0 {
            return Err(CdbError::PreconditionViolation(format!(
                "positive-quadrant child called on negative level {}",
                self.level
            )));
        }
        CdbTile::new(
            self.geocell,
            self.dataset,
            self.cs1,
            self.cs2,
            self.level + 1,
            2 * self.uref + delta_uref,
            2 * self.rref + delta_rref,
        )
    }

    /// North-west quadrant child: `(UREF' = 2U+1, RREF' = 2R)`.
    pub fn north_west_child(self) -> Result<CdbTile> {
        self.positive_child(1, 0)
    }

    /// North-east quadrant child: `(UREF' = 2U+1, RREF' = 2R+1)`.
    pub fn north_east_child(self) -> Result<CdbTile> {
        self.positive_child(1, 1)
    }

    /// South-west quadrant child: `(UREF' = 2U, RREF' = 2R)`.
    pub fn south_west_child(self) -> Result<CdbTile> {
        self.positive_child(0, 0)
    }

    /// South-east quadrant child: `(UREF' = 2U, RREF' = 2R+1)`.
    pub fn south_east_child(self) -> Result<CdbTile> {
        self.positive_child(0, 1)
    }

    /// Deterministic bounding region in radians from `(geocell, level, UREF, RREF)`.
    ///
    /// Heights default to `[0, 0]`; the elevation builder overwrites them with
    /// the tile's actual sampled min/max once the raster is read.
    pub fn bounding_region(self) -> BoundingRegion {
        let dist_lod = if self.level >= 0 {
            2f64.powi(-self.level)
        } else {
            1.0
        };

        let lon_extent_deg = self.geocell.lon_extent_degrees() as f64 * dist_lod;
        let lat_extent_deg = self.geocell.lat_extent_degrees() as f64 * dist_lod;

        let west_deg = self.geocell.longitude() as f64 + self.rref as f64 * lon_extent_deg;
        let south_deg = self.geocell.latitude() as f64 + self.uref as f64 * lat_extent_deg;
        let east_deg = west_deg + lon_extent_deg;
        let north_deg = south_deg + lat_extent_deg;

        BoundingRegion {
            west: west_deg.to_radians(),
            south: south_deg.to_radians(),
            east: east_deg.to_radians(),
            north: north_deg.to_radians(),
            min_height: 0.0,
            max_height: 0.0,
        }
    }

    /// The `<NS><lat><WE><lon>_D<ddd>_S<ccc>_T<ccc>` prefix shared by every
    /// tile of this tile's `(geocell, dataset, cs1, cs2)` group, used to name
    /// combined manifests.
    pub fn geocell_dataset_id(self) -> String {
        format!(
            "{}{}_D{:03}_S{:03}_T{:03}",
            self.geocell.latitude_directory_name(),
            self.geocell.longitude_directory_name(),
            self.dataset.code(),
            self.cs1,
            self.cs2
        )
    }

    fn level_token(self, short_level: bool) -> String {
        let (prefix, abs_level) = if self.level < 0 {
            ("LC", -self.level)
        } else {
            ("L", self.level)
        };
        if short_level {
            format!("{prefix}{abs_level}")
        } else {
            format!("{prefix}{abs_level:02}")
        }
    }

    /// `<geocell_dataset_id>_L<ll>_U<u>_R<r>` (or `LC<ll>` for negative levels).
    pub fn filename(self, short_level: bool) -> String {
        format!(
            "{}_{}_U{}_R{}",
            self.geocell_dataset_id(),
            self.level_token(short_level),
            self.uref,
            self.rref
        )
    }

    /// `Tiles/<Lat>/<Lon>/<NNN_Dataset>/<L..|LC>/U<u>/<filename>` (2-digit level).
    pub fn relative_path(self) -> PathBuf {
        self.build_relative_path(false)
    }

    /// Same directory as [`relative_path`](Self::relative_path) but the filename
    /// uses the 1-digit level form some downstream tools depend on.
    pub fn relative_path_short_level(self) -> PathBuf {
        self.build_relative_path(true)
    }

    fn build_relative_path(self, short_level_filename: bool) -> PathBuf {
        self.geocell
            .relative_path()
            .join(self.dataset.directory_name())
            .join(self.level_token(false))
            .join(format!("U{}", self.uref))
            .join(self.filename(short_level_filename))
    }

    /// Parse a CDB tile identity from its canonical filename (without extension).
    /// Returns `None` for any malformed field -- no partial tiles escape.
    pub fn from_filename(name: &str) -> Option<CdbTile> {
        let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() != 7 {
            return None;
        }

        let geocell = parse_geocell_token(parts[0])?;
        let dataset_code: u32 = parts[1].strip_prefix('D')?.parse().ok()?;
        let dataset = Dataset::from_code(dataset_code)?;
        let cs1: u32 = parts[2].strip_prefix('S')?.parse().ok()?;
        let cs2: u32 = parts[3].strip_prefix('T')?.parse().ok()?;

        let level = if let Some(digits) = parts[4].strip_prefix("LC") {
            -digits.parse::<i32>().ok()?
        } else {
            parts[4].strip_prefix('L')?.parse().ok()?
        };

        let uref: u32 = parts[5].strip_prefix('U')?.parse().ok()?;
        let rref: u32 = parts[6].strip_prefix('R')?.parse().ok()?;

        CdbTile::new(geocell, dataset, cs1, cs2, level, uref, rref).ok()
    }
}

/// Parse the concatenated `<NS><lat><WE><lon>` token, e.g. `N32W118`.
fn parse_geocell_token(token: &str) -> Option<GeoCell> {
    let mut chars = token.char_indices();
    let (_, ns) = chars.next()?;
    if ns != 'N' && ns != 'S' {
        return None;
    }

    let lat_start = ns.len_utf8();
    let mut lat_end = lat_start;
    for (idx, c) in token[lat_start..].char_indices() {
        if c.is_ascii_digit() {
            lat_end = lat_start + idx + c.len_utf8();
        } else {
            break;
        }
    }
    if lat_end == lat_start {
        return None;
    }
    let lat_value: i32 = token[lat_start..lat_end].parse().ok()?;
    let latitude = if ns == 'S' { -lat_value } else { lat_value };

    let we = token[lat_end..].chars().next()?;
    if we != 'E' && we != 'W' {
        return None;
    }
    let lon_start = lat_end + we.len_utf8();
    let lon_str = &token[lon_start..];
    if lon_str.is_empty() || !lon_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let lon_value: i32 = lon_str.parse().ok()?;
    let longitude = if we == 'W' { -lon_value } else { lon_value };

    GeoCell::new(latitude, longitude).ok()
}
