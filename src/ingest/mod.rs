//! Source traits for the four raw CDB content kinds this crate tiles:
//! elevation rasters, imagery rasters, vector features, and discrete models.
//!
//! Real CDB archives carry these as GeoTIFF, JPEG2000/NITF, Shapefile/DBF,
//! and OpenFlight respectively -- none of which has a usable pure-Rust crate
//! in this ecosystem. The builder (Component F) only depends on these
//! traits, so its tiling/clamping/LOD logic is fully exercised by tests
//! against [`FilesystemSource`]'s plain stub formats without needing real
//! format bindings.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::elevation::ElevationRaster;
use crate::error::{CdbError, Result};
use crate::identity::CdbTile;
use crate::types::{FeatureAttributes, Mesh};

/// Supplies an elevation tile's height raster, if present.
pub trait ElevationSource {
    fn load(&self, tile: CdbTile) -> Result<Option<ElevationRaster>>;
}

/// Supplies an imagery tile's decoded RGBA texture, if present.
pub trait ImagerySource {
    fn load(&self, tile: CdbTile) -> Result<Option<image::RgbaImage>>;
}

/// One vector feature: a point, line string, or polygon ring in geodetic
/// (lon, lat, height) coordinates plus its attribute table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorFeature {
    pub points: Vec<(f64, f64, f64)>,
    pub closed: bool,
    #[serde(skip, default)]
    pub attributes: FeatureAttributes,
}

/// Supplies a vector tile's features, if present.
pub trait VectorSource {
    fn load(&self, tile: CdbTile) -> Result<Option<Vec<VectorFeature>>>;
}

/// Supplies a model tile's geometry, if present.
pub trait ModelSource {
    fn load(&self, tile: CdbTile) -> Result<Option<Mesh>>;

    /// GTModel only: per-tile instance placements, each referencing a
    /// shared-geometry key rather than carrying its own mesh.
    fn load_instances(&self, _tile: CdbTile) -> Result<Option<Vec<ModelInstance>>> {
        Ok(None)
    }

    /// GTModel only: the shared component geometry for one FACC+MODL+FSC
    /// key, read and converted once regardless of how many tiles reference it.
    fn load_model_geometry(&self, _facc: &str, _modl: &str, _fsc: &str) -> Result<Option<Mesh>> {
        Ok(None)
    }
}

/// A single GTModel placement: a reference to a shared-geometry key plus the
/// world-frame placement (geodetic position, yaw/pitch/roll, uniform scale)
/// at which that geometry is instanced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInstance {
    pub facc: String,
    pub modl: String,
    pub fsc: String,
    /// (lon_deg, lat_deg, elevation_m)
    pub position: (f64, f64, f64),
    /// (yaw_deg, pitch_deg, roll_deg), applied about the instance's local ENU frame
    pub orientation: (f64, f64, f64),
    pub scale: f64,
}

/// A filesystem-rooted implementation of all four source traits, reading
/// fixed, simple on-disk formats keyed by the tile's relative path. Used by
/// tests and as the default backing store until real format decoders are
/// wired in.
pub struct FilesystemSource {
    root: PathBuf,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_with_extension(&self, tile: CdbTile, extension: &str) -> PathBuf {
        self.root.join(tile.relative_path()).with_extension(extension)
    }
}

/// `[width: u32 LE][height: u32 LE][height_0: f64 LE]...[height_{w*h-1}: f64 LE]`
impl ElevationSource for FilesystemSource {
    fn load(&self, tile: CdbTile) -> Result<Option<ElevationRaster>> {
        let path = self.path_with_extension(tile, "elev");
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        if bytes.len() < 8 {
            return Err(CdbError::ParseFailure(format!(
                "{}: elevation raster too short for header",
                path.display()
            )));
        }
        let width = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let height = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let expected_len = 8 + width * height * 8;
        if bytes.len() != expected_len {
            return Err(CdbError::ParseFailure(format!(
                "{}: expected {expected_len} bytes for {width}x{height} raster, got {}",
                path.display(),
                bytes.len()
            )));
        }
        let heights = bytes[8..]
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Ok(Some(ElevationRaster {
            width,
            height,
            heights,
        }))
    }
}

impl ImagerySource for FilesystemSource {
    fn load(&self, tile: CdbTile) -> Result<Option<image::RgbaImage>> {
        for extension in ["png", "jpg", "jpeg"] {
            let path = self.path_with_extension(tile, extension);
            if path.exists() {
                let image = image::open(&path)
                    .map_err(|e| CdbError::ParseFailure(format!("{}: {e}", path.display())))?;
                return Ok(Some(image.to_rgba8()));
            }
        }
        Ok(None)
    }
}

impl VectorSource for FilesystemSource {
    fn load(&self, tile: CdbTile) -> Result<Option<Vec<VectorFeature>>> {
        let path = self.path_with_extension(tile, "vec.json");
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        let features: Vec<VectorFeature> = serde_json::from_slice(&bytes)
            .map_err(|e| CdbError::ParseFailure(format!("{}: {e}", path.display())))?;
        Ok(Some(features))
    }
}

impl ModelSource for FilesystemSource {
    fn load(&self, tile: CdbTile) -> Result<Option<Mesh>> {
        let path = self.path_with_extension(tile, "glb");
        if !path.exists() {
            return Ok(None);
        }
        load_merged_mesh(&path).map(Some)
    }

    fn load_instances(&self, tile: CdbTile) -> Result<Option<Vec<ModelInstance>>> {
        let path = self.path_with_extension(tile, "inst.json");
        let Some(bytes) = read_optional(&path)? else {
            return Ok(None);
        };
        let instances: Vec<ModelInstance> = serde_json::from_slice(&bytes)
            .map_err(|e| CdbError::ParseFailure(format!("{}: {e}", path.display())))?;
        Ok(Some(instances))
    }

    fn load_model_geometry(&self, facc: &str, modl: &str, fsc: &str) -> Result<Option<Mesh>> {
        let path = self
            .root
            .join("GTModelLibrary")
            .join(format!("{facc}_{modl}_{fsc}.glb"));
        if !path.exists() {
            return Ok(None);
        }
        load_merged_mesh(&path).map(Some)
    }
}

/// Parse a glTF/GLB document's scene graph and merge every primitive into
/// one [`Mesh`], applying each node's accumulated world transform to its
/// vertices -- a tile's "archive" of placed parts collapses to one payload.
fn load_merged_mesh(path: &Path) -> Result<Mesh> {
    let (document, buffers, _images) = gltf::import(path)
        .map_err(|e| CdbError::ParseFailure(format!("{}: {e}", path.display())))?;

    let mut mesh = Mesh::default();
    for scene in document.scenes() {
        for node in scene.nodes() {
            walk_gltf_node(&node, glam::DMat4::IDENTITY, &buffers, &mut mesh);
        }
    }
    mesh.compute_rtc();
    Ok(mesh)
}

fn walk_gltf_node(
    node: &gltf::Node,
    parent_transform: glam::DMat4,
    buffers: &[gltf::buffer::Data],
    mesh: &mut Mesh,
) {
    let local_cols = node.transform().matrix().map(|col| col.map(|v| v as f64));
    let world = parent_transform * glam::DMat4::from_cols_array_2d(&local_cols);

    if let Some(gltf_mesh) = node.mesh() {
        for primitive in gltf_mesh.primitives() {
            let reader = primitive.reader(|b| Some(&buffers[b.index()]));
            let base = mesh.positions.len() as u32;
            if let Some(positions) = reader.read_positions() {
                for p in positions {
                    let local = glam::DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64);
                    mesh.positions.push(world.transform_point3(local));
                }
            }
            if let Some(indices) = reader.read_indices() {
                mesh.indices.extend(indices.into_u32().map(|i| i + base));
            }
        }
    }

    for child in node.children() {
        walk_gltf_node(&child, world, buffers, mesh);
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Walk `<root>/Tiles/...` recursively and parse every regular file's name
/// as a tile identity, skipping (and logging) anything that doesn't match
/// the CDB filename grammar -- the traversal itself never fails on a single
/// bad entry, only on an unreadable directory.
pub fn discover_candidates(root: &Path) -> Result<Vec<CdbTile>> {
    let tiles_root = root.join("Tiles");
    let mut candidates = Vec::new();
    if tiles_root.is_dir() {
        walk_dir(&tiles_root, &mut candidates)?;
    }
    candidates.sort_by_key(|t| {
        (
            t.geocell().latitude_directory_name() + &t.geocell().longitude_directory_name(),
            t.dataset().code(),
            t.cs1(),
            t.cs2(),
            t.level(),
            t.uref(),
            t.rref(),
        )
    });
    candidates.dedup();
    Ok(candidates)
}

fn walk_dir(dir: &Path, out: &mut Vec<CdbTile>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, out)?;
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match CdbTile::from_filename(file_name) {
            Some(tile) => out.push(tile),
            None => tracing::warn!("{}: not a recognised CDB tile filename", path.display()),
        }
    }
    Ok(())
}
