//! Elevation dataset handling: turning a raw height grid into a world-space
//! mesh, simplifying it for coarser LODs, and splitting it into the four
//! quadrant sub-regions the next LOD level's children need.

use glam::Vec2;

use crate::identity::CdbTile;
use crate::transform::ecef::geodetic_to_ecef;
use crate::tree::TileTree;
use crate::types::Mesh;

/// A raw elevation raster: `width * height` pixels, row-major, top row first
/// (north), left column first (west). One pixel short of the mesh's vertex
/// grid in each dimension -- the mesh samples `(width+1) * (height+1)`
/// vertices, clamping to the last row/column of pixels at the south/east edge.
#[derive(Debug, Clone)]
pub struct ElevationRaster {
    pub width: usize,
    pub height: usize,
    pub heights: Vec<f64>,
}

impl ElevationRaster {
    pub fn sample(&self, x: usize, y: usize) -> f64 {
        let cx = x.min(self.width - 1);
        let cy = y.min(self.height - 1);
        self.heights[cy * self.width + cx]
    }
}

/// Build the uniform-grid world-space mesh for `tile`'s bounding region,
/// sampling `raster` at `(width+1) x (height+1)` vertices.
pub fn build_grid_mesh(tile: CdbTile, raster: &ElevationRaster) -> Mesh {
    let region = tile.bounding_region();
    let west_deg = region.west.to_degrees();
    let north_deg = region.north.to_degrees();
    let south_deg = region.south.to_degrees();
    let east_deg = region.east.to_degrees();

    let vertices_width = raster.width + 1;
    let vertices_height = raster.height + 1;
    let pixel_lon_deg = (east_deg - west_deg) / raster.width as f64;
    let pixel_lat_deg = (south_deg - north_deg) / raster.height as f64;

    let mut mesh = Mesh {
        positions: Vec::with_capacity(vertices_width * vertices_height),
        uvs: Vec::with_capacity(vertices_width * vertices_height),
        indices: Vec::with_capacity(raster.width * raster.height * 6),
        native_grid: Some((raster.width, raster.height)),
        ..Default::default()
    };

    let inv_width = 1.0 / vertices_width as f32;
    let inv_height = 1.0 / vertices_height as f32;

    for y in 0..vertices_height {
        for x in 0..vertices_width {
            let lon = west_deg + x as f64 * pixel_lon_deg;
            let lat = north_deg + y as f64 * pixel_lat_deg;
            let height = raster.sample(x, y);
            let [px, py, pz] = geodetic_to_ecef(lon, lat, height);
            mesh.positions.push(glam::DVec3::new(px, py, pz));
            mesh.uvs
                .push(Vec2::new(x as f32 * inv_width, y as f32 * inv_height));

            if x < vertices_width - 1 && y < vertices_height - 1 {
                let tl = (y * vertices_width + x) as u32;
                let tr = tl + 1;
                let bl = ((y + 1) * vertices_width + x) as u32;
                let br = bl + 1;
                mesh.indices.extend_from_slice(&[tr, tl, bl, bl, br, tr]);
            }
        }
    }

    mesh.compute_rtc();
    mesh
}

/// Decimate `mesh` to approximately `target_index_count` indices, flipping
/// triangle winding back to face outward (away from the ellipsoid center)
/// where `meshopt_simplify` produced a flipped winding, and compacting out
/// every vertex the simplified index buffer no longer references.
pub fn simplify(mesh: &Mesh, tile: CdbTile, target_index_count: usize, target_error: f32) -> Mesh {
    if mesh.indices.is_empty() {
        return mesh.clone();
    }

    let position_bytes: &[u8] = bytemuck::cast_slice(&mesh.position_rtcs);
    let adapter = meshopt::VertexDataAdapter::new(position_bytes, std::mem::size_of::<glam::Vec3>(), 0)
        .expect("position_rtcs is a tightly packed Vec3 buffer");
    let simplified_indices = meshopt::simplify(
        &mesh.indices,
        &adapter,
        target_index_count,
        target_error,
        meshopt::SimplifyOptions::None,
        None,
    );

    let region = tile.bounding_region();
    let center_lon = (region.west + region.east) / 2.0;
    let center_lat = (region.south + region.north) / 2.0;
    let geodetic_normal = ellipsoid_surface_normal(center_lon, center_lat);

    let mut remap = vec![-1i64; mesh.positions.len()];
    let mut out = Mesh {
        material_index: mesh.material_index,
        ..Default::default()
    };

    let mut push_vertex = |idx: u32, remap: &mut Vec<i64>, out: &mut Mesh| -> u32 {
        let i = idx as usize;
        if remap[i] == -1 {
            out.positions.push(mesh.positions[i]);
            if mesh.has_uvs() {
                out.uvs.push(mesh.uvs[i]);
            }
            remap[i] = (out.positions.len() - 1) as i64;
        }
        remap[i] as u32
    };

    for tri in simplified_indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
        let p0 = mesh.positions[i0 as usize];
        let p1 = mesh.positions[i1 as usize];
        let p2 = mesh.positions[i2 as usize];
        let face_normal = (p1 - p0).cross(p2 - p0);

        let (a, b, c) = if face_normal.dot(geodetic_normal) < 0.0 {
            (i2, i1, i0)
        } else {
            (i0, i1, i2)
        };

        let ra = push_vertex(a, &mut remap, &mut out);
        let rb = push_vertex(b, &mut remap, &mut out);
        let rc = push_vertex(c, &mut remap, &mut out);
        out.indices.extend_from_slice(&[ra, rb, rc]);
    }

    out.compute_rtc();
    out
}

fn ellipsoid_surface_normal(lon_rad: f64, lat_rad: f64) -> glam::DVec3 {
    glam::DVec3::new(
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    )
}

/// Re-map a mesh's UV coordinates onto `parent_tile`'s UV space, so a child
/// tile's grid shares one contiguous texture-space with its ancestor once
/// LODs are merged. No-op if `parent_tile` is not actually an ancestor.
pub fn index_uv_relative_to_parent(
    mesh: &mut Mesh,
    tile: CdbTile,
    grid_width: usize,
    grid_height: usize,
    parent_tile: CdbTile,
) {
    let parent_level = parent_tile.level().max(0);
    if parent_level > tile.level() {
        return;
    }

    let vertices_width = grid_width + 1;
    let vertices_height = grid_height + 1;
    let relative_width = 2f64.powi(tile.level() - parent_level);
    let inv_grid_width = 1.0 / (grid_width as f64 + 1.0);
    let inv_width = 1.0 / relative_width * inv_grid_width;
    let begin_u = tile.rref() as f64 / relative_width;
    let begin_v = (relative_width - tile.uref() as f64 - 1.0) / relative_width;

    mesh.uvs.clear();
    mesh.uvs.reserve(vertices_width * vertices_height);
    for y in 0..vertices_height {
        for x in 0..vertices_width {
            let u = x as f64 * inv_width + begin_u;
            let v = y as f64 * inv_width + begin_v;
            mesh.uvs.push(Vec2::new(u as f32, v as f32));
        }
    }
}

/// One quadrant of a 2x2 split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    NorthWest,
    NorthEast,
    SouthWest,
    SouthEast,
}

/// Split an even-dimensioned grid mesh into the named quadrant, returning
/// `None` if either grid dimension is odd (the grid can't be halved exactly).
pub fn split_quadrant(
    mesh: &Mesh,
    grid_width: usize,
    grid_height: usize,
    quadrant: Quadrant,
    reindex_uv: bool,
) -> Option<Mesh> {
    if grid_width % 2 != 0 || grid_height % 2 != 0 {
        return None;
    }

    let half_w = grid_width / 2;
    let half_h = grid_height / 2;
    let (from_x, from_y) = match quadrant {
        Quadrant::NorthWest => (0, 0),
        Quadrant::NorthEast => (half_w, 0),
        Quadrant::SouthWest => (0, half_h),
        Quadrant::SouthEast => (half_w, half_h),
    };

    Some(extract_sub_region(
        mesh,
        grid_width,
        from_x,
        from_y,
        from_x + half_w,
        from_y + half_h,
        reindex_uv,
    ))
}

fn extract_sub_region(
    mesh: &Mesh,
    grid_width: usize,
    from_x: usize,
    from_y: usize,
    to_x: usize,
    to_y: usize,
    reindex_uv: bool,
) -> Mesh {
    let vertices_width = grid_width + 1;
    let region_vertices_width = to_x - from_x + 1;
    let region_vertices_height = to_y - from_y + 1;

    let mut region = Mesh {
        positions: Vec::with_capacity(region_vertices_width * region_vertices_height),
        uvs: Vec::with_capacity(region_vertices_width * region_vertices_height),
        indices: Vec::with_capacity((region_vertices_width - 1) * (region_vertices_height - 1) * 6),
        material_index: mesh.material_index,
        native_grid: Some((region_vertices_width - 1, region_vertices_height - 1)),
        ..Default::default()
    };

    for y in from_y..=to_y {
        for x in from_x..=to_x {
            let src_idx = y * vertices_width + x;
            region.positions.push(mesh.positions[src_idx]);

            if reindex_uv {
                let u = (x - from_x) as f32 / (region_vertices_width - 1) as f32;
                let v = (y - from_y) as f32 / (region_vertices_height - 1) as f32;
                region.uvs.push(Vec2::new(u, v));
            } else if mesh.has_uvs() {
                region.uvs.push(mesh.uvs[src_idx]);
            }

            if x < to_x && y < to_y {
                let sub_x = (x - from_x) as u32;
                let sub_y = (y - from_y) as u32;
                let w = region_vertices_width as u32;
                region.indices.extend_from_slice(&[
                    sub_y * w + sub_x + 1,
                    sub_y * w + sub_x,
                    (sub_y + 1) * w + sub_x,
                    (sub_y + 1) * w + sub_x,
                    (sub_y + 1) * w + sub_x + 1,
                    sub_y * w + sub_x + 1,
                ]);
            }
        }
    }

    region.compute_rtc();
    region
}

/// Sample the height of the elevation surface under `(lon_deg, lat_deg)`:
/// descend to the deepest tile whose region contains the point, then walk up
/// through parents until one actually carries a mesh, and take the height of
/// its nearest vertex to the query point.
pub fn clamp_point_height(elevation_tree: &TileTree<Mesh>, lon_deg: f64, lat_deg: f64) -> Option<f64> {
    let mut tile = elevation_tree.get_fit_tile(lon_deg.to_radians(), lat_deg.to_radians())?;
    loop {
        if let Some(mesh) = elevation_tree.find(tile).and_then(|idx| elevation_tree.content(idx)) {
            if let Some(height) = nearest_vertex_height(mesh, lon_deg, lat_deg) {
                return Some(height);
            }
        }
        tile = tile.parent()?;
    }
}

fn nearest_vertex_height(mesh: &Mesh, lon_deg: f64, lat_deg: f64) -> Option<f64> {
    if mesh.positions.is_empty() {
        return None;
    }
    let ground = glam::DVec3::from(geodetic_to_ecef(lon_deg, lat_deg, 0.0));
    let nearest = mesh
        .positions
        .iter()
        .min_by(|a, b| a.distance_squared(ground).partial_cmp(&b.distance_squared(ground)).unwrap())?;
    Some(nearest.length() - ground.length())
}
