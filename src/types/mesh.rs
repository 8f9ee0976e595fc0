use glam::{DVec3, Vec2, Vec3};

/// Which glTF draw mode a mesh's `indices` describe. Elevation and model
/// meshes are always triangles; vector features rasterize as points (a lone
/// coordinate) or lines (everything else, closed or open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    #[default]
    Triangles,
}

/// An axis-aligned bounding box over world-space (ECEF) positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn from_point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn merge(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }
}

/// A triangle mesh in CDB's native split: `positions` are world-space ECEF
/// coordinates (f64, as produced by ellipsoid conversion), `position_rtcs`
/// are the same vertices relative to the tile's center (f32, as written into
/// glTF `CESIUM_RTC`/root-transform payloads). Normals and UVs are optional
/// (empty when not applicable, e.g. a raw elevation grid before simplification).
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<DVec3>,
    pub position_rtcs: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
    pub material_index: Option<usize>,
    pub mode: PrimitiveMode,
    /// The raster `(width, height)` this mesh was sampled from, if it is
    /// still an unsimplified, unsynthesized grid. Cleared by coarsening and
    /// by anything that isn't a plain elevation grid; quadrant synthesis
    /// requires it to locate even cell boundaries.
    pub native_grid: Option<(usize, usize)>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn has_normals(&self) -> bool {
        !self.normals.is_empty()
    }

    pub fn has_uvs(&self) -> bool {
        !self.uvs.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn aabb(&self) -> Option<Aabb> {
        let mut iter = self.positions.iter();
        let first = *iter.next()?;
        let mut aabb = Aabb::from_point(first);
        for &p in iter {
            aabb.merge(p);
        }
        Some(aabb)
    }

    /// Recompute `position_rtcs` as `positions - center`, where `center` is
    /// the AABB center. A no-op on an empty mesh.
    pub fn compute_rtc(&mut self) {
        let Some(aabb) = self.aabb() else {
            return;
        };
        let center = aabb.center();
        self.position_rtcs = self
            .positions
            .iter()
            .map(|p| (*p - center).as_vec3())
            .collect();
    }
}
