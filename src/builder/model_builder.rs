use std::collections::HashMap;

use crate::error::Result;
use crate::identity::{CdbTile, Dataset, GeoCell, MIN_LEVEL};
use crate::ingest::{ModelInstance, ModelSource};
use crate::tree::TileTree;
use crate::types::Mesh;

/// Build a model [`TileTree`] (GSModel/GTModel/MModel) for one
/// `(geocell, dataset, cs1, cs2)` group. Unlike elevation, CDB model tiles
/// are discrete placements rather than a continuous surface, so there is no
/// coarsening step -- every candidate the source has data for becomes a leaf,
/// and intermediate levels are structural only (they may carry no content of
/// their own).
pub fn build_model_tree(
    source: &impl ModelSource,
    geocell: GeoCell,
    dataset: Dataset,
    cs1: u32,
    cs2: u32,
    candidates: &[CdbTile],
) -> Result<Option<TileTree<Mesh>>> {
    let root_tile = CdbTile::new(geocell, dataset, cs1, cs2, MIN_LEVEL, 0, 0)?;
    let mut tree = TileTree::new(root_tile);
    let mut loaded_any = false;

    for &tile in candidates {
        if tile.geocell() != geocell || tile.dataset() != dataset {
            continue;
        }
        if tile.cs1() != cs1 || tile.cs2() != cs2 {
            continue;
        }
        if let Some(mesh) = source.load(tile)? {
            tree.insert_tile(tile, mesh)?;
            loaded_any = true;
        }
    }

    Ok(if loaded_any { Some(tree) } else { None })
}

/// A GTModel tile's instance placements, grouped by shared-geometry key so
/// the pipeline can emit one instanced payload per group and composite them
/// into a single container per tile.
#[derive(Debug, Clone, Default)]
pub struct GtModelTile {
    pub groups: Vec<GtInstanceGroup>,
}

/// One FACC+MODL+FSC group within a GTModel tile: the shared geometry (loaded
/// once per key across the whole build) plus this tile's placements of it.
#[derive(Debug, Clone)]
pub struct GtInstanceGroup {
    pub facc: String,
    pub modl: String,
    pub fsc: String,
    pub geometry: Mesh,
    pub instances: Vec<ModelInstance>,
}

/// Build a GTModel [`TileTree`]: unlike [`build_model_tree`], GTModel tiles
/// don't carry their own mesh -- each tile lists instances of shared
/// FACC+MODL+FSC geometry, loaded once and cached across every tile that
/// references it.
pub fn build_gt_model_tree(
    source: &impl ModelSource,
    geocell: GeoCell,
    cs1: u32,
    cs2: u32,
    candidates: &[CdbTile],
) -> Result<Option<TileTree<GtModelTile>>> {
    let root_tile = CdbTile::new(geocell, Dataset::GTModel, cs1, cs2, MIN_LEVEL, 0, 0)?;
    let mut tree = TileTree::new(root_tile);
    let mut geometry_cache: HashMap<(String, String, String), Mesh> = HashMap::new();
    let mut loaded_any = false;

    for &tile in candidates {
        if tile.geocell() != geocell || tile.dataset() != Dataset::GTModel {
            continue;
        }
        if tile.cs1() != cs1 || tile.cs2() != cs2 {
            continue;
        }
        let Some(instances) = source.load_instances(tile)? else {
            continue;
        };
        if instances.is_empty() {
            continue;
        }

        let mut by_key: HashMap<(String, String, String), Vec<ModelInstance>> = HashMap::new();
        for instance in instances {
            let key = (instance.facc.clone(), instance.modl.clone(), instance.fsc.clone());
            by_key.entry(key).or_default().push(instance);
        }

        let mut groups = Vec::new();
        for ((facc, modl, fsc), instances) in by_key {
            let key = (facc.clone(), modl.clone(), fsc.clone());
            let geometry = match geometry_cache.get(&key) {
                Some(mesh) => mesh.clone(),
                None => {
                    let Some(mesh) = source.load_model_geometry(&facc, &modl, &fsc)? else {
                        continue;
                    };
                    geometry_cache.insert(key, mesh.clone());
                    mesh
                }
            };
            groups.push(GtInstanceGroup { facc, modl, fsc, geometry, instances });
        }
        if groups.is_empty() {
            continue;
        }

        tree.insert_tile(tile, GtModelTile { groups })?;
        loaded_any = true;
    }

    Ok(if loaded_any { Some(tree) } else { None })
}
