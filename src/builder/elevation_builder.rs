use crate::config::ElevationConfig;
use crate::elevation::{self, ElevationRaster, Quadrant};
use crate::error::Result;
use crate::identity::{CdbTile, Dataset, GeoCell, MIN_LEVEL};
use crate::ingest::{ElevationSource, ImagerySource};
use crate::tree::TileTree;
use crate::types::Mesh;

/// Build a complete elevation [`TileTree`] for one `(geocell, cs1, cs2)`
/// group, rooted at `level = -10`.
///
/// `candidates` is the set of tile identities to probe the source for --
/// enumerating which files exist on disk is the ingest layer's job, not the
/// builder's. Every candidate the source actually has data for becomes a
/// leaf. Missing ancestors are filled by coarsening the shallowest available
/// descendant upward; missing quadrant siblings and, unless
/// `no_lod_duplication` is set, missing negative-LOD children are filled by
/// synthesizing/duplicating from what's already in the tree wherever the
/// imagery source has co-located data. Returns `None` if no candidate tile
/// had data.
pub fn build_elevation_tree(
    elevation_source: &impl ElevationSource,
    imagery_source: &impl ImagerySource,
    geocell: GeoCell,
    cs1: u32,
    cs2: u32,
    candidates: &[CdbTile],
    config: &ElevationConfig,
) -> Result<Option<TileTree<Mesh>>> {
    let root_tile = CdbTile::new(geocell, Dataset::Elevation, cs1, cs2, MIN_LEVEL, 0, 0)?;
    let mut tree = TileTree::new(root_tile);
    let mut loaded_any = false;
    let mut max_level = MIN_LEVEL;

    for &tile in candidates {
        if tile.geocell() != geocell || tile.dataset() != Dataset::Elevation {
            continue;
        }
        if tile.cs1() != cs1 || tile.cs2() != cs2 {
            continue;
        }
        if let Some(raster) = elevation_source.load(tile)? {
            let mesh = build_and_finalize(tile, &raster);
            tree.insert_tile(tile, mesh)?;
            loaded_any = true;
            max_level = max_level.max(tile.level());
        }
    }

    if !loaded_any {
        return Ok(None);
    }

    fill_missing_ancestors(&mut tree, max_level, config.decimate_error as f32)?;
    fill_missing_quadrant_siblings(&mut tree, imagery_source, max_level)?;
    if !config.no_lod_duplication {
        duplicate_elevation_down_negative_chain(&mut tree, imagery_source)?;
    }
    Ok(Some(tree))
}

fn build_and_finalize(tile: CdbTile, raster: &ElevationRaster) -> Mesh {
    elevation::build_grid_mesh(tile, raster)
}

/// Walk from the deepest native level up to the root, assigning each
/// content-less ancestor a simplified copy of the first content-bearing
/// child found beneath it.
fn fill_missing_ancestors(
    tree: &mut TileTree<Mesh>,
    max_level: i32,
    decimate_error: f32,
) -> Result<()> {
    for level in (MIN_LEVEL + 1..=max_level).rev() {
        let tiles_at_level = tree.tiles_at_level(level);
        for tile in tiles_at_level {
            let Some(idx) = tree.find(tile) else {
                continue;
            };
            let Some(child_mesh) = tree.content(idx) else {
                continue;
            };
            let child_mesh = child_mesh.clone();

            let Some(parent_tile) = tile.parent() else {
                continue;
            };
            let Some(parent_idx) = tree.find(parent_tile) else {
                continue;
            };
            if tree.content(parent_idx).is_some() {
                continue;
            }

            let target_index_count = ((child_mesh.indices.len() / 2).max(6) / 3) * 3;
            let simplified = elevation::simplify(&child_mesh, parent_tile, target_index_count, decimate_error);
            tree.insert_tile(parent_tile, simplified)?;
        }
    }
    Ok(())
}

/// Fill holes in the quadtree: for every tile that carries an unsimplified
/// native grid, check each of its four quadrant children that the tree does
/// not already have a mesh for. If the imagery source has co-located data at
/// that child, the hole is not empty ground -- split the parent's own grid
/// into that quadrant rather than leaving the child untextured and absent.
fn fill_missing_quadrant_siblings(
    tree: &mut TileTree<Mesh>,
    imagery_source: &impl ImagerySource,
    max_level: i32,
) -> Result<()> {
    for level in 0..max_level {
        for parent_tile in tree.tiles_at_level(level) {
            let Some(parent_idx) = tree.find(parent_tile) else {
                continue;
            };
            let Some(parent_mesh) = tree.content(parent_idx) else {
                continue;
            };
            let Some((grid_width, grid_height)) = parent_mesh.native_grid else {
                continue;
            };
            let parent_mesh = parent_mesh.clone();

            for (child_tile, quadrant) in [
                (parent_tile.north_west_child()?, Quadrant::NorthWest),
                (parent_tile.north_east_child()?, Quadrant::NorthEast),
                (parent_tile.south_west_child()?, Quadrant::SouthWest),
                (parent_tile.south_east_child()?, Quadrant::SouthEast),
            ] {
                if tree.find(child_tile).is_some() {
                    continue;
                }
                let Ok(imagery_tile) = child_tile.with_dataset(Dataset::Imagery) else {
                    continue;
                };
                if !matches!(imagery_source.load(imagery_tile), Ok(Some(_))) {
                    continue;
                }
                if let Some(region) =
                    elevation::split_quadrant(&parent_mesh, grid_width, grid_height, quadrant, true)
                {
                    tree.insert_tile(child_tile, region)?;
                }
            }
        }
    }
    Ok(())
}

/// Duplicate a negative-LOD tile's mesh down to its sole child when the
/// child is missing but imagery exists there -- every negative level (and
/// level 0, the quadtree's single-tile root) shares the same bounding
/// region, so the same mesh content is valid at the deeper level unchanged.
/// Stops once it reaches level 0, where quadrant-based filling takes over.
fn duplicate_elevation_down_negative_chain(
    tree: &mut TileTree<Mesh>,
    imagery_source: &impl ImagerySource,
) -> Result<()> {
    let mut tile = tree.tile(tree.root());
    loop {
        if tile.level() >= 0 {
            break;
        }
        let child_tile = tile.negative_child()?;
        if tree.find(child_tile).is_none() {
            if let Some(idx) = tree.find(tile) {
                if let Some(mesh) = tree.content(idx).cloned() {
                    if let Ok(imagery_tile) = child_tile.with_dataset(Dataset::Imagery) {
                        if matches!(imagery_source.load(imagery_tile), Ok(Some(_))) {
                            tree.insert_tile(child_tile, mesh)?;
                        }
                    }
                }
            }
        }
        tile = child_tile;
    }
    Ok(())
}
