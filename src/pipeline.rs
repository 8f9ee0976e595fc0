use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use glam::DVec3;
use tracing::{debug, info, warn};

use crate::availability::Availability;
use crate::builder::{
    build_batch_table_json, build_elevation_tree, build_feature_mesh, build_gt_model_tree,
    build_model_tree, build_vector_tree, GtModelTile,
};
use crate::config::Config;
use crate::container::{self, BatchTable, FeatureTable, GlbTexture};
use crate::elevation;
use crate::error::Result;
use crate::identity::{BoundingRegion, CdbTile, Dataset, GeoCell};
use crate::ingest::{self, FilesystemSource, ImagerySource, ModelInstance};
use crate::manifest::{self, ImplicitConfig};
use crate::transform::ecef::geodetic_to_ecef;
use crate::tree::TileTree;
use crate::types::Mesh;

fn is_vector_dataset(dataset: Dataset) -> bool {
    matches!(
        dataset,
        Dataset::GSFeature
            | Dataset::GTFeature
            | Dataset::RoadNetwork
            | Dataset::RailRoadNetwork
            | Dataset::PowerlineNetwork
            | Dataset::HydrographyNetwork
    )
}

/// Summary of a completed pipeline run.
#[derive(Debug, Default)]
pub struct ProcessingResult {
    pub geocell_count: usize,
    pub tileset_count: usize,
    pub duration: Duration,
}

/// One `(geocell, dataset, cs1, cs2)` group's candidate tile identities.
type GroupKey = (GeoCell, Dataset, u32, u32);

/// Pipeline orchestrator -- walks the CDB input, builds a tileset tree per
/// `(geocell, dataset, cs1, cs2)` group, and flushes containers and
/// manifests to the output directory.
pub struct Pipeline;

impl Pipeline {
    pub fn run(config: &Config) -> Result<ProcessingResult> {
        let start = Instant::now();
        info!(input = %config.input.display(), "starting pipeline");

        let candidates = ingest::discover_candidates(&config.input)?;
        let groups = group_candidates(&candidates);

        if config.dry_run {
            print_dry_run_summary(&groups);
            return Ok(ProcessingResult {
                duration: start.elapsed(),
                ..Default::default()
            });
        }

        fs::create_dir_all(&config.output)?;
        let source = FilesystemSource::new(&config.input);

        let mut geocells: Vec<GeoCell> = groups.keys().map(|k| k.0).collect();
        geocells.sort_by_key(|g| (g.latitude(), g.longitude()));
        geocells.dedup();

        // written[dataset_cs_key] -> (manifest relative path, bounding region),
        // keyed the same way `--combine` groups reference datasets.
        let mut written: HashMap<(Dataset, u32, u32), Vec<(String, BoundingRegion)>> = HashMap::new();
        let mut tileset_count = 0usize;

        for geocell in &geocells {
            info!(geocell = %geocell_label(*geocell), "processing geocell");

            // Elevation (code 1) sorts first so its tree is available for
            // clamping point-vector features in this same geocell below.
            let mut keys: Vec<GroupKey> = groups
                .keys()
                .filter(|k| k.0 == *geocell)
                .copied()
                .collect();
            keys.sort_by_key(|k| k.1.code());

            let mut elevation_tree: Option<TileTree<Mesh>> = None;

            for key in keys {
                let (_, dataset, cs1, cs2) = key;
                let candidates = &groups[&key];

                let flushed = if dataset == Dataset::Elevation {
                    let Some(tree) =
                        build_elevation_tree(&source, &source, *geocell, cs1, cs2, candidates, &config.elevation)?
                    else {
                        continue;
                    };
                    let result = flush_mesh_tileset(&tree, dataset, cs1, cs2, config, &source, true);
                    elevation_tree.get_or_insert(tree);
                    result
                } else if dataset == Dataset::GTModel {
                    let Some(tree) = build_gt_model_tree(&source, *geocell, cs1, cs2, candidates)? else {
                        continue;
                    };
                    flush_gt_model_tileset(&tree, cs1, cs2, config)
                } else if matches!(dataset, Dataset::GSModel | Dataset::MModel) {
                    let Some(tree) = build_model_tree(&source, *geocell, dataset, cs1, cs2, candidates)? else {
                        continue;
                    };
                    flush_mesh_tileset(&tree, dataset, cs1, cs2, config, &source, false)
                } else if is_vector_dataset(dataset) {
                    let Some(tree) = build_vector_tree(&source, *geocell, dataset, cs1, cs2, candidates)? else {
                        continue;
                    };
                    flush_vector_tileset(&tree, dataset, cs1, cs2, config, elevation_tree.as_ref())
                } else {
                    debug!(dataset = dataset.name(), "skipping dataset with no tiling path");
                    continue;
                };

                match flushed {
                    Ok((manifest_path, region)) => {
                        tileset_count += 1;
                        written
                            .entry((dataset, cs1, cs2))
                            .or_default()
                            .push((manifest_path, region));
                    }
                    Err(e) => warn!(dataset = dataset.name(), error = %e, "failed to flush tileset"),
                }
            }
        }

        for group in &config.combine {
            combine_group(group, &written, &config.output)?;
        }

        let duration = start.elapsed();
        info!(geocells = geocells.len(), tilesets = tileset_count, elapsed = ?duration, "pipeline complete");
        Ok(ProcessingResult {
            geocell_count: geocells.len(),
            tileset_count,
            duration,
        })
    }
}

fn geocell_label(geocell: GeoCell) -> String {
    format!(
        "{}{}",
        geocell.latitude_directory_name(),
        geocell.longitude_directory_name()
    )
}

fn group_candidates(candidates: &[CdbTile]) -> HashMap<GroupKey, Vec<CdbTile>> {
    let mut groups: HashMap<GroupKey, Vec<CdbTile>> = HashMap::new();
    for &tile in candidates {
        let key = (tile.geocell(), tile.dataset(), tile.cs1(), tile.cs2());
        groups.entry(key).or_default().push(tile);
    }
    groups
}

fn out_group_dir(geocell: GeoCell, dataset: Dataset, cs1: u32, cs2: u32, config: &Config) -> (PathBuf, PathBuf) {
    let group_dir = geocell
        .relative_path()
        .join(dataset.directory_name())
        .join(format!("{cs1}_{cs2}"));
    let out_dir = config.output.join(&group_dir);
    (group_dir, out_dir)
}

/// Write every content-bearing node's b3dm to disk, texturing it with the
/// co-located (or nearest ancestor) imagery when `apply_imagery_texture` is
/// set, mark availability bits, and serialize the `(CS_1, CS_2)` tileset.
fn flush_mesh_tileset(
    tree: &TileTree<Mesh>,
    dataset: Dataset,
    cs1: u32,
    cs2: u32,
    config: &Config,
    source: &FilesystemSource,
    apply_imagery_texture: bool,
) -> Result<(String, BoundingRegion)> {
    let geocell = tree.tile(tree.root()).geocell();
    let (group_dir, out_dir) = out_group_dir(geocell, dataset, cs1, cs2, config);
    fs::create_dir_all(&out_dir)?;

    let mut availability = config
        .use_3d_tiles_next
        .then(|| Availability::new(config.subtree_levels));
    let mut content_uris: HashMap<CdbTile, String> = HashMap::new();
    let mut imagery_cache: HashMap<CdbTile, Option<GlbTexture>> = HashMap::new();

    for idx in tree.indices() {
        let tile = tree.tile(idx);
        let Some(mesh) = tree.content(idx) else {
            continue;
        };

        let (mesh, texture) = if apply_imagery_texture {
            mesh_with_texture(mesh, tile, source, &mut imagery_cache)
        } else {
            (mesh.clone(), None)
        };
        let glb = container::write_glb(&mesh, texture.as_ref(), false);
        let bytes = container::write_b3dm(&glb, &FeatureTable::default(), &BatchTable::default());

        let filename = format!("{}.b3dm", tile.filename(false));
        fs::write(out_dir.join(&filename), &bytes)?;
        content_uris.insert(tile, filename);

        mark_available(availability.as_mut(), tile);
    }

    let replace = dataset == Dataset::Elevation;
    finish_flush(tree, replace, &out_dir, &group_dir, config, availability, |t| {
        content_uris.get(&t).cloned()
    })
}

fn mark_available(availability: Option<&mut Availability>, tile: CdbTile) {
    if let Some(avail) = availability {
        if tile.level() > 0 {
            avail.mark_tile_available(tile.level(), tile.rref(), tile.uref());
        }
    }
}

/// Walk from `tile` up through its ancestors via the co-located imagery
/// dataset, returning the first texture found and the tile it was found at.
/// The parent-imagery cache means each ancestor's imagery is only decoded
/// once no matter how many descendant leaves miss their own co-located tile.
fn find_imagery_texture(
    source: &FilesystemSource,
    tile: CdbTile,
    cache: &mut HashMap<CdbTile, Option<GlbTexture>>,
) -> Option<(GlbTexture, CdbTile)> {
    let mut candidate = Some(tile);
    while let Some(t) = candidate {
        let Ok(imagery_tile) = t.with_dataset(Dataset::Imagery) else {
            return None;
        };
        let texture = cache
            .entry(imagery_tile)
            .or_insert_with(|| load_imagery_texture(source, imagery_tile))
            .clone();
        if let Some(texture) = texture {
            return Some((texture, t));
        }
        candidate = t.parent();
    }
    None
}

fn load_imagery_texture(source: &FilesystemSource, imagery_tile: CdbTile) -> Option<GlbTexture> {
    let rgba = ImagerySource::load(source, imagery_tile).ok()??;
    let mut jpeg = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
        .encode(&rgba, rgba.width(), rgba.height(), image::ExtendedColorType::Rgba8)
        .ok()?;
    Some(GlbTexture {
        data: jpeg,
        mime_type: "image/jpeg",
    })
}

/// Texture `mesh` with whatever imagery covers `tile`. When the nearest
/// imagery is a coarser ancestor's, the mesh's UVs are re-mapped into that
/// ancestor's texture space so the baked material still lines up.
fn mesh_with_texture(
    mesh: &Mesh,
    tile: CdbTile,
    source: &FilesystemSource,
    cache: &mut HashMap<CdbTile, Option<GlbTexture>>,
) -> (Mesh, Option<GlbTexture>) {
    let Some((texture, found_at)) = find_imagery_texture(source, tile, cache) else {
        return (mesh.clone(), None);
    };
    if found_at == tile {
        return (mesh.clone(), Some(texture));
    }
    let Some((grid_width, grid_height)) = mesh.native_grid else {
        return (mesh.clone(), Some(texture));
    };
    let mut remapped = mesh.clone();
    elevation::index_uv_relative_to_parent(&mut remapped, tile, grid_width, grid_height, found_at);
    (remapped, Some(texture))
}

fn flush_vector_tileset(
    tree: &TileTree<Vec<crate::ingest::VectorFeature>>,
    dataset: Dataset,
    cs1: u32,
    cs2: u32,
    config: &Config,
    elevation_tree: Option<&TileTree<Mesh>>,
) -> Result<(String, BoundingRegion)> {
    let geocell = tree.tile(tree.root()).geocell();
    let (group_dir, out_dir) = out_group_dir(geocell, dataset, cs1, cs2, config);
    fs::create_dir_all(&out_dir)?;

    let mut availability = config
        .use_3d_tiles_next
        .then(|| Availability::new(config.subtree_levels));
    let mut content_uris: HashMap<CdbTile, String> = HashMap::new();

    for idx in tree.indices() {
        let tile = tree.tile(idx);
        let Some(features) = tree.content(idx) else {
            continue;
        };
        if features.is_empty() {
            continue;
        }

        let mesh = build_feature_mesh(features, elevation_tree);
        let glb = container::write_glb(&mesh, None, true);
        let batch_table = BatchTable {
            json: build_batch_table_json(features),
            binary: Vec::new(),
        };
        let bytes = container::write_b3dm(&glb, &FeatureTable::default(), &batch_table);

        let filename = format!("{}.b3dm", tile.filename(false));
        fs::write(out_dir.join(&filename), &bytes)?;
        content_uris.insert(tile, filename);

        mark_available(availability.as_mut(), tile);
    }

    finish_flush(tree, false, &out_dir, &group_dir, config, availability, |t| {
        content_uris.get(&t).cloned()
    })
}

/// Composite each GTModel tile's instance groups into one container: a
/// single `i3dm` when only one group placed instances in this tile, else a
/// `cmpt` wrapping one `i3dm` per group. Shared geometry is written once per
/// FACC+MODL+FSC key under `_library/` and every `i3dm` references it by URI.
fn flush_gt_model_tileset(
    tree: &TileTree<GtModelTile>,
    cs1: u32,
    cs2: u32,
    config: &Config,
) -> Result<(String, BoundingRegion)> {
    let geocell = tree.tile(tree.root()).geocell();
    let dataset = Dataset::GTModel;
    let (group_dir, out_dir) = out_group_dir(geocell, dataset, cs1, cs2, config);
    fs::create_dir_all(&out_dir)?;
    let library_dir = out_dir.join("_library");

    let mut availability = config
        .use_3d_tiles_next
        .then(|| Availability::new(config.subtree_levels));
    let mut content_uris: HashMap<CdbTile, String> = HashMap::new();
    let mut emitted_geometry: std::collections::HashSet<(String, String, String)> = Default::default();

    for idx in tree.indices() {
        let tile = tree.tile(idx);
        let Some(payload) = tree.content(idx) else {
            continue;
        };
        if payload.groups.is_empty() {
            continue;
        }

        let mut inner_tiles = Vec::new();
        for group in &payload.groups {
            let key = (group.facc.clone(), group.modl.clone(), group.fsc.clone());
            let library_name = format!("{}_{}_{}.glb", group.facc, group.modl, group.fsc);
            if emitted_geometry.insert(key) {
                fs::create_dir_all(&library_dir)?;
                let glb = container::write_glb(&group.geometry, None, false);
                fs::write(library_dir.join(&library_name), glb)?;
            }

            let rtc_center = group.geometry.aabb().map(|b| b.center()).unwrap_or(DVec3::ZERO);
            let feature_table = instanced_feature_table(&group.instances, rtc_center);
            let uri = format!("_library/{library_name}");
            inner_tiles.push(container::write_i3dm(
                uri.as_bytes(),
                false,
                &feature_table,
                &FeatureTable::default(),
            ));
        }

        let single_group = inner_tiles.len() == 1;
        let bytes = if single_group {
            inner_tiles.remove(0)
        } else {
            container::write_cmpt(&inner_tiles)
        };

        let extension = if single_group { "i3dm" } else { "cmpt" };
        let filename = format!("{}.{extension}", tile.filename(false));
        fs::write(out_dir.join(&filename), &bytes)?;
        content_uris.insert(tile, filename);

        mark_available(availability.as_mut(), tile);
    }

    finish_flush(tree, false, &out_dir, &group_dir, config, availability, |t| {
        content_uris.get(&t).cloned()
    })
}

/// Pack per-instance positions (relative to `rtc_center`) into an i3dm
/// feature table binary body, per the `POSITION`/`RTC_CENTER` semantics.
fn instanced_feature_table(instances: &[ModelInstance], rtc_center: DVec3) -> FeatureTable {
    let mut binary = Vec::with_capacity(instances.len() * 12);
    for instance in instances {
        let (lon_deg, lat_deg, height) = instance.position;
        let [x, y, z] = geodetic_to_ecef(lon_deg, lat_deg, height);
        let local = DVec3::new(x, y, z) - rtc_center;
        binary.extend_from_slice(&(local.x as f32).to_le_bytes());
        binary.extend_from_slice(&(local.y as f32).to_le_bytes());
        binary.extend_from_slice(&(local.z as f32).to_le_bytes());
    }
    let json = serde_json::json!({
        "INSTANCES_LENGTH": instances.len(),
        "POSITION": { "byteOffset": 0 },
        "RTC_CENTER": [rtc_center.x, rtc_center.y, rtc_center.z],
    })
    .to_string();
    FeatureTable { json, binary }
}

/// Prune `tree` to its level-<=0 nodes: the fixed negative-LOD chain plus the
/// level-0 quadtree root. In implicit-tiling mode the explicit tileset.json
/// must stop descending there and hand off to the `3DTILES_implicit_tiling`
/// extension instead of re-emitting a literal node per deeper level.
fn explicit_tree<T: Clone>(tree: &TileTree<T>) -> TileTree<T> {
    let mut pruned = TileTree::new(tree.tile(tree.root()));
    for idx in tree.indices() {
        let tile = tree.tile(idx);
        if tile.level() > 0 {
            continue;
        }
        if let Some(content) = tree.content(idx) {
            pruned
                .insert_tile(tile, content.clone())
                .expect("level<=0 tiles are always reachable from the pruned tree's root");
        }
    }
    pruned
}

fn finish_flush<T: Clone>(
    tree: &TileTree<T>,
    replace: bool,
    out_dir: &Path,
    group_dir: &Path,
    config: &Config,
    availability: Option<Availability>,
    content_uri: impl Fn(CdbTile) -> Option<String>,
) -> Result<(String, BoundingRegion)> {
    if let Some(avail) = &availability {
        let subtree_dir = out_dir.join("subtrees");
        fs::create_dir_all(&subtree_dir)?;
        for (key, bits) in avail.subtrees() {
            let (level, x, y) = *key;
            let blob = manifest::write_subtree_blob(bits);
            fs::write(subtree_dir.join(format!("{level}_{x}_{y}.subtree")), blob)?;
        }
    }

    let implicit = config.use_3d_tiles_next.then(|| ImplicitConfig {
        subtree_levels: config.subtree_levels,
        max_level: crate::identity::MAX_LEVEL,
    });

    let json = if config.use_3d_tiles_next {
        let pruned = explicit_tree(tree);
        manifest::write_tileset_json(&pruned, replace, content_uri, implicit)
    } else {
        manifest::write_tileset_json(tree, replace, content_uri, implicit)
    };

    let manifest_name = format!("{}.json", tree.tile(tree.root()).geocell_dataset_id());
    let manifest_path = out_dir.join(&manifest_name);
    fs::write(&manifest_path, serde_json::to_vec_pretty(&json)?)?;

    let relative = group_dir.join(&manifest_name);
    Ok((
        relative.to_string_lossy().replace('\\', "/"),
        tree.tile(tree.root()).bounding_region(),
    ))
}

fn combine_group(
    group: &crate::config::CombineGroup,
    written: &HashMap<(Dataset, u32, u32), Vec<(String, BoundingRegion)>>,
    output: &Path,
) -> Result<()> {
    let mut children: Vec<(String, BoundingRegion)> = Vec::new();
    for &(dataset, cs1, cs2) in &group.members {
        match written.get(&(dataset, cs1, cs2)) {
            Some(entries) => children.extend(entries.iter().cloned()),
            None => warn!(
                dataset = dataset.name(),
                cs1, cs2, "combine group references a dataset with no written tilesets"
            ),
        }
    }
    if children.is_empty() {
        return Ok(());
    }

    let json = manifest::combine_tileset_json(&children);
    let name = group
        .members
        .iter()
        .map(|(d, c1, c2)| format!("{}_{c1}_{c2}", d.name()))
        .collect::<Vec<_>>()
        .join("__");
    let path: PathBuf = output.join(format!("{name}.json"));
    fs::write(path, serde_json::to_vec_pretty(&json)?)?;
    Ok(())
}

fn print_dry_run_summary(groups: &HashMap<GroupKey, Vec<CdbTile>>) {
    let mut geocells: Vec<GeoCell> = groups.keys().map(|k| k.0).collect();
    geocells.sort_by_key(|g| (g.latitude(), g.longitude()));
    geocells.dedup();

    let mut by_dataset: HashMap<Dataset, usize> = HashMap::new();
    for (key, tiles) in groups {
        *by_dataset.entry(key.1).or_default() += tiles.len();
    }

    println!("=== Dry Run Summary ===");
    println!("  Geocells: {}", geocells.len());
    println!("  Dataset groups: {}", groups.len());
    let mut datasets: Vec<(Dataset, usize)> = by_dataset.into_iter().collect();
    datasets.sort_by_key(|(d, _)| d.code());
    for (dataset, count) in datasets {
        println!("    {:<20} {count} candidate tiles", dataset.name());
    }
}
