//! `tileset.json` serialization: recursive tile tree to JSON, plus the
//! top-level combination of several `(CS_1, CS_2)` tilesets into one root.

use serde_json::{json, Value};

use crate::identity::{BoundingRegion, CdbTile};
use crate::tree::{Index, TileTree};

/// Root geometric error upstream CDB tilesets are rooted at; halved once per
/// tree level on the way to the leaves.
pub const ROOT_GEOMETRIC_ERROR: f32 = 300_000.0;

/// Parameters for the `3DTILES_implicit_tiling` / `3DTILES_multiple_contents`
/// child node emitted at a tileset's deepest explicit tile.
pub struct ImplicitConfig {
    pub subtree_levels: u32,
    pub max_level: i32,
}

fn region_json(region: BoundingRegion) -> Value {
    json!({
        "region": [
            region.west,
            region.south,
            region.east,
            region.north,
            region.min_height,
            region.max_height,
        ]
    })
}

/// Build one tile's JSON node (and recursively its children), mirroring the
/// upstream `convertTilesetToJson` tree walk.
fn tile_json<T>(
    tree: &TileTree<T>,
    idx: Index,
    geometric_error: f32,
    content_uri: &impl Fn(CdbTile) -> Option<String>,
    implicit: Option<&ImplicitConfig>,
) -> Value {
    let tile = tree.tile(idx);
    let mut node = json!({
        "boundingVolume": region_json(tile.bounding_region()),
        "geometricError": geometric_error,
    });

    if let Some(uri) = content_uri(tile) {
        node["content"] = json!({ "uri": uri });
    }

    let children: Vec<Index> = tree.children(idx).collect();
    if children.is_empty() {
        match implicit {
            Some(cfg) => {
                node["children"] = json!([implicit_child_json(tile, geometric_error, cfg)]);
            }
            None => {
                node["geometricError"] = json!(0.0);
            }
        }
    } else {
        let child_error = geometric_error / 2.0;
        let child_nodes: Vec<Value> = children
            .into_iter()
            .map(|c| tile_json(tree, c, child_error, content_uri, implicit))
            .collect();
        node["children"] = Value::Array(child_nodes);
    }

    node
}

/// The implicit-quadtree child object a terminal explicit tile expands into:
/// `3DTILES_implicit_tiling` for the subtree reference, `3DTILES_multiple_contents`
/// for the per-tile b3dm URI template (`{y}` <- UREF, `{x}` <- RREF, per the
/// upstream URI convention).
fn implicit_child_json(tile: CdbTile, geometric_error: f32, cfg: &ImplicitConfig) -> Value {
    let dataset_code = tile.dataset().code();
    let content_uri_template = format!(
        "{}_D{:03}_S001_T001_L{{level}}_U{{y}}_R{{x}}.b3dm",
        tile.geocell().latitude_directory_name() + &tile.geocell().longitude_directory_name(),
        dataset_code,
    );

    json!({
        "geometricError": geometric_error / 2.0,
        "boundingVolume": region_json(tile.bounding_region()),
        "extensions": {
            "3DTILES_implicit_tiling": {
                "subdivisionScheme": "QUADTREE",
                "subtreeLevels": cfg.subtree_levels,
                "maximumLevel": cfg.max_level,
                "subtrees": { "uri": "../subtrees/{level}_{x}_{y}.subtree" },
            },
            "3DTILES_multiple_contents": {
                "content": [{ "uri": content_uri_template }],
            },
        },
    })
}

/// Serialize a complete tileset rooted at `tree`'s root.
///
/// `content_uri` maps a tile to its container file's relative URI (`None`
/// for structural tiles with no payload of their own). `implicit` enables
/// the 3D-Tiles-Next extensions at the tree's deepest explicit tiles.
pub fn write_tileset_json<T>(
    tree: &TileTree<T>,
    replace: bool,
    content_uri: impl Fn(CdbTile) -> Option<String>,
    implicit: Option<ImplicitConfig>,
) -> Value {
    let mut root_node = tile_json(
        tree,
        tree.root(),
        ROOT_GEOMETRIC_ERROR,
        &content_uri,
        implicit.as_ref(),
    );
    root_node["refine"] = json!(if replace { "REPLACE" } else { "ADD" });

    let mut tileset = json!({
        "asset": { "version": "1.0" },
        "geometricError": root_node["geometricError"].clone(),
    });

    if implicit.is_some() {
        tileset["extensionsUsed"] = json!(["3DTILES_implicit_tiling", "3DTILES_multiple_contents"]);
        tileset["extensionsRequired"] = json!(["3DTILES_implicit_tiling", "3DTILES_multiple_contents"]);
    }
    tileset["root"] = root_node;
    tileset
}

/// Combine several already-written tileset manifests into one root tileset
/// that `ADD`-refines in all of them, unioning their bounding regions.
pub fn combine_tileset_json(children: &[(String, BoundingRegion)]) -> Value {
    let mut root_region = children.first().map(|(_, r)| *r).unwrap_or(BoundingRegion {
        west: 0.0,
        south: 0.0,
        east: 0.0,
        north: 0.0,
        min_height: 0.0,
        max_height: 0.0,
    });

    let root_children: Vec<Value> = children
        .iter()
        .map(|(uri, region)| {
            root_region = union_region(root_region, *region);
            json!({
                "geometricError": ROOT_GEOMETRIC_ERROR,
                "content": { "uri": uri },
                "boundingVolume": region_json(*region),
            })
        })
        .collect();

    json!({
        "asset": { "version": "1.0" },
        "geometricError": ROOT_GEOMETRIC_ERROR,
        "root": {
            "refine": "ADD",
            "geometricError": ROOT_GEOMETRIC_ERROR,
            "boundingVolume": region_json(root_region),
            "children": root_children,
        },
    })
}

fn union_region(a: BoundingRegion, b: BoundingRegion) -> BoundingRegion {
    BoundingRegion {
        west: a.west.min(b.west),
        south: a.south.min(b.south),
        east: a.east.max(b.east),
        north: a.north.max(b.north),
        min_height: a.min_height.min(b.min_height),
        max_height: a.max_height.max(b.max_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Dataset, GeoCell, MIN_LEVEL};

    fn root_tile() -> CdbTile {
        let geocell = GeoCell::new(32, -118).unwrap();
        CdbTile::new(geocell, Dataset::Elevation, 1, 1, MIN_LEVEL, 0, 0).unwrap()
    }

    #[test]
    fn single_node_tileset_has_asset_and_root() {
        let mut tree = TileTree::new(root_tile());
        tree.insert_tile(root_tile(), ()).unwrap();
        let json = write_tileset_json(&tree, true, |_| None, None);
        assert_eq!(json["asset"]["version"], "1.0");
        assert_eq!(json["root"]["refine"], "REPLACE");
    }

    #[test]
    fn leaf_without_implicit_config_gets_zero_geometric_error() {
        let mut tree = TileTree::new(root_tile());
        tree.insert_tile(root_tile(), ()).unwrap();
        let json = write_tileset_json(&tree, false, |_| None, None);
        assert_eq!(json["root"]["geometricError"], 0.0);
        assert_eq!(json["root"]["refine"], "ADD");
    }

    #[test]
    fn content_uri_closure_populates_content_field() {
        let mut tree = TileTree::new(root_tile());
        tree.insert_tile(root_tile(), ()).unwrap();
        let json = write_tileset_json(&tree, true, |t| Some(format!("{}.b3dm", t.filename(false))), None);
        assert!(json["root"]["content"]["uri"].as_str().unwrap().ends_with(".b3dm"));
    }

    #[test]
    fn implicit_leaf_declares_both_extensions_used() {
        let mut tree = TileTree::new(root_tile());
        tree.insert_tile(root_tile(), ()).unwrap();
        let cfg = ImplicitConfig {
            subtree_levels: 7,
            max_level: 10,
        };
        let json = write_tileset_json(&tree, true, |_| None, Some(cfg));
        let used = json["extensionsUsed"].as_array().unwrap();
        assert!(used.iter().any(|v| v == "3DTILES_implicit_tiling"));
        assert!(used.iter().any(|v| v == "3DTILES_multiple_contents"));
        let implicit_child = &json["root"]["children"][0];
        assert!(implicit_child["extensions"]["3DTILES_implicit_tiling"].is_object());
    }

    #[test]
    fn multi_level_tree_halves_geometric_error_per_level() {
        let mut tree = TileTree::new(root_tile());
        tree.insert_tile(root_tile(), ()).unwrap();
        let mut chain_tile = root_tile();
        for _ in 0..9 {
            chain_tile = chain_tile.negative_child().unwrap();
        }
        tree.insert_tile(chain_tile, ()).unwrap();
        let json = write_tileset_json(&tree, true, |_| None, None);

        let mut node = &json["root"];
        let mut error = ROOT_GEOMETRIC_ERROR;
        assert_eq!(node["geometricError"], error);
        for _ in 0..9 {
            node = &node["children"][0];
            error /= 2.0;
            assert!((node["geometricError"].as_f64().unwrap() - error as f64).abs() < 1e-3);
        }
    }

    #[test]
    fn combine_unions_bounding_regions() {
        let a_region = BoundingRegion {
            west: -1.0,
            south: -1.0,
            east: 0.0,
            north: 0.0,
            min_height: 0.0,
            max_height: 10.0,
        };
        let b_region = BoundingRegion {
            west: 0.0,
            south: 0.0,
            east: 1.0,
            north: 1.0,
            min_height: -5.0,
            max_height: 5.0,
        };
        let json = combine_tileset_json(&[
            ("a/tileset.json".to_string(), a_region),
            ("b/tileset.json".to_string(), b_region),
        ]);
        let region = json["root"]["boundingVolume"]["region"].as_array().unwrap();
        assert_eq!(region[0].as_f64().unwrap(), -1.0);
        assert_eq!(region[2].as_f64().unwrap(), 1.0);
        assert_eq!(region[5].as_f64().unwrap(), 10.0);
        assert_eq!(json["root"]["children"].as_array().unwrap().len(), 2);
    }
}
