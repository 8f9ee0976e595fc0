//! Round-trip scenarios spanning identity, hierarchy, and availability
//! encoding for the CDB-to-3D-Tiles conversion pipeline.

use cdb_to_3dtiles::availability::{morton_index, Availability};
use cdb_to_3dtiles::elevation::{build_grid_mesh, split_quadrant, ElevationRaster, Quadrant};
use cdb_to_3dtiles::identity::{CdbTile, Dataset, GeoCell};
use cdb_to_3dtiles::tree::TileTree;

fn n32w118() -> GeoCell {
    GeoCell::new(32, -118).unwrap()
}

/// Scenario 1: identity round-trip through the canonical filename grammar.
#[test]
fn identity_round_trip_through_filename() {
    let tile = CdbTile::new(n32w118(), Dataset::Elevation, 1, 1, -10, 0, 0).unwrap();
    let filename = tile.filename(false);
    let parsed = CdbTile::from_filename(&filename).expect("filename should parse back");
    assert_eq!(parsed, tile);

    let relative = tile.relative_path();
    assert!(relative.to_string_lossy().contains("N32W118"));
}

/// Scenario 2: quadrant children round-trip -- every child's parent is the
/// tile it was split from, for all four quadrants.
#[test]
fn quadrant_children_round_trip_to_shared_parent() {
    let tile = CdbTile::new(n32w118(), Dataset::Elevation, 1, 1, 2, 2, 2).unwrap();
    let children = [
        tile.north_west_child().unwrap(),
        tile.north_east_child().unwrap(),
        tile.south_west_child().unwrap(),
        tile.south_east_child().unwrap(),
    ];
    for child in children {
        assert_eq!(child.parent().unwrap(), tile);
        assert_eq!(child.level(), tile.level() + 1);
    }
}

/// Scenario 3: a fit-point query finds the single inserted tile by its
/// geodetic center, and returns nothing for the same lon/lat queried against
/// a neighbouring geocell's tree.
#[test]
fn fit_point_query_locates_inserted_tile_by_center() {
    let root = CdbTile::new(n32w118(), Dataset::Elevation, 1, 1, -10, 0, 0).unwrap();
    let mut tree = TileTree::new(root);

    let mut leaf = root;
    while leaf.level() < 0 {
        leaf = leaf.negative_child().unwrap();
    }
    while leaf.level() < 10 {
        leaf = leaf.north_west_child().unwrap();
    }
    tree.insert_tile(leaf, ()).unwrap();

    let region = leaf.bounding_region();
    let mid_lon = (region.west + region.east) / 2.0;
    let mid_lat = (region.south + region.north) / 2.0;
    assert_eq!(tree.get_fit_tile(mid_lon, mid_lat), Some(leaf));

    // The same geodetic point queried against a neighbouring geocell's tree
    // falls outside that tree's root region entirely.
    let neighbour_root =
        CdbTile::new(GeoCell::new(32, -117).unwrap(), Dataset::Elevation, 1, 1, -10, 0, 0).unwrap();
    let neighbour_tree: TileTree<()> = TileTree::new(neighbour_root);
    assert_eq!(neighbour_tree.get_fit_tile(mid_lon, mid_lat), None);
}

/// Scenario 4: hole-filling synthesis -- a missing quadrant child's mesh is
/// synthesized by splitting the parent's grid into quadrant sub-regions, each
/// covering exactly one quarter of the parent's vertex grid.
///
/// `builder::elevation_builder::fill_missing_quadrant_siblings` calls this
/// same primitive from the tree-assembly pass whenever co-located imagery
/// exists for the missing quadrant; this test exercises the primitive in
/// isolation.
#[test]
fn hole_filling_synthesizes_missing_quadrant_from_parent_grid() {
    let parent = CdbTile::new(n32w118(), Dataset::Elevation, 1, 1, 2, 1, 1).unwrap();
    let raster = ElevationRaster {
        width: 4,
        height: 4,
        heights: (0..16).map(|i| i as f64 * 10.0).collect(),
    };
    let parent_mesh = build_grid_mesh(parent, &raster);

    let missing_child_quadrant = Quadrant::SouthEast;
    let synthesized = split_quadrant(&parent_mesh, 4, 4, missing_child_quadrant, true)
        .expect("even grid dimensions split cleanly");

    // Each quadrant covers one quarter of the parent's 4x4 cell grid: a 2x2
    // cell sub-grid, i.e. 3x3 vertices and 2*2*2 triangles.
    assert_eq!(synthesized.vertex_count(), 3 * 3);
    assert_eq!(synthesized.triangle_count(), 2 * 2 * 2);

    // Reindexed UVs span the synthesized tile's own unit square, not the
    // parent's.
    for uv in &synthesized.uvs {
        assert!((0.0..=1.0).contains(&uv.x));
        assert!((0.0..=1.0).contains(&uv.y));
    }
}

/// Scenario 5: elevation-imagery LOD alignment -- a deeper elevation tile's
/// mesh UVs can be re-expressed in a shallower co-located imagery tile's
/// texture space, landing inside that tile's unit square.
#[test]
fn elevation_mesh_uvs_align_with_shallower_imagery_tile() {
    let elevation_tile = CdbTile::new(n32w118(), Dataset::Elevation, 1, 1, 3, 5, 4).unwrap();
    let imagery_tile = elevation_tile.parent().unwrap().parent().unwrap();
    assert!(imagery_tile.level() < elevation_tile.level());

    let raster = ElevationRaster {
        width: 2,
        height: 2,
        heights: vec![0.0; 4],
    };
    let mut mesh = build_grid_mesh(elevation_tile, &raster);
    cdb_to_3dtiles::elevation::index_uv_relative_to_parent(
        &mut mesh,
        elevation_tile,
        2,
        2,
        imagery_tile,
    );

    for uv in &mesh.uvs {
        assert!((0.0..=1.0).contains(&uv.x));
        assert!((0.0..=1.0).contains(&uv.y));
    }
}

/// Scenario 6: availability parent-propagation within a single subtree -- the
/// ancestor chain up to the subtree root is marked, with no child-subtree bit
/// touched since nothing crosses a subtree boundary.
#[test]
fn availability_propagates_within_a_single_subtree() {
    let mut avail = Availability::new(7);
    avail.mark_tile_available(6, 47, 61);

    assert!(avail.is_tile_available(6, 47, 61));
    let mut level = 6;
    let (mut x, mut y) = (47u32, 61u32);
    while level > 0 {
        level -= 1;
        x /= 2;
        y /= 2;
        assert!(
            avail.is_tile_available(level, x, y),
            "ancestor at level {level} should be marked available"
        );
    }

    // Everything fits in the one depth-7 subtree rooted at (0,0,0).
    assert_eq!(avail.subtrees().count(), 1);
}

/// Scenario 7: availability parent-propagation crossing a subtree boundary --
/// the deep tile's own subtree records its node bit, while the subtree above
/// it records a child-subtree availability bit at the matching Morton index,
/// and the chain continues up to the root.
#[test]
fn availability_propagates_across_subtree_boundaries() {
    let mut avail = Availability::new(6);
    avail.mark_tile_available(6, 47, 61);

    // The tile's own subtree is rooted at level 6, and records the tile at
    // local (0, 0) of that subtree.
    assert!(avail.is_tile_available(6, 47, 61));

    // The root subtree (levels 0..6) must carry a child-subtree bit for the
    // subtree that owns level 6, at the Morton index of that subtree's
    // coordinates within the root's child grid.
    let child_subtree_span = 1u32 << 6;
    let parent_child_x = 47 / child_subtree_span;
    let parent_child_y = 61 / child_subtree_span;
    let expected_idx = morton_index(parent_child_x, parent_child_y) as usize;

    let root_subtree = avail
        .subtrees()
        .find(|(key, _)| **key == (0, 0, 0))
        .map(|(_, bits)| bits)
        .expect("root subtree must exist once a deeper tile is marked");
    assert!(root_subtree.child_buffer[expected_idx]);

    // And the root tile itself, reached by continuing the ancestor climb, is
    // marked available.
    assert!(avail.is_tile_available(0, 0, 0));
}
