//! The tileset hierarchy: an arena-of-indices tree whose shape mirrors CDB's
//! own addressing -- a linear chain through the negative LODs, then a
//! quadtree from level 0 upward. Insertion walks from the tree's root tile
//! toward the target tile one level at a time, lazily creating intermediate
//! nodes; no node is ever allocated twice for the same tile.

use crate::error::{CdbError, Result};
use crate::identity::CdbTile;

/// A stable handle into a [`TileTree`]'s arena. Never invalidated by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Index(usize);

struct Node<T> {
    tile: CdbTile,
    content: Option<T>,
    /// Slot 0 is the negative-chain's sole child. At non-negative levels all
    /// four quadrant slots are used, indexed by `UREF_direction*2 + RREF_direction`.
    children: [Option<Index>; 4],
}

/// A tree of [`CdbTile`] identities rooted at a single fixed tile, with
/// optional per-node content of type `T` (typically tile byte payloads or
/// deferred builder state).
pub struct TileTree<T> {
    nodes: Vec<Node<T>>,
    root: Index,
}

impl<T> TileTree<T> {
    /// Start a new tree rooted at `root_tile`. Every tile later inserted must
    /// share `root_tile`'s `(geocell, dataset, cs1, cs2)` group and have
    /// `level >= root_tile.level()`.
    pub fn new(root_tile: CdbTile) -> Self {
        Self {
            nodes: vec![Node {
                tile: root_tile,
                content: None,
                children: [None; 4],
            }],
            root: Index(0),
        }
    }

    pub fn root(&self) -> Index {
        self.root
    }

    pub fn tile(&self, idx: Index) -> CdbTile {
        self.nodes[idx.0].tile
    }

    pub fn content(&self, idx: Index) -> Option<&T> {
        self.nodes[idx.0].content.as_ref()
    }

    pub fn content_mut(&mut self, idx: Index) -> Option<&mut T> {
        self.nodes[idx.0].content.as_mut()
    }

    pub fn children(&self, idx: Index) -> impl Iterator<Item = Index> + '_ {
        self.nodes[idx.0].children.into_iter().flatten()
    }

    /// Every index currently allocated in the arena, in insertion order.
    pub fn indices(&self) -> impl Iterator<Item = Index> + '_ {
        (0..self.nodes.len()).map(Index)
    }

    fn push_node(&mut self, tile: CdbTile) -> Index {
        self.nodes.push(Node {
            tile,
            content: None,
            children: [None; 4],
        });
        Index(self.nodes.len() - 1)
    }

    fn same_group(a: CdbTile, b: CdbTile) -> bool {
        a.geocell() == b.geocell()
            && a.dataset() == b.dataset()
            && a.cs1() == b.cs1()
            && a.cs2() == b.cs2()
    }

    /// Insert `tile` (creating any missing ancestors along the path from the
    /// root) and attach `content` to it. Returns the tile's index.
    pub fn insert_tile(&mut self, tile: CdbTile, content: T) -> Result<Index> {
        let root_tile = self.tile(self.root);
        if !Self::same_group(root_tile, tile) {
            return Err(CdbError::PreconditionViolation(format!(
                "tile {:?} does not share this tree's (geocell, dataset, cs1, cs2) group",
                tile
            )));
        }
        if tile.level() < root_tile.level() {
            return Err(CdbError::PreconditionViolation(format!(
                "tile level {} below tree root level {}",
                tile.level(),
                root_tile.level()
            )));
        }
        let mut ancestor = tile;
        while ancestor.level() > root_tile.level() {
            ancestor = ancestor
                .parent()
                .expect("level above root level always has a parent");
        }
        if ancestor != root_tile {
            return Err(CdbError::PreconditionViolation(format!(
                "tile {:?} is not a descendant of this tree's root {:?}",
                tile, root_tile
            )));
        }

        let idx = self.insert_recursive(self.root, tile)?;
        self.nodes[idx.0].content = Some(content);
        Ok(idx)
    }

    fn insert_recursive(&mut self, idx: Index, tile: CdbTile) -> Result<Index> {
        let node_tile = self.tile(idx);
        if node_tile == tile {
            return Ok(idx);
        }

        if node_tile.level() < 0 {
            let child_tile = node_tile.negative_child()?;
            let child_idx = match self.nodes[idx.0].children[0] {
                Some(c) => c,
                None => {
                    let c = self.push_node(child_tile);
                    self.nodes[idx.0].children[0] = Some(c);
                    c
                }
            };
            return self.insert_recursive(child_idx, tile);
        }

        let shift = tile.level() - node_tile.level() - 1;
        let pow2 = 1u32 << shift;
        let child_uref = tile.uref() / pow2;
        let child_rref = tile.rref() / pow2;
        let du = child_uref - 2 * node_tile.uref();
        let dr = child_rref - 2 * node_tile.rref();

        let child_tile = match (du, dr) {
            (1, 0) => node_tile.north_west_child(),
            (1, 1) => node_tile.north_east_child(),
            (0, 0) => node_tile.south_west_child(),
            (0, 1) => node_tile.south_east_child(),
            _ => unreachable!("quadrant direction is always a 0/1 pair"),
        }?;
        let slot = (du * 2 + dr) as usize;
        let child_idx = match self.nodes[idx.0].children[slot] {
            Some(c) => c,
            None => {
                let c = self.push_node(child_tile);
                self.nodes[idx.0].children[slot] = Some(c);
                c
            }
        };
        self.insert_recursive(child_idx, tile)
    }

    /// Descend from the root toward `(lon_rad, lat_rad)`, returning the
    /// deepest tile whose bounding region contains the point.
    pub fn get_fit_tile(&self, lon_rad: f64, lat_rad: f64) -> Option<CdbTile> {
        let root_tile = self.tile(self.root);
        if !root_tile.bounding_region().contains(lon_rad, lat_rad) {
            return None;
        }
        let mut current = self.root;
        loop {
            let mut descended = false;
            for child in self.children(current) {
                if self.tile(child).bounding_region().contains(lon_rad, lat_rad) {
                    current = child;
                    descended = true;
                    break;
                }
            }
            if !descended {
                return Some(self.tile(current));
            }
        }
    }

    /// All tiles at the given level, in arena order (a pre-order DFS visits
    /// shallower levels first, so this is a simple filter).
    pub fn tiles_at_level(&self, level: i32) -> Vec<CdbTile> {
        self.nodes
            .iter()
            .filter(|n| n.tile.level() == level)
            .map(|n| n.tile)
            .collect()
    }

    /// Locate a tile already present in the tree, without creating anything.
    pub fn find(&self, tile: CdbTile) -> Option<Index> {
        self.nodes
            .iter()
            .position(|n| n.tile == tile)
            .map(Index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Dataset, GeoCell};

    fn root_tile() -> CdbTile {
        let geocell = GeoCell::new(32, -118).unwrap();
        CdbTile::new(geocell, Dataset::Elevation, 1, 1, -10, 0, 0).unwrap()
    }

    #[test]
    fn new_tree_has_single_root_node() {
        let tree: TileTree<()> = TileTree::new(root_tile());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.tile(tree.root()), root_tile());
    }

    #[test]
    fn insert_root_tile_attaches_content() {
        let mut tree = TileTree::new(root_tile());
        let idx = tree.insert_tile(root_tile(), 42).unwrap();
        assert_eq!(*tree.content(idx).unwrap(), 42);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn indices_covers_every_allocated_node() {
        let mut tree = TileTree::new(root_tile());
        let child = root_tile().negative_child().unwrap();
        tree.insert_tile(child, "leaf").unwrap();
        assert_eq!(tree.indices().count(), tree.len());
    }

    #[test]
    fn insert_creates_negative_chain_ancestors() {
        let mut tree = TileTree::new(root_tile());
        let deep = {
            let mut t = root_tile();
            for _ in 0..9 {
                t = t.negative_child().unwrap();
            }
            t
        };
        assert_eq!(deep.level(), -1);
        tree.insert_tile(deep, "deep").unwrap();
        // root (-10) plus 9 chained ancestors down to -1
        assert_eq!(tree.len(), 10);
    }

    #[test]
    fn insert_quadtree_descendant_creates_one_node_per_level() {
        let mut tree = TileTree::new(root_tile());
        let level0 = root_tile().negative_child().unwrap(); // -9
        let mut t = level0;
        for _ in 0..9 {
            t = t.negative_child().unwrap();
        }
        assert_eq!(t.level(), 0);
        let nw = t.north_west_child().unwrap();
        let nwnw = nw.north_west_child().unwrap();

        tree.insert_tile(nwnw, "leaf").unwrap();
        // root(-10) + 9 chain nodes (-9..0) + nw(1) + nwnw(2) = 1 + 9 + 2 = 12
        assert_eq!(tree.len(), 12);
    }

    #[test]
    fn insert_rejects_tile_from_different_group() {
        let mut tree = TileTree::new(root_tile());
        let other_geocell = GeoCell::new(10, 10).unwrap();
        let foreign = CdbTile::new(other_geocell, Dataset::Elevation, 1, 1, -10, 0, 0).unwrap();
        assert!(tree.insert_tile(foreign, ()).is_err());
    }

    #[test]
    fn insert_rejects_tile_not_descended_from_root() {
        let mut tree = TileTree::new(root_tile());
        let geocell = root_tile().geocell();
        // A level-2 tile whose ancestor-at-root-level differs (wrong quadrant lineage
        // relative to this root, which always has UREF=RREF=0 down the chain) --
        // construct one honestly unreachable from this particular root: same group
        // but built directly at a positive level with nonzero refs, whose true
        // level(-10) ancestor is still `root_tile()` (since UREF/RREF collapse to 0
        // for any negative ancestor) -- so instead assert the group check directly
        // via a mismatched cs1.
        let foreign = CdbTile::new(geocell, Dataset::Elevation, 9, 1, -10, 0, 0).unwrap();
        assert!(tree.insert_tile(foreign, ()).is_err());
    }

    #[test]
    fn get_fit_tile_descends_to_deepest_containing_leaf() {
        let mut tree = TileTree::new(root_tile());
        let level0 = {
            let mut t = root_tile();
            for _ in 0..10 {
                t = t.negative_child().unwrap();
            }
            t
        };
        let nw = level0.north_west_child().unwrap();
        tree.insert_tile(nw, "nw").unwrap();

        let region = nw.bounding_region();
        let mid_lon = (region.west + region.east) / 2.0;
        let mid_lat = (region.south + region.north) / 2.0;
        let fit = tree.get_fit_tile(mid_lon, mid_lat).unwrap();
        assert_eq!(fit, nw);
    }

    #[test]
    fn get_fit_tile_outside_root_region_is_none() {
        let tree: TileTree<()> = TileTree::new(root_tile());
        assert!(tree.get_fit_tile(0.0, 0.0).is_none());
    }

    #[test]
    fn find_locates_inserted_tile_and_misses_absent_one() {
        let mut tree = TileTree::new(root_tile());
        tree.insert_tile(root_tile(), "root").unwrap();
        assert!(tree.find(root_tile()).is_some());

        let other = GeoCell::new(1, 1).unwrap();
        let foreign = CdbTile::new(other, Dataset::Elevation, 1, 1, -10, 0, 0).unwrap();
        assert!(tree.find(foreign).is_none());
    }

    #[test]
    fn tiles_at_level_filters_by_level() {
        let mut tree = TileTree::new(root_tile());
        let level0 = {
            let mut t = root_tile();
            for _ in 0..10 {
                t = t.negative_child().unwrap();
            }
            t
        };
        tree.insert_tile(level0.north_west_child().unwrap(), 1)
            .unwrap();
        tree.insert_tile(level0.north_east_child().unwrap(), 2)
            .unwrap();
        assert_eq!(tree.tiles_at_level(1).len(), 2);
        assert_eq!(tree.tiles_at_level(-10).len(), 1);
    }
}
