use glam::DVec3;

use crate::elevation;
use crate::error::Result;
use crate::identity::{CdbTile, Dataset, GeoCell, MIN_LEVEL};
use crate::ingest::{VectorFeature, VectorSource};
use crate::tree::TileTree;
use crate::types::attributes::AttributeValue;
use crate::types::mesh::{Mesh, PrimitiveMode};
use crate::transform::ecef::geodetic_to_ecef;

/// Build a vector [`TileTree`] (roads, rail, powerlines, hydrography, ...)
/// for one `(geocell, dataset, cs1, cs2)` group. Like models, vector tiles
/// are discrete feature sets rather than a continuous surface -- no
/// coarsening step.
pub fn build_vector_tree(
    source: &impl VectorSource,
    geocell: GeoCell,
    dataset: Dataset,
    cs1: u32,
    cs2: u32,
    candidates: &[CdbTile],
) -> Result<Option<TileTree<Vec<VectorFeature>>>> {
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
        if let Some(features) = source.load(tile)? {
            tree.insert_tile(tile, features)?;
            loaded_any = true;
        }
    }

    Ok(if loaded_any { Some(tree) } else { None })
}

/// Rasterize one vector tile's features into a single point/line mesh.
/// Point features (a lone coordinate) clamp their height onto `elevation_tree`
/// when one covers this geocell; everything else is left at its own height.
pub fn build_feature_mesh(features: &[VectorFeature], elevation_tree: Option<&TileTree<Mesh>>) -> Mesh {
    let mode = if features.iter().all(|f| f.points.len() == 1) {
        PrimitiveMode::Points
    } else {
        PrimitiveMode::Lines
    };

    let mut mesh = Mesh {
        mode,
        ..Default::default()
    };

    for feature in features {
        let start = mesh.positions.len() as u32;
        for &(lon_deg, lat_deg, height) in &feature.points {
            let height = elevation_tree
                .and_then(|tree| elevation::clamp_point_height(tree, lon_deg, lat_deg))
                .unwrap_or(height);
            let [x, y, z] = geodetic_to_ecef(lon_deg, lat_deg, height);
            mesh.positions.push(DVec3::new(x, y, z));
        }
        let end = mesh.positions.len() as u32;

        match mode {
            PrimitiveMode::Points => mesh.indices.extend(start..end),
            _ => {
                for i in start..end.saturating_sub(1) {
                    mesh.indices.extend_from_slice(&[i, i + 1]);
                }
                if feature.closed && end > start + 1 {
                    mesh.indices.extend_from_slice(&[end - 1, start]);
                }
            }
        }
    }

    mesh.compute_rtc();
    mesh
}

/// Serialize a vector tile's per-feature attribute rows into a batch table
/// JSON object: one column per attribute key seen on any feature, `null`
/// for features that don't carry that key.
pub fn build_batch_table_json(features: &[VectorFeature]) -> String {
    let mut keys: Vec<&str> = Vec::new();
    for feature in features {
        for (key, _) in feature.attributes.iter() {
            if !keys.contains(&key.as_str()) {
                keys.push(key.as_str());
            }
        }
    }

    let mut columns = serde_json::Map::new();
    for key in keys {
        let values: Vec<serde_json::Value> = features
            .iter()
            .map(|f| match f.attributes.get(key) {
                Some(AttributeValue::Integer(v)) => serde_json::json!(v),
                Some(AttributeValue::Real(v)) => serde_json::json!(v),
                Some(AttributeValue::Text(v)) => serde_json::json!(v),
                None => serde_json::Value::Null,
            })
            .collect();
        columns.insert(key.to_string(), serde_json::Value::Array(values));
    }
    serde_json::Value::Object(columns).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSource(HashMap<CdbTile, Vec<VectorFeature>>);

    impl VectorSource for MapSource {
        fn load(&self, tile: CdbTile) -> Result<Option<Vec<VectorFeature>>> {
            Ok(self.0.get(&tile).cloned())
        }
    }

    #[test]
    fn loads_matching_candidate_as_leaf() {
        let geocell = GeoCell::new(5, 5).unwrap();
        let tile = CdbTile::new(geocell, Dataset::RoadNetwork, 1, 1, -10, 0, 0).unwrap();
        let mut map = HashMap::new();
        map.insert(
            tile,
            vec![VectorFeature {
                points: vec![(5.0, 5.0, 0.0)],
                closed: false,
                attributes: Default::default(),
            }],
        );
        let source = MapSource(map);

        let tree = build_vector_tree(&source, geocell, Dataset::RoadNetwork, 1, 1, &[tile])
            .unwrap()
            .unwrap();
        let idx = tree.find(tile).unwrap();
        assert_eq!(tree.content(idx).unwrap().len(), 1);
    }

    #[test]
    fn empty_candidates_returns_none() {
        let geocell = GeoCell::new(5, 5).unwrap();
        let source = MapSource(HashMap::new());
        let result =
            build_vector_tree(&source, geocell, Dataset::RoadNetwork, 1, 1, &[]).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn single_point_feature_produces_a_point_mesh() {
        let features = vec![VectorFeature {
            points: vec![(-118.0, 32.0, 100.0)],
            closed: false,
            attributes: Default::default(),
        }];
        let mesh = build_feature_mesh(&features, None);
        assert_eq!(mesh.mode, PrimitiveMode::Points);
        assert_eq!(mesh.vertex_count(), 1);
        assert_eq!(mesh.indices, vec![0]);
    }

    #[test]
    fn open_line_feature_chains_consecutive_points_without_closing() {
        let features = vec![VectorFeature {
            points: vec![(-118.0, 32.0, 0.0), (-117.9, 32.0, 0.0), (-117.9, 32.1, 0.0)],
            closed: false,
            attributes: Default::default(),
        }];
        let mesh = build_feature_mesh(&features, None);
        assert_eq!(mesh.mode, PrimitiveMode::Lines);
        assert_eq!(mesh.indices, vec![0, 1, 1, 2]);
    }

    #[test]
    fn closed_ring_feature_adds_a_closing_segment() {
        let features = vec![VectorFeature {
            points: vec![(-118.0, 32.0, 0.0), (-117.9, 32.0, 0.0), (-117.9, 32.1, 0.0)],
            closed: true,
            attributes: Default::default(),
        }];
        let mesh = build_feature_mesh(&features, None);
        assert_eq!(mesh.indices, vec![0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn point_height_is_clamped_onto_the_elevation_surface_when_available() {
        use crate::elevation::{build_grid_mesh, ElevationRaster};

        let geocell = GeoCell::new(32, -118).unwrap();
        let elevation_tile = CdbTile::new(geocell, Dataset::Elevation, 1, 1, -10, 0, 0).unwrap();
        let raster = ElevationRaster {
            width: 1,
            height: 1,
            heights: vec![500.0, 500.0, 500.0, 500.0],
        };
        let grid_mesh = build_grid_mesh(elevation_tile, &raster);
        let mut tree = TileTree::new(elevation_tile);
        tree.insert_tile(elevation_tile, grid_mesh).unwrap();

        let region = elevation_tile.bounding_region();
        let mid_lon = (region.west + region.east).to_degrees() / 2.0;
        let mid_lat = (region.south + region.north).to_degrees() / 2.0;
        let features = vec![VectorFeature {
            points: vec![(mid_lon, mid_lat, 0.0)],
            closed: false,
            attributes: Default::default(),
        }];

        let clamped = build_feature_mesh(&features, Some(&tree));
        let unclamped = build_feature_mesh(&features, None);
        assert_ne!(clamped.positions[0], unclamped.positions[0]);
    }

    #[test]
    fn batch_table_json_has_one_column_per_attribute_key() {
        let mut attrs_a = crate::types::attributes::FeatureAttributes::new();
        attrs_a.insert("FACC", AttributeValue::Text("AL020".into()));
        let mut attrs_b = crate::types::attributes::FeatureAttributes::new();
        attrs_b.insert("HGT", AttributeValue::Real(12.5));

        let features = vec![
            VectorFeature { points: vec![(0.0, 0.0, 0.0)], closed: false, attributes: attrs_a },
            VectorFeature { points: vec![(1.0, 1.0, 0.0)], closed: false, attributes: attrs_b },
        ];
        let json: serde_json::Value = serde_json::from_str(&build_batch_table_json(&features)).unwrap();
        assert_eq!(json["FACC"], serde_json::json!(["AL020", null]));
        assert_eq!(json["HGT"], serde_json::json!([null, 12.5]));
    }
}
