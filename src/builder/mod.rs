//! Per-dataset tiling orchestration: turn whatever native tiles a source can
//! supply into a complete [`TileTree`] down to the geocell root, filling
//! missing elevation ancestor/sibling/descendant tiles by coarsening or
//! re-splitting the nearest available grid, then hand the populated tree to
//! the availability and container/manifest stages.

pub mod elevation_builder;
pub mod model_builder;
pub mod vector_builder;

pub use elevation_builder::build_elevation_tree;
pub use model_builder::{build_gt_model_tree, build_model_tree, GtInstanceGroup, GtModelTile};
pub use vector_builder::{build_batch_table_json, build_feature_mesh, build_vector_tree};
