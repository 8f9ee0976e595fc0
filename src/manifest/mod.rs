//! Tileset manifest serialization: per-geocell `tileset.json` documents, the
//! implicit-tiling subtree blobs they reference, and the top-level combine
//! step across datasets/geocells.

pub mod subtree;
pub mod tileset;

pub use subtree::write_subtree_blob;
pub use tileset::{combine_tileset_json, write_tileset_json, ImplicitConfig, ROOT_GEOMETRIC_ERROR};
