//! CDB identity: the `(GeoCell, Dataset, CS_1, CS_2, Level, UREF, RREF)` tuple
//! that names every tile, and the path/filename grammar built from it.

mod dataset;
mod geocell;
mod tile;

pub use dataset::Dataset;
pub use geocell::{zone_from_latitude, GeoCell};
pub use tile::{BoundingRegion, CdbTile, MAX_LEVEL, MIN_LEVEL};
