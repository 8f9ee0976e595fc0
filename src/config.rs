use std::path::PathBuf;

use clap::Parser;

use crate::error::{CdbError, Result};
use crate::identity::Dataset;

/// One `--combine` group: datasets (by `(dataset, cs1, cs2)`) whose per-geocell
/// tilesets are wrapped under a single combined root manifest.
#[derive(Debug, Clone)]
pub struct CombineGroup {
    pub members: Vec<(Dataset, u32, u32)>,
}

fn parse_combine_group(raw: &str) -> Result<CombineGroup> {
    let members = raw
        .split(',')
        .map(parse_combine_member)
        .collect::<Result<Vec<_>>>()?;
    Ok(CombineGroup { members })
}

fn parse_combine_member(raw: &str) -> Result<(Dataset, u32, u32)> {
    let parts: Vec<&str> = raw.split('_').collect();
    let [name, cs1, cs2] = parts.as_slice() else {
        return Err(CdbError::Config(format!(
            "--combine entry '{raw}' must have the form <dataset>_<cs1>_<cs2>"
        )));
    };
    let dataset = Dataset::from_name(name)?;
    let cs1: u32 = cs1.parse().map_err(|_| {
        CdbError::Config(format!("--combine entry '{raw}' has a non-integer CS_1 '{cs1}'"))
    })?;
    let cs2: u32 = cs2.parse().map_err(|_| {
        CdbError::Config(format!("--combine entry '{raw}' has a non-integer CS_2 '{cs2}'"))
    })?;
    Ok((dataset, cs1, cs2))
}

/// Elevation LOD/simplification parameters.
#[derive(Debug, Clone)]
pub struct ElevationConfig {
    pub generate_normals: bool,
    /// When true, elevation is not duplicated to match deeper imagery levels.
    pub no_lod_duplication: bool,
    pub decimate_error: f64,
    pub threshold_indices: f64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            generate_normals: false,
            no_lod_duplication: false,
            decimate_error: 0.01,
            threshold_indices: 0.3,
        }
    }
}

/// Fully resolved pipeline configuration (constructed from [`CliArgs`]).
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub use_3d_tiles_next: bool,
    pub elevation: ElevationConfig,
    pub subtree_levels: u32,
    pub combine: Vec<CombineGroup>,
    pub parallel_geocells: bool,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::new(),
            use_3d_tiles_next: false,
            elevation: ElevationConfig::default(),
            subtree_levels: 7,
            combine: Vec::new(),
            parallel_geocells: false,
            verbose: false,
            dry_run: false,
        }
    }
}

/// CLI argument definition (clap derive).
#[derive(Parser, Debug)]
#[command(
    name = "cdb-to-3dtiles",
    about = "CDB (Common Database) geospatial dataset to OGC 3D Tiles converter",
    version
)]
pub struct CliArgs {
    /// Input CDB root directory
    #[arg(long)]
    pub input: PathBuf,

    /// Output 3D Tiles directory
    #[arg(long)]
    pub output: PathBuf,

    /// Emit the 3D-Tiles-Next implicit-tiling layout
    #[arg(long = "3d-tiles-next")]
    pub three_d_tiles_next: bool,

    /// Generate per-vertex normals on elevation meshes
    #[arg(long)]
    pub elevation_normal: bool,

    /// Do not duplicate elevation to match deeper imagery levels
    #[arg(long)]
    pub elevation_lod: bool,

    /// Elevation mesh decimation error threshold
    #[arg(long, default_value_t = 0.01)]
    pub elevation_decimate_error: f64,

    /// Elevation decimation index-count threshold (fraction of original)
    #[arg(long, default_value_t = 0.3)]
    pub elevation_threshold_indices: f64,

    /// Implicit-tiling subtree depth
    #[arg(long, default_value_t = 7)]
    pub subtree_levels: u32,

    /// Group datasets (`<dataset>_<cs1>_<cs2>`, comma-separated) under one
    /// combined root manifest; may be repeated
    #[arg(long)]
    pub combine: Vec<String>,

    /// Process geocells concurrently (requires the `parallel` feature)
    #[cfg(feature = "parallel")]
    #[arg(long)]
    pub parallel_geocells: bool,

    /// Enable debug-level logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Scan input and report geocell/dataset counts only
    #[arg(long)]
    pub dry_run: bool,
}

impl TryFrom<CliArgs> for Config {
    type Error = CdbError;

    fn try_from(args: CliArgs) -> Result<Self> {
        let combine = args
            .combine
            .iter()
            .map(|raw| parse_combine_group(raw))
            .collect::<Result<Vec<_>>>()?;

        #[cfg(feature = "parallel")]
        let parallel_geocells = args.parallel_geocells;
        #[cfg(not(feature = "parallel"))]
        let parallel_geocells = false;

        Ok(Config {
            input: args.input,
            output: args.output,
            use_3d_tiles_next: args.three_d_tiles_next,
            elevation: ElevationConfig {
                generate_normals: args.elevation_normal,
                no_lod_duplication: args.elevation_lod,
                decimate_error: args.elevation_decimate_error,
                threshold_indices: args.elevation_threshold_indices,
            },
            subtree_levels: args.subtree_levels,
            combine,
            parallel_geocells,
            verbose: args.verbose,
            dry_run: args.dry_run,
        })
    }
}
