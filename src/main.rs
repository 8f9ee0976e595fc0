use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use cdb_to_3dtiles::config::{CliArgs, Config};
use cdb_to_3dtiles::pipeline::Pipeline;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("cdb_to_3dtiles=debug")
    } else {
        EnvFilter::new("cdb_to_3dtiles=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::try_from(args).context("invalid configuration")?;

    #[cfg(feature = "parallel")]
    if config.parallel_geocells {
        rayon::ThreadPoolBuilder::new()
            .build_global()
            .context("failed to configure rayon thread pool")?;
    }

    match Pipeline::run(&config) {
        Ok(result) => {
            println!(
                "Done: {} tilesets across {} geocells in {:.2}s",
                result.tileset_count,
                result.geocell_count,
                result.duration.as_secs_f64()
            );
            Ok(())
        }
        Err(e) => {
            error!(%e, "pipeline failed");
            Err(anyhow::anyhow!(e)).context("cdb-to-3dtiles pipeline failed")
        }
    }
}
