//! Terraform plugin binary for NIFCLOUD
//!
//! Terraform starts this process and drives it over the plugin protocol.
//! Stdout carries the handshake, so logs go to stderr.
//!
//! ## Module Structure
//!
//! - `provider` - provider block, configuration and the shared provider slot
//! - `resource` - lifecycle bridge from Terraform resources to the core provider
//! - `data_source` - the same for data sources
//! - `schema` - core schema to plugin schema conversion
//! - `value` - Terraform values and conversion to the core value model

mod data_source;
mod provider;
mod resource;
mod schema;
mod value;

#[cfg(test)]
mod testing;

use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::provider::NifcloudPlugin;

/// Environment variable overriding `--log-level` with an env_logger filter
const LOG_ENV: &str = "NIFCLOUD_LOG";

#[derive(Parser)]
#[command(name = "terraform-provider-nifcloud")]
#[command(about = "NIFCLOUD provider plugin for Terraform", long_about = None)]
struct Cli {
    /// Log verbosity [trace|debug|info|warn|error], overridden by NIFCLOUD_LOG
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level);

    log::info!("starting terraform-provider-nifcloud {}", env!("CARGO_PKG_VERSION"));
    tf_provider::serve("nifcloud", NifcloudPlugin::default()).await
}

fn init_logger(level: LevelFilter) {
    let mut builder = Builder::new();
    builder.target(Target::Stderr);
    match std::env::var(LOG_ENV) {
        Ok(filters) => builder.parse_filters(&filters),
        Err(_) => builder.filter_level(level),
    };
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_level_defaults_to_info() {
        let cli = Cli::parse_from(["terraform-provider-nifcloud"]);
        assert_eq!(cli.log_level, LevelFilter::Info);

        let cli = Cli::parse_from(["terraform-provider-nifcloud", "--log-level", "debug"]);
        assert_eq!(cli.log_level, LevelFilter::Debug);
    }
}
