//! Parses command-line arguments for the pool node CLI.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "pool-node",
    about = "Serves an operator pool over newline-delimited JSON on stdin/stdout",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'p',
        help = "The file containing the consensus-critical params of the pool",
        default_value = "params.toml"
    )]
    pub params: PathBuf,

    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the node",
        default_value = "config.toml"
    )]
    pub config: PathBuf,
}
