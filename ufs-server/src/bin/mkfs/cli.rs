use std::path::PathBuf;

use clap::Parser;

/// Create an empty ufs image
#[derive(Parser)]
pub struct Cli {
    /// Path of the image to create
    #[arg(long, short)]
    pub image: PathBuf,

    /// Number of inodes
    #[arg(long, short = 'n', default_value_t = 32)]
    pub inodes: u32,

    /// Number of data blocks
    #[arg(long, short, default_value_t = 32)]
    pub data_blocks: u32,

    /// Overwrite an existing file
    #[arg(long, short)]
    pub force: bool,
}
