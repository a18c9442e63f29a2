use std::path::PathBuf;

use clap::Parser;

/// Serve a ufs image over UDP
#[derive(Parser)]
pub struct Cli {
    /// UDP port to listen on
    pub port: u16,

    /// Path of the file system image
    pub image: PathBuf,
}
