mod cli;

use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use ufs::UnixFileSystem;
use ufs::layout::SuperBlock;
use ufs_server::BlockFile;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let blocks = SuperBlock::new(cli.inodes, cli.data_blocks).total_blocks();
    let block_file = Arc::new(BlockFile::create(&cli.image, blocks, cli.force)?);
    UnixFileSystem::format(block_file, cli.inodes, cli.data_blocks)
        .and_then(UnixFileSystem::close)
        .map_err(io::Error::other)?;

    println!(
        "image={:?} blocks={blocks} inodes={} data_blocks={}",
        cli.image, cli.inodes, cli.data_blocks
    );
    Ok(())
}
