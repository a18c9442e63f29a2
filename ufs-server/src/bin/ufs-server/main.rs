mod cli;

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use cli::Cli;
use log::{info, warn};
use ufs::UnixFileSystem;
use ufs_server::{BlockFile, Server};

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let block_file = Arc::new(BlockFile::open(&cli.image).map_err(|err| {
        io::Error::new(err.kind(), format!("cannot open image {:?}: {err}", cli.image))
    })?);
    let fs = UnixFileSystem::open(block_file)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}: {err}", cli.image)))?;

    match fs.check() {
        Ok(found) if found.is_empty() => info!("image is consistent"),
        Ok(found) => {
            for inconsistency in &found {
                warn!("{inconsistency}");
            }
            warn!("image has {} inconsistency(ies), serving anyway", found.len());
        }
        Err(err) => warn!("consistency check aborted: {err}"),
    }

    let server = Server::bind((Ipv4Addr::UNSPECIFIED, cli.port), fs)?;

    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }

    server.serve(&STOP)
}
