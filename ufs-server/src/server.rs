use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use mfs::Message;
use ufs::UnixFileSystem;

use crate::{Flow, dispatch};

/// How long one receive may block before the stop flag is checked again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Serves one file system image over UDP, one request at a time.
pub struct Server {
    socket: UdpSocket,
    fs: UnixFileSystem,
}

impl Server {
    pub fn bind(addr: impl ToSocketAddrs, fs: UnixFileSystem) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        info!("listening on {}", socket.local_addr()?);

        Ok(Self { socket, fs })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answers requests until a SHUTDOWN request arrives or `stop` is set,
    /// then writes back the image and releases it.
    pub fn serve(mut self, stop: &AtomicBool) -> io::Result<()> {
        // one spare byte to notice oversized datagrams
        let mut datagram = vec![0; Message::SIZE + 1];

        while !stop.load(Ordering::SeqCst) {
            let Some((len, peer)) = received(self.socket.recv_from(&mut datagram)) else {
                continue;
            };

            if len != Message::SIZE {
                warn!("dropped a datagram of {len} bytes from {peer}");
                continue;
            }
            let request = match Message::decode(&datagram[..len]) {
                Ok(request) => request,
                Err(err) => {
                    warn!("dropped an undecodable datagram from {peer}: {err}");
                    continue;
                }
            };

            debug!("request {} from {peer}", request.tag);
            let (response, flow) = dispatch(&mut self.fs, &request);
            self.reply(&response, peer);

            if flow == Flow::Shutdown {
                info!("shutdown requested by {peer}");
                break;
            }
        }

        info!("server stopped");
        self.fs.close().map_err(io::Error::other)
    }

    fn reply(&self, response: &Message, peer: SocketAddr) {
        let sent = response
            .encode()
            .map_err(io::Error::other)
            .and_then(|bytes| self.socket.send_to(&bytes, peer));
        if let Err(err) = sent {
            warn!("failed to answer {peer}: {err}");
        }
    }
}

/// The received datagram's length and sender, or `None` when the receive
/// failed and only that datagram is lost.
fn received(result: io::Result<(usize, SocketAddr)>) -> Option<(usize, SocketAddr)> {
    match result {
        Ok(received) => Some(received),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
            ) =>
        {
            None
        }
        Err(err) => {
            warn!("receive failed: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn receive_errors_are_dropped() {
        let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, 7));
        assert_eq!(received(Ok((12, peer))), Some((12, peer)));
        assert_eq!(received(Err(ErrorKind::WouldBlock.into())), None);
        assert_eq!(received(Err(ErrorKind::ConnectionReset.into())), None);
        assert_eq!(received(Err(ErrorKind::ConnectionRefused.into())), None);
        assert_eq!(received(Err(io::Error::other("boom"))), None);
    }
}
