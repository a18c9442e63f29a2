//! # 客户端
//!
//! 把文件系统操作编组成请求，发给服务器后阻塞等待唯一的响应。
//! 不重发请求：超时的调用可能已经在服务器上执行过。

use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::{BUFFER_SIZE, ClientError, FileType, Message, NAME_MAX_LEN, Operation};

/// 等待响应的默认时限
pub const TIMEOUT: Duration = Duration::from_secs(30);

type Result<T> = core::result::Result<T, ClientError>;

/// 文件的元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: FileType,
    pub size: u32,
}

pub struct Client {
    socket: UdpSocket,
    server: SocketAddr,
    timeout: Duration,
}

impl Client {
    /// 在任意本地端口上绑定套接字，之后的请求都发往 `server`
    pub fn connect(server: impl ToSocketAddrs) -> Result<Self> {
        let server = server
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotFound, "server address resolved to nothing"))?;
        let local = if server.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)?;
        debug!("client bound to {}, server at {server}", socket.local_addr()?);

        Ok(Self {
            socket,
            server,
            timeout: TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 在目录 `parent` 下按名字查找 inode 编号
    pub fn lookup(&self, parent: u32, name: impl AsRef<[u8]>) -> Result<u32> {
        let mut request = Message::request(Operation::Lookup);
        request.inum = wire(parent)?;
        request.set_name(checked_name(name.as_ref())?);

        let response = self.call(&request)?;
        u32::try_from(response.inum).map_err(|_| ClientError::Rejected)
    }

    pub fn stat(&self, inum: u32) -> Result<Stat> {
        let mut request = Message::request(Operation::Stat);
        request.inum = wire(inum)?;

        let response = self.call(&request)?;
        Ok(Stat {
            kind: FileType::try_from(response.kind).map_err(|_| ClientError::Rejected)?,
            size: u32::try_from(response.size).map_err(|_| ClientError::Rejected)?,
        })
    }

    /// 把 `data` 写入文件 `inum` 的 `offset` 处
    pub fn write(&self, inum: u32, offset: u32, data: &[u8]) -> Result<()> {
        let mut request = Message::request(Operation::Write);
        request.inum = wire(inum)?;
        request.offset = wire(offset)?;
        request.nbytes = checked_len(data.len())?;
        request.buffer[..data.len()].copy_from_slice(data);

        self.call(&request).map(drop)
    }

    /// 从文件 `inum` 的 `offset` 处读满 `buf`
    pub fn read(&self, inum: u32, offset: u32, buf: &mut [u8]) -> Result<()> {
        let mut request = Message::request(Operation::Read);
        request.inum = wire(inum)?;
        request.offset = wire(offset)?;
        request.nbytes = checked_len(buf.len())?;

        let response = self.call(&request)?;
        buf.copy_from_slice(&response.buffer[..buf.len()]);
        Ok(())
    }

    /// 创建文件或目录；不返回 inode 编号，需要时再 [`lookup`](Self::lookup)
    pub fn creat(&self, parent: u32, kind: FileType, name: impl AsRef<[u8]>) -> Result<()> {
        let mut request = Message::request(Operation::Creat);
        request.inum = wire(parent)?;
        request.kind = kind as i32;
        request.set_name(checked_name(name.as_ref())?);

        self.call(&request).map(drop)
    }

    pub fn unlink(&self, parent: u32, name: impl AsRef<[u8]>) -> Result<()> {
        let mut request = Message::request(Operation::Unlink);
        request.inum = wire(parent)?;
        request.set_name(checked_name(name.as_ref())?);

        self.call(&request).map(drop)
    }

    /// 要求服务器停止，等到服务器确认后返回
    pub fn shutdown(&self) -> Result<()> {
        self.call(&Message::request(Operation::Shutdown)).map(drop)
    }
}

impl Client {
    /// 发出一个请求并等待来自服务器的一个响应。
    ///
    /// 操作类型与请求不符的数据报是先前超时请求的迟到响应，丢弃后继续等待。
    fn call(&self, request: &Message) -> Result<Message> {
        self.socket.send_to(&request.encode()?, self.server)?;
        trace!("sent {:?} to {}", request.operation(), self.server);

        let deadline = Instant::now() + self.timeout;
        let mut datagram = vec![0; Message::SIZE + 1];
        let response = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::Timeout);
            }
            self.socket.set_read_timeout(Some(remaining))?;

            let (len, peer) = match self.socket.recv_from(&mut datagram) {
                Ok(received) => received,
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(ClientError::Timeout);
                }
                Err(err) => return Err(err.into()),
            };
            if peer != self.server {
                debug!("ignored a datagram from {peer}");
                continue;
            }
            let response = Message::decode(&datagram[..len])?;
            if response.tag != request.tag {
                debug!("dropped a stale response with tag {}", response.tag);
                continue;
            }
            break response;
        };

        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Rejected)
        }
    }
}

fn checked_name(name: &[u8]) -> Result<&[u8]> {
    if name.is_empty() || name.len() > NAME_MAX_LEN || name.contains(&0) {
        return Err(ClientError::InvalidName(String::from_utf8_lossy(name).into_owned()));
    }
    Ok(name)
}

fn checked_len(len: usize) -> Result<i32> {
    if len == 0 || len > BUFFER_SIZE {
        return Err(ClientError::InvalidLength(len));
    }
    Ok(len as i32)
}

fn wire(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| ClientError::OutOfRange(value))
}
