//! Routes one decoded request to the file system and builds its response.

use log::debug;
use mfs::{FileType, Message, Operation};
use thiserror::Error;
use ufs::{InodeKind, UnixFileSystem};

/// What the server loop does after answering a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Why a request was answered with a failure.
///
/// All of these collapse into the same negative result code on the wire.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("unknown operation tag {0}")]
    UnknownTag(i32),
    #[error("field {field} has unusable value {value}")]
    Field { field: &'static str, value: i32 },
    #[error(transparent)]
    Fs(#[from] ufs::Error),
}

type Result<T> = core::result::Result<T, Rejection>;

/// Handles `request` against `fs`, returning exactly one response.
pub fn dispatch(fs: &mut UnixFileSystem, request: &Message) -> (Message, Flow) {
    let Some(operation) = request.operation() else {
        debug!("rejected: {}", Rejection::UnknownTag(request.tag));
        return (Message::failure(request), Flow::Continue);
    };

    let handled = match operation {
        Operation::Lookup => lookup(fs, request),
        Operation::Stat => stat(fs, request),
        Operation::Write => write(fs, request),
        Operation::Read => read(fs, request),
        Operation::Creat => creat(fs, request),
        Operation::Unlink => unlink(fs, request),
        Operation::Shutdown => return (Message::success(request), Flow::Shutdown),
    };

    match handled {
        Ok(response) => {
            debug!("{operation:?} inum={} ok", request.inum);
            (response, Flow::Continue)
        }
        Err(err) => {
            debug!("{operation:?} inum={} rejected: {err}", request.inum);
            (Message::failure(request), Flow::Continue)
        }
    }
}

fn lookup(fs: &UnixFileSystem, request: &Message) -> Result<Message> {
    let inum = fs.lookup(inum(request)?, request.name())?;

    let mut response = Message::success(request);
    response.inum = field("inum", inum)?;
    Ok(response)
}

fn stat(fs: &UnixFileSystem, request: &Message) -> Result<Message> {
    let stat = fs.stat(inum(request)?)?;

    let mut response = Message::success(request);
    response.kind = stat.kind.raw();
    response.size = field("size", stat.size)?;
    Ok(response)
}

fn write(fs: &mut UnixFileSystem, request: &Message) -> Result<Message> {
    let offset = unsigned("offset", request.offset)?;
    let data = request.payload().ok_or(Rejection::Field {
        field: "nbytes",
        value: request.nbytes,
    })?;
    fs.write(inum(request)?, offset as usize, data)?;

    Ok(Message::success(request))
}

fn read(fs: &UnixFileSystem, request: &Message) -> Result<Message> {
    let offset = unsigned("offset", request.offset)?;
    let nbytes = unsigned("nbytes", request.nbytes)? as usize;

    let mut response = Message::success(request);
    let buf = response.buffer.get_mut(..nbytes).ok_or(Rejection::Field {
        field: "nbytes",
        value: request.nbytes,
    })?;
    fs.read(inum(request)?, offset as usize, buf)?;
    response.nbytes = request.nbytes;
    Ok(response)
}

fn creat(fs: &mut UnixFileSystem, request: &Message) -> Result<Message> {
    let kind = match FileType::try_from(request.kind) {
        Ok(FileType::Directory) => InodeKind::Directory,
        Ok(FileType::RegularFile) => InodeKind::File,
        Err(value) => return Err(Rejection::Field { field: "type", value }),
    };
    fs.creat(inum(request)?, kind, request.name())?;

    Ok(Message::success(request))
}

fn unlink(fs: &mut UnixFileSystem, request: &Message) -> Result<Message> {
    fs.unlink(inum(request)?, request.name())?;
    Ok(Message::success(request))
}

fn inum(request: &Message) -> Result<u32> {
    unsigned("inum", request.inum)
}

fn unsigned(field: &'static str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| Rejection::Field { field, value })
}

fn field(field: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| Rejection::Field {
        field,
        value: value as i32,
    })
}
