use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("inode {0} is out of range or not allocated")]
    InvalidInode(u32),
    #[error("inode {0} is not a directory")]
    NotADirectory(u32),
    #[error("inode {0} is not a regular file")]
    NotAFile(u32),
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("no entry named {0:?}")]
    NotFound(String),
    #[error("{0:?} already exists with another type")]
    AlreadyExists(String),
    #[error("directory {0} is full")]
    DirectoryFull(u32),
    #[error("directory {0:?} is not empty")]
    DirectoryNotEmpty(String),
    #[error("range {offset}..{end} is outside of the file (size {size})")]
    OutOfBounds { offset: usize, end: usize, size: usize },
    #[error("transfer of {0} bytes is not within one block")]
    InvalidLength(usize),
    #[error("block index {0} exceeds the direct pointers")]
    CapacityExceeded(usize),
    #[error("no free inode")]
    NoFreeInode,
    #[error("no free data block")]
    NoFreeDataBlock,
    #[error("corrupted image: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Layout(#[from] binrw::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
