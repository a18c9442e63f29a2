use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid name {0:?}")]
    InvalidName(String),
    #[error("transfer of {0} bytes is not allowed")]
    InvalidLength(usize),
    #[error("{0} does not fit in a message field")]
    OutOfRange(u32),
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    #[error("no response from the server")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(#[from] binrw::Error),
    #[error("request rejected by the server")]
    Rejected,
}
