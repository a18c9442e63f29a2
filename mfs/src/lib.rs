//! # mfs 协议
//!
//! 客户端与 ufs 服务器之间的请求/响应协议：
//! 每个 UDP 数据报恰好是一条定长的 [`Message`]，请求与响应共用同一格式。

mod client;
mod error;
mod message;

pub use self::{
    client::{Client, Stat, TIMEOUT},
    error::ClientError,
    message::{FileType, Message, Operation},
};

/// 一次读写的最大字节数，也是消息中负载缓冲区的大小
pub const BUFFER_SIZE: usize = 4096;

/// 名字的最大字节数，另留一字节给 \0
pub const NAME_MAX_LEN: usize = 27;
