//! # 磁盘数据结构层
//!
//! ufs 的磁盘布局，块大小为 [`BLOCK_SIZE`](crate::BLOCK_SIZE)：
//! 超级块 | 索引节点位图 | 数据块位图 | 索引节点区域 | 数据块区域
//!
//! 各区域的起始块与长度都记录在超级块中。所有整数按小端序存放。

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, InodeKind, NULL_BLOCK};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, display_name, validate_name};

/// 在磁盘上占据固定字节数的数据结构
pub trait OnDisk {
    const SIZE: usize;
}
