/* ufs 的整体架构，自上而下 */

// 索引节点层：目录查找、创建、删除，以及文件元信息
mod vfs;

// 文件读写层：跨块的读写与按需分配数据块
mod file;

// 一致性检查：位图与引用关系的核对
mod check;

// 磁盘块管理器层：打开、格式化镜像，分配与回收
mod ufs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

// 镜像层：整个镜像在内存中的映射，负责持久化
mod image;

mod error;

pub use block_dev::BlockDevice;

pub use self::{
    check::Inconsistency,
    error::{Error, Result},
    image::{BlockId, Image},
    layout::InodeKind,
    ufs::UnixFileSystem,
    vfs::Stat,
};

pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 每个 inode 的直接索引个数，没有间接索引
pub const DIRECT_COUNT: usize = 30;

/// 文件名的最大字节数，目录项里另留一字节给 \0
pub const NAME_MAX_LEN: usize = 27;

/// 根目录的 inode 编号，由格式化写入
pub const ROOT_INODE: u32 = 0;

/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = DIRECT_COUNT * BLOCK_SIZE;

type DataBlock = [u8; BLOCK_SIZE];
