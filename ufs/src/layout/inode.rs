use binrw::binrw;

use crate::image::BlockId;
use crate::layout::OnDisk;
use crate::{DIRECT_COUNT, Error, Result};

/// 直接索引中表示“未分配”的块号
pub const NULL_BLOCK: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InodeKind {
    Directory,
    File,
}

impl InodeKind {
    /// 镜像与协议中的编码
    #[inline]
    pub const fn raw(self) -> i32 {
        match self {
            Self::Directory => 0,
            Self::File => 1,
        }
    }
}

impl TryFrom<i32> for InodeKind {
    type Error = i32;

    fn try_from(raw: i32) -> core::result::Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Directory),
            1 => Ok(Self::File),
            raw => Err(raw),
        }
    }
}

/// 磁盘上的 inode，共 128 字节
///
/// 只有直接索引，文件至多 [`DIRECT_COUNT`] 块。
/// 目录的全部目录项都在 `direct[0]` 所指的那一块中。
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    kind: i32,
    /// 文件字节数；目录为目录项个数乘以目录项大小
    pub size: u32,
    /// 直接索引块，未分配的为 [`NULL_BLOCK`]
    pub direct: [u32; DIRECT_COUNT],
}

impl OnDisk for DiskInode {
    const SIZE: usize = 128;
}

impl DiskInode {
    #[inline]
    pub fn new(kind: InodeKind) -> Self {
        Self {
            kind: kind.raw(),
            size: 0,
            direct: [NULL_BLOCK; DIRECT_COUNT],
        }
    }

    pub fn kind(&self) -> Result<InodeKind> {
        InodeKind::try_from(self.kind)
            .map_err(|raw| Error::Corrupted(format!("unknown inode type {raw}")))
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == InodeKind::Directory.raw()
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == InodeKind::File.raw()
    }

    /// 第 `index` 个直接索引所指的块，未分配则为空
    pub fn block(&self, index: usize) -> Option<BlockId> {
        self.direct
            .get(index)
            .copied()
            .filter(|&raw| raw != NULL_BLOCK)
            .map(BlockId::new)
    }

    /// 所有已分配的直接索引
    pub fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..DIRECT_COUNT).filter_map(|index| self.block(index))
    }
}
