//! # 索引节点层
//!
//! 在单个父目录内按名字查找、创建、删除，以及获取 inode 的元信息。
//! 跨多级路径的解析由调用者逐级完成。
//!
//! 名字是字节串，按字节精确比较，不要求是 UTF-8。
//! 每个目录只有一个目录块（`direct[0]`），容量固定为
//! [`DirEntry::PER_BLOCK`] 项，其中 "." 与 ".." 两项在创建时写入。

use log::{debug, warn};

use crate::image::BlockId;
use crate::layout::{DirEntry, DiskInode, InodeKind, OnDisk, display_name, validate_name};
use crate::{Error, Result, UnixFileSystem};

/// 文件的元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: InodeKind,
    /// 文件字节数
    pub size: u32,
}

/// 已确认可用的目录
struct Directory {
    inum: u32,
    inode: DiskInode,
    /// 唯一的目录块
    block: BlockId,
}

impl Directory {
    /// 目录中有效目录项的个数
    #[inline]
    fn entries(&self) -> usize {
        self.inode.size as usize / DirEntry::SIZE
    }
}

impl UnixFileSystem {
    /// 在目录 `parent` 下通过名字获取 inode 编号
    pub fn lookup(&self, parent: u32, name: impl AsRef<[u8]>) -> Result<u32> {
        let name = name.as_ref();
        validate_name(name)?;
        let dir = self.directory(parent)?;
        if dir.entries() == 0 {
            return Err(Error::NotFound(display_name(name)));
        }

        self.find_entry(dir.block, name)?
            .map(|(_, inum)| inum)
            .ok_or_else(|| Error::NotFound(display_name(name)))
    }

    pub fn stat(&self, inum: u32) -> Result<Stat> {
        let inode = self.inode(inum)?;
        Ok(Stat {
            kind: inode.kind()?,
            size: inode.size,
        })
    }

    /// 在目录 `parent` 下创建名为 `name` 的文件或目录。
    ///
    /// 同名同类型的项已存在时直接成功，不分配任何东西，
    /// 这样重发的创建请求不会产生重复的效果。
    pub fn creat(&mut self, parent: u32, kind: InodeKind, name: impl AsRef<[u8]>) -> Result<()> {
        self.persist(|fs| fs.create_entry(parent, kind, name.as_ref()))
    }

    /// 从目录 `parent` 中删除名为 `name` 的项，并回收其 inode 与数据块。
    ///
    /// 名字不存在时视为已删除；目录只有在仅剩 "." 与 ".." 时才能删除。
    pub fn unlink(&mut self, parent: u32, name: impl AsRef<[u8]>) -> Result<()> {
        self.persist(|fs| fs.remove_entry(parent, name.as_ref()))
    }
}

impl UnixFileSystem {
    /// 确认 `inum` 是目录，并且它的目录块已分配
    fn directory(&self, inum: u32) -> Result<Directory> {
        let inode = self.inode(inum)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory(inum));
        }

        let block = inode
            .block(0)
            .ok_or_else(|| Error::Corrupted(format!("directory {inum} has no block")))?;
        let block = self.owned_block(block)?;

        Ok(Directory { inum, inode, block })
    }

    /// 在目录块中寻找名为 `name` 的有效项，返回其槽位与 inode 编号
    fn find_entry(&self, block: BlockId, name: &[u8]) -> Result<Option<(usize, u32)>> {
        for slot in 0..DirEntry::PER_BLOCK {
            let entry: DirEntry = self.image.map(block, slot * DirEntry::SIZE)?;
            if entry.matches(name) {
                return Ok(entry.inode().map(|inum| (slot, inum)));
            }
        }

        Ok(None)
    }

    /// 在目录块中寻找编号最小的空槽位
    fn free_slot(&self, block: BlockId) -> Result<Option<usize>> {
        for slot in 0..DirEntry::PER_BLOCK {
            let entry: DirEntry = self.image.map(block, slot * DirEntry::SIZE)?;
            if entry.is_free() {
                return Ok(Some(slot));
            }
        }

        Ok(None)
    }

    fn create_entry(&mut self, parent: u32, kind: InodeKind, name: &[u8]) -> Result<()> {
        validate_name(name)?;
        let dir = self.directory(parent)?;
        if dir.entries() == 0 {
            return Err(Error::Corrupted(format!("directory {parent} has no entries")));
        }

        // 确认没有已创建的同名项
        if let Some((_, inum)) = self.find_entry(dir.block, name)? {
            let existing = self.read_inode(inum)?.kind()?;
            if existing == kind {
                debug!("{:?} already exists in directory {parent} as inode {inum}", display_name(name));
                return Ok(());
            }
            return Err(Error::AlreadyExists(display_name(name)));
        }

        let slot = self
            .free_slot(dir.block)?
            .ok_or(Error::DirectoryFull(parent))?;

        let inum = self.alloc_inode()?;
        let mut inode = DiskInode::new(kind);
        if kind == InodeKind::Directory {
            // 没有空闲数据块时连同 inode 一起退回，位图保持原样
            let block = match self.alloc_data() {
                Ok(block) => block,
                Err(err) => {
                    self.dealloc_inode(inum)?;
                    return Err(err);
                }
            };
            self.init_dir_block(block, inum, parent)?;
            inode.direct[0] = block.into();
            inode.size = 2 * DirEntry::SIZE as u32;
        }
        self.store_inode(inum, &inode)?;

        self.image
            .store(dir.block, slot * DirEntry::SIZE, &DirEntry::new(name, inum))?;
        self.inode_mut(dir.inum, |parent| parent.size += DirEntry::SIZE as u32)?;

        debug!(
            "created {kind:?} {:?} as inode {inum} in directory {parent}, slot {slot}",
            display_name(name)
        );
        Ok(())
    }

    fn remove_entry(&mut self, parent: u32, name: &[u8]) -> Result<()> {
        validate_name(name)?;
        if name == b"." || name == b".." {
            return Err(Error::InvalidName(display_name(name)));
        }

        let dir = self.directory(parent)?;
        if dir.entries() == 0 {
            return Ok(());
        }

        let Some((slot, inum)) = self.find_entry(dir.block, name)? else {
            debug!("{:?} is not in directory {parent}, nothing to unlink", display_name(name));
            return Ok(());
        };

        let target = self.read_inode(inum)?;
        if target.is_dir() && target.size as usize > 2 * DirEntry::SIZE {
            return Err(Error::DirectoryNotEmpty(display_name(name)));
        }

        self.image
            .store(dir.block, slot * DirEntry::SIZE, &DirEntry::free())?;
        self.inode_mut(dir.inum, |parent| {
            parent.size = parent.size.saturating_sub(DirEntry::SIZE as u32)
        })?;

        // 回收所有直接索引所指的块，块内容保持原样
        for block in target.blocks() {
            if self.data_allocated(block)? {
                self.dealloc_data(block)?;
            } else {
                warn!("inode {inum} points at free block {block}, skipped");
            }
        }
        self.dealloc_inode(inum)?;

        debug!("unlinked {:?} (inode {inum}) from directory {parent}", display_name(name));
        Ok(())
    }
}
