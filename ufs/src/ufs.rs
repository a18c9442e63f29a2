//! # 磁盘块管理器层
//!
//! 打开或格式化镜像，并在其上分配、回收 inode 与数据块。

use std::io::Cursor;
use std::sync::Arc;

use binrw::BinRead;
use log::{debug, info};

use crate::image::{BlockId, Image};
use crate::layout::*;
use crate::{BLOCK_SIZE, BlockDevice, Error, ROOT_INODE, Result};

pub struct UnixFileSystem {
    pub(crate) image: Image,
    pub(crate) super_block: SuperBlock,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) data_bitmap: Bitmap,
}

impl UnixFileSystem {
    /// 打开已格式化的镜像，读入其全部块
    pub fn open(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut block = [0; BLOCK_SIZE];
        block_device.read_block(0, &mut block)?;
        let super_block = SuperBlock::read_le(&mut Cursor::new(&block[..SuperBlock::SIZE]))?;
        super_block.validate()?;

        let image = Image::load(block_device, super_block.total_blocks())?;
        let fs = Self::with_image(image, super_block);
        if !fs.inode_allocated(ROOT_INODE)? {
            return Err(Error::Corrupted("root inode is not allocated".into()));
        }

        info!(
            "opened image: {} block(s), {}/{} inode(s) and {}/{} data block(s) in use",
            fs.image.total_blocks(),
            fs.inode_bitmap.count_used(&fs.image, fs.super_block.num_inodes)?,
            fs.super_block.num_inodes,
            fs.data_bitmap.count_used(&fs.image, fs.super_block.num_data)?,
            fs.super_block.num_data,
        );
        Ok(fs)
    }

    /// 在块设备上建立空的文件系统：只有根目录，其中包含 "." 与 ".."。
    ///
    /// 块设备至少要有 `SuperBlock::new(num_inodes, num_data).total_blocks()` 块。
    pub fn format(block_device: Arc<dyn BlockDevice>, num_inodes: u32, num_data: u32) -> Result<Self> {
        let super_block = SuperBlock::new(num_inodes, num_data);
        super_block.validate()?;

        let mut image = Image::zeroed(block_device, super_block.total_blocks());
        image.store(BlockId::SUPER, 0, &super_block)?;
        let mut fs = Self::with_image(image, super_block);

        if fs.alloc_inode()? != ROOT_INODE {
            return Err(Error::Corrupted("root inode must be the first inode".into()));
        }
        let block = fs.alloc_data()?;
        fs.init_dir_block(block, ROOT_INODE, ROOT_INODE)?;

        let mut inode = DiskInode::new(InodeKind::Directory);
        inode.direct[0] = block.into();
        inode.size = 2 * DirEntry::SIZE as u32;
        fs.store_inode(ROOT_INODE, &inode)?;

        fs.image.sync()?;
        info!(
            "formatted image: {} block(s), {num_inodes} inode(s), {num_data} data block(s)",
            fs.image.total_blocks()
        );
        Ok(fs)
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// 编号为 `inum` 的 inode 是否已分配；超出范围的视为未分配
    pub fn inode_allocated(&self, inum: u32) -> Result<bool> {
        if inum >= self.super_block.num_inodes {
            return Ok(false);
        }
        self.inode_bitmap.test(&self.image, inum)
    }

    /// 块是否属于数据区且已分配
    pub fn data_allocated(&self, block: BlockId) -> Result<bool> {
        match self.super_block.data_index(block) {
            Some(index) => self.data_bitmap.test(&self.image, index),
            None => Ok(false),
        }
    }

    /// 空闲的 inode 与数据块个数
    pub fn free_counts(&self) -> Result<(u32, u32)> {
        let sb = &self.super_block;
        let inodes = sb.num_inodes - self.inode_bitmap.count_used(&self.image, sb.num_inodes)?;
        let data = sb.num_data - self.data_bitmap.count_used(&self.image, sb.num_data)?;
        Ok((inodes, data))
    }

    /// 写回尚未持久化的修改并释放镜像
    pub fn close(mut self) -> Result<()> {
        if self.image.is_dirty() {
            self.image.sync()?;
        }
        debug!("image released");
        Ok(())
    }
}

impl UnixFileSystem {
    fn with_image(image: Image, super_block: SuperBlock) -> Self {
        Self {
            inode_bitmap: Bitmap::new(super_block.inode_bitmap(), super_block.inode_bitmap_len),
            data_bitmap: Bitmap::new(super_block.data_bitmap(), super_block.data_bitmap_len),
            image,
            super_block,
        }
    }

    /// 持久化策略：先完成 `f` 中全部的内存修改，成功后整个镜像落盘恰好一次。
    ///
    /// 没有日志，`f` 中途失败时已做的修改不会撤销，也不会落盘，
    /// 直到下一次成功的修改操作把它们一并写回。
    pub(crate) fn persist<V>(&mut self, f: impl FnOnce(&mut Self) -> Result<V>) -> Result<V> {
        let value = f(self)?;
        self.image.sync()?;
        Ok(value)
    }

    /// 分配编号最小的空闲 inode
    pub(crate) fn alloc_inode(&mut self) -> Result<u32> {
        let inum = self
            .inode_bitmap
            .find_free(&self.image, self.super_block.num_inodes)?
            .ok_or(Error::NoFreeInode)?;
        self.inode_bitmap.set(&mut self.image, inum, true)?;
        Ok(inum)
    }

    /// 分配编号最小的空闲数据块并返回其块号，块内容不清零
    pub(crate) fn alloc_data(&mut self) -> Result<BlockId> {
        let index = self
            .data_bitmap
            .find_free(&self.image, self.super_block.num_data)?
            .ok_or(Error::NoFreeDataBlock)?;
        self.data_bitmap.set(&mut self.image, index, true)?;
        Ok(self.super_block.data_block(index))
    }

    pub(crate) fn dealloc_inode(&mut self, inum: u32) -> Result<()> {
        self.inode_bitmap.set(&mut self.image, inum, false)
    }

    pub(crate) fn dealloc_data(&mut self, block: BlockId) -> Result<()> {
        let index = self
            .super_block
            .data_index(block)
            .ok_or_else(|| Error::Corrupted(format!("block {block} is outside of the data region")))?;
        self.data_bitmap.set(&mut self.image, index, false)
    }

    /// 读出 inode，不检查其是否已分配
    pub(crate) fn read_inode(&self, inum: u32) -> Result<DiskInode> {
        if inum >= self.super_block.num_inodes {
            return Err(Error::InvalidInode(inum));
        }
        let (block_id, offset) = self.super_block.inode_pos(inum);
        self.image.map(block_id, offset)
    }

    /// 读出已分配的 inode
    pub(crate) fn inode(&self, inum: u32) -> Result<DiskInode> {
        if !self.inode_allocated(inum)? {
            return Err(Error::InvalidInode(inum));
        }
        self.read_inode(inum)
    }

    pub(crate) fn store_inode(&mut self, inum: u32, inode: &DiskInode) -> Result<()> {
        let (block_id, offset) = self.super_block.inode_pos(inum);
        self.image.store(block_id, offset, inode)
    }

    /// 以某种方式修改 inode
    pub(crate) fn inode_mut<V>(&mut self, inum: u32, f: impl FnOnce(&mut DiskInode) -> V) -> Result<V> {
        let (block_id, offset) = self.super_block.inode_pos(inum);
        self.image.map_mut(block_id, offset, f)
    }

    /// 确认 inode 所指的块确实在数据区内并已分配
    pub(crate) fn owned_block(&self, block: BlockId) -> Result<BlockId> {
        if self.data_allocated(block)? {
            Ok(block)
        } else {
            Err(Error::Corrupted(format!("block {block} is referenced but not allocated")))
        }
    }

    /// 把 `block` 初始化为新目录的目录块："." 指向自己，".." 指向父目录，其余皆空闲
    pub(crate) fn init_dir_block(&mut self, block: BlockId, inum: u32, parent: u32) -> Result<()> {
        self.image.store(block, 0, &DirEntry::new(".", inum))?;
        self.image.store(block, DirEntry::SIZE, &DirEntry::new("..", parent))?;
        for slot in 2..DirEntry::PER_BLOCK {
            self.image.store(block, slot * DirEntry::SIZE, &DirEntry::free())?;
        }
        Ok(())
    }
}
