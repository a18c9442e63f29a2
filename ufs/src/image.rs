//! # 镜像层
//!
//! 整个文件系统镜像在内存中的映射。所有块在打开时一次性读入，
//! 之后的读写都只发生在内存里；被修改过的块记为脏块，
//! 只有 [`Image::sync`] 才会把它们写回块设备并要求设备落盘。
//!
//! 对块内数据结构的访问一律经过 [`Image::map`] / [`Image::map_mut`]，
//! 它们按固定布局解码、编码，并做越界检查。

use std::io::Cursor;
use std::sync::Arc;

use binrw::{BinRead, BinWrite};
use derive_more::{Display, From, Into};
use log::trace;

use crate::layout::OnDisk;
use crate::{BLOCK_SIZE, BlockDevice, DataBlock, Error, Result};

/// 镜像内的绝对块号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// 超级块恒为0号块
    pub const SUPER: Self = Self(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl core::ops::Add<u32> for BlockId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

pub struct Image {
    block_device: Arc<dyn BlockDevice>,
    blocks: Vec<Box<DataBlock>>,
    /// 与 `blocks` 一一对应，是否为脏块
    dirty: Vec<bool>,
}

impl Image {
    /// 从块设备读入前 `total_blocks` 个块
    pub fn load(block_device: Arc<dyn BlockDevice>, total_blocks: usize) -> Result<Self> {
        let mut blocks = Vec::with_capacity(total_blocks);
        for block_id in 0..total_blocks {
            let mut block = Box::new([0; BLOCK_SIZE]);
            block_device.read_block(block_id, block.as_mut_slice())?;
            blocks.push(block);
        }

        Ok(Self {
            block_device,
            blocks,
            dirty: vec![false; total_blocks],
        })
    }

    /// 全零的镜像，所有块都是脏块，首次同步会覆盖整个设备
    pub fn zeroed(block_device: Arc<dyn BlockDevice>, total_blocks: usize) -> Self {
        Self {
            block_device,
            blocks: (0..total_blocks).map(|_| Box::new([0; BLOCK_SIZE])).collect(),
            dirty: vec![true; total_blocks],
        }
    }

    #[inline]
    pub fn total_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> Result<&DataBlock> {
        self.blocks
            .get(id.get() as usize)
            .map(|block| &**block)
            .ok_or_else(|| Self::beyond(id))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut DataBlock> {
        let index = id.get() as usize;
        let block = self.blocks.get_mut(index).ok_or_else(|| Self::beyond(id))?;
        self.dirty[index] = true;
        Ok(&mut **block)
    }

    /// 解码块内 `offset` 处的数据结构
    pub fn map<T>(&self, id: BlockId, offset: usize) -> Result<T>
    where
        T: OnDisk + for<'a> BinRead<Args<'a> = ()>,
    {
        let range = Self::range::<T>(offset)?;
        let block = self.block(id)?;
        Ok(T::read_le_args(&mut Cursor::new(&block[range]), ())?)
    }

    /// 解码块内 `offset` 处的数据结构，修改后写回原处
    pub fn map_mut<T, V>(&mut self, id: BlockId, offset: usize, f: impl FnOnce(&mut T) -> V) -> Result<V>
    where
        T: OnDisk + for<'a> BinRead<Args<'a> = ()> + for<'a> BinWrite<Args<'a> = ()>,
    {
        let mut value = self.map::<T>(id, offset)?;
        let ret = f(&mut value);
        self.store(id, offset, &value)?;
        Ok(ret)
    }

    /// 把数据结构编码到块内 `offset` 处
    pub fn store<T>(&mut self, id: BlockId, offset: usize, value: &T) -> Result<()>
    where
        T: OnDisk + for<'a> BinWrite<Args<'a> = ()>,
    {
        let range = Self::range::<T>(offset)?;
        let block = self.block_mut(id)?;
        value.write_le_args(&mut Cursor::new(&mut block[range]), ())?;
        Ok(())
    }

    /// 是否有尚未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|&dirty| dirty)
    }

    /// 写回所有脏块，随后要求块设备落盘
    pub fn sync(&mut self) -> Result<()> {
        let mut written = 0;
        for (block_id, (block, dirty)) in self.blocks.iter().zip(self.dirty.iter_mut()).enumerate() {
            if *dirty {
                self.block_device.write_block(block_id, block.as_slice())?;
                *dirty = false;
                written += 1;
            }
        }
        self.block_device.flush()?;
        trace!("image synced, {written} block(s) written");

        Ok(())
    }
}

impl Image {
    fn range<T: OnDisk>(offset: usize) -> Result<core::ops::Range<usize>> {
        let end = offset + T::SIZE;
        if end > BLOCK_SIZE {
            return Err(Error::Corrupted(format!(
                "{} bytes at offset {offset} cross the block boundary",
                T::SIZE
            )));
        }
        Ok(offset..end)
    }

    fn beyond(id: BlockId) -> Error {
        Error::Corrupted(format!("block {id} is beyond the end of the image"))
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;
    use crate::layout::DirEntry;

    #[test]
    fn map_and_store() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 4));
        let mut image = Image::load(disk.clone(), 4).unwrap();
        assert!(!image.is_dirty());

        image
            .store(BlockId::new(2), DirEntry::SIZE, &DirEntry::new("hello", 7))
            .unwrap();
        assert!(image.is_dirty());

        let entry: DirEntry = image.map(BlockId::new(2), DirEntry::SIZE).unwrap();
        assert_eq!(entry.name(), b"hello");
        assert_eq!(entry.inode(), Some(7));

        // 落盘之前设备上还是旧数据
        assert_eq!(disk.snapshot()[2 * BLOCK_SIZE + DirEntry::SIZE], 0);
        image.sync().unwrap();
        assert_eq!(disk.snapshot()[2 * BLOCK_SIZE + DirEntry::SIZE], b'h');
        assert_eq!(disk.flushes(), 1);
        assert!(!image.is_dirty());
    }

    #[test]
    fn map_mut_writes_back() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 1));
        let mut image = Image::load(disk, 1).unwrap();
        image.store(BlockId::SUPER, 0, &DirEntry::new("a", 1)).unwrap();

        let old = image
            .map_mut(BlockId::SUPER, 0, |entry: &mut DirEntry| {
                let old = entry.inode();
                *entry = DirEntry::free();
                old
            })
            .unwrap();
        assert_eq!(old, Some(1));
        assert!(image.map::<DirEntry>(BlockId::SUPER, 0).unwrap().is_free());
    }

    #[test]
    fn bounds_are_checked() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 2));
        let mut image = Image::load(disk, 2).unwrap();

        assert!(image.block(BlockId::new(2)).is_err());
        assert!(image.block_mut(BlockId::new(5)).is_err());
        assert!(
            image
                .map::<DirEntry>(BlockId::new(1), BLOCK_SIZE - DirEntry::SIZE + 1)
                .is_err()
        );
        assert!(!image.is_dirty());
    }
}
