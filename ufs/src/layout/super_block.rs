use binrw::binrw;

use crate::image::BlockId;
use crate::layout::{DiskInode, OnDisk};
use crate::{BLOCK_BITS, BLOCK_SIZE, Error, Result};

/// 每块容纳的 inode 个数
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / DiskInode::SIZE;

/// 超级块：定位其它连续区域，创建镜像后不再改变
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub inode_bitmap_addr: u32,
    pub inode_bitmap_len: u32,
    pub data_bitmap_addr: u32,
    pub data_bitmap_len: u32,
    pub inode_region_addr: u32,
    pub inode_region_len: u32,
    pub data_region_addr: u32,
    pub data_region_len: u32,
    /// inode 总数
    pub num_inodes: u32,
    /// 数据块总数
    pub num_data: u32,
}

impl OnDisk for SuperBlock {
    const SIZE: usize = 40;
}

impl SuperBlock {
    /// 按 inode 数与数据块数紧凑地排布各区域
    pub fn new(num_inodes: u32, num_data: u32) -> Self {
        let inode_bitmap_len = (num_inodes as usize).div_ceil(BLOCK_BITS) as u32;
        let data_bitmap_len = (num_data as usize).div_ceil(BLOCK_BITS) as u32;
        let inode_region_len = (num_inodes as usize).div_ceil(INODES_PER_BLOCK) as u32;

        let inode_bitmap_addr = 1;
        let data_bitmap_addr = inode_bitmap_addr + inode_bitmap_len;
        let inode_region_addr = data_bitmap_addr + data_bitmap_len;
        let data_region_addr = inode_region_addr + inode_region_len;

        Self {
            inode_bitmap_addr,
            inode_bitmap_len,
            data_bitmap_addr,
            data_bitmap_len,
            inode_region_addr,
            inode_region_len,
            data_region_addr,
            data_region_len: num_data,
            num_inodes,
            num_data,
        }
    }

    /// 镜像至少要有的块数：最靠后的区域的末尾
    pub fn total_blocks(&self) -> usize {
        self.regions()
            .iter()
            .map(|&(_, addr, len)| addr as usize + len as usize)
            .max()
            .unwrap_or(1)
    }

    pub fn validate(&self) -> Result<()> {
        let corrupted = |what: String| Err(Error::Corrupted(format!("superblock: {what}")));

        if self.num_inodes == 0 || self.num_data == 0 {
            return corrupted("no inodes or no data blocks".into());
        }
        if (self.inode_bitmap_len as usize) * BLOCK_BITS < self.num_inodes as usize {
            return corrupted("inode bitmap too small".into());
        }
        if (self.data_bitmap_len as usize) * BLOCK_BITS < self.num_data as usize {
            return corrupted("data bitmap too small".into());
        }
        if (self.inode_region_len as usize) * INODES_PER_BLOCK < self.num_inodes as usize {
            return corrupted("inode region too small".into());
        }
        if self.data_region_len < self.num_data {
            return corrupted("data region too small".into());
        }

        let regions = self.regions();
        for (i, &(name, addr, len)) in regions.iter().enumerate() {
            if addr == 0 {
                return corrupted(format!("{name} overlaps the superblock"));
            }
            for &(other, other_addr, other_len) in &regions[i + 1..] {
                if addr < other_addr + other_len && other_addr < addr + len {
                    return corrupted(format!("{name} overlaps {other}"));
                }
            }
        }

        Ok(())
    }

    /// 编号为 `inum` 的 inode 在镜像中的位置：**块ID**以及**块内偏移**
    pub fn inode_pos(&self, inum: u32) -> (BlockId, usize) {
        let block_id = BlockId::new(self.inode_region_addr + inum / INODES_PER_BLOCK as u32);
        let offset = inum as usize % INODES_PER_BLOCK * DiskInode::SIZE;

        (block_id, offset)
    }

    #[inline]
    pub fn inode_bitmap(&self) -> BlockId {
        BlockId::new(self.inode_bitmap_addr)
    }

    #[inline]
    pub fn data_bitmap(&self) -> BlockId {
        BlockId::new(self.data_bitmap_addr)
    }

    /// 数据区内第 `index` 块的块号
    #[inline]
    pub fn data_block(&self, index: u32) -> BlockId {
        BlockId::new(self.data_region_addr + index)
    }

    /// 块号在数据区内的序号；不属于数据区则为空
    pub fn data_index(&self, block: BlockId) -> Option<u32> {
        block
            .get()
            .checked_sub(self.data_region_addr)
            .filter(|&index| index < self.num_data)
    }

    fn regions(&self) -> [(&'static str, u32, u32); 4] {
        [
            ("inode bitmap", self.inode_bitmap_addr, self.inode_bitmap_len),
            ("data bitmap", self.data_bitmap_addr, self.data_bitmap_len),
            ("inode region", self.inode_region_addr, self.inode_region_len),
            ("data region", self.data_region_addr, self.data_region_len),
        ]
    }
}
