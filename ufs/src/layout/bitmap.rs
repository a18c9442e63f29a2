use crate::image::{BlockId, Image};
use crate::{BLOCK_BITS, Error, Result};

/// 位图区域内的一个字，镜像中按小端序存放
const WORD_BITS: usize = u32::BITS as usize;

/// 位图区域，记录其指示区域（inode 或数据块）的分配情况，1 表示已占用。
///
/// 每个 32 位字内从最高位开始编号：第 `p` 位位于第 `p / 32` 个字的
/// 第 `31 - p % 32` 位。
#[derive(Debug, Clone, Copy)]
pub struct Bitmap {
    /// 位图的起始块
    start_block: BlockId,
    /// 位图占用块数
    blocks: u32,
}

/// 某一位在位图区域中的位置
struct BitPos {
    block: BlockId,
    byte: usize,
    mask: u8,
}

impl Bitmap {
    #[inline]
    pub fn new(start_block: BlockId, blocks: u32) -> Self {
        Self {
            start_block,
            blocks,
        }
    }

    /// 位图能记录的总位数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks as usize * BLOCK_BITS
    }

    pub fn test(&self, image: &Image, pos: u32) -> Result<bool> {
        let BitPos { block, byte, mask } = self.locate(pos)?;
        Ok(image.block(block)?[byte] & mask != 0)
    }

    pub fn set(&self, image: &mut Image, pos: u32, used: bool) -> Result<()> {
        let BitPos { block, byte, mask } = self.locate(pos)?;
        let byte = &mut image.block_mut(block)?[byte];
        if used {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        Ok(())
    }

    /// 从 0 开始线性扫描，返回 `limit` 之前编号最小的空闲位
    pub fn find_free(&self, image: &Image, limit: u32) -> Result<Option<u32>> {
        let limit = (limit as usize).min(self.capacity());

        for block_index in 0..self.blocks {
            let block = image.block(self.start_block + block_index)?;
            let base = block_index as usize * BLOCK_BITS;

            // 找到第一个还有0的字；字内最高位是编号最小的位
            let found = block
                .chunks_exact(WORD_BITS / 8)
                .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
                .enumerate()
                .find_map(|(word_index, bits)| {
                    (bits != u32::MAX)
                        .then(|| base + word_index * WORD_BITS + bits.leading_ones() as usize)
                });

            match found {
                Some(pos) if pos < limit => return Ok(Some(pos as u32)),
                // 更小的编号都已占用
                Some(_) => return Ok(None),
                None if base + BLOCK_BITS >= limit => return Ok(None),
                None => continue,
            }
        }

        Ok(None)
    }

    /// `limit` 之前已占用的位数
    pub fn count_used(&self, image: &Image, limit: u32) -> Result<u32> {
        let mut used = 0;
        for pos in 0..limit {
            if self.test(image, pos)? {
                used += 1;
            }
        }
        Ok(used)
    }

    fn locate(&self, pos: u32) -> Result<BitPos> {
        let pos = pos as usize;
        if pos >= self.capacity() {
            return Err(Error::Corrupted(format!(
                "bit {pos} is outside of a bitmap of {} bits",
                self.capacity()
            )));
        }

        let block_index = pos / BLOCK_BITS;
        let bit = pos % BLOCK_BITS;
        // 字内从最高位开始编号
        let shift = WORD_BITS - 1 - bit % WORD_BITS;

        Ok(BitPos {
            block: self.start_block + block_index as u32,
            byte: bit / WORD_BITS * (WORD_BITS / 8) + shift / 8,
            mask: 1 << (shift % 8),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::RamDisk;

    use super::*;
    use crate::BLOCK_SIZE;

    fn image(blocks: usize) -> Image {
        Image::load(Arc::new(RamDisk::new(BLOCK_SIZE, blocks)), blocks).unwrap()
    }

    #[test]
    fn set_and_test() {
        let mut image = image(2);
        let bitmap = Bitmap::new(BlockId::new(1), 1);

        bitmap.set(&mut image, 0, true).unwrap();
        bitmap.set(&mut image, 33, true).unwrap();
        assert!(bitmap.test(&image, 0).unwrap());
        assert!(bitmap.test(&image, 33).unwrap());
        assert!(!bitmap.test(&image, 1).unwrap());

        bitmap.set(&mut image, 0, false).unwrap();
        assert!(!bitmap.test(&image, 0).unwrap());
    }

    #[test]
    fn most_significant_bit_first() {
        let mut image = image(2);
        let bitmap = Bitmap::new(BlockId::new(1), 1);

        bitmap.set(&mut image, 0, true).unwrap();
        bitmap.set(&mut image, 31, true).unwrap();
        bitmap.set(&mut image, 32, true).unwrap();

        let block = image.block(BlockId::new(1)).unwrap();
        assert_eq!(u32::from_le_bytes(block[0..4].try_into().unwrap()), 0x8000_0001);
        assert_eq!(u32::from_le_bytes(block[4..8].try_into().unwrap()), 0x8000_0000);
    }

    #[test]
    fn find_lowest_free() {
        let mut image = image(2);
        let bitmap = Bitmap::new(BlockId::new(1), 1);

        assert_eq!(bitmap.find_free(&image, 64).unwrap(), Some(0));
        for pos in 0..40 {
            bitmap.set(&mut image, pos, true).unwrap();
        }
        assert_eq!(bitmap.find_free(&image, 64).unwrap(), Some(40));

        bitmap.set(&mut image, 7, false).unwrap();
        assert_eq!(bitmap.find_free(&image, 64).unwrap(), Some(7));
    }

    #[test]
    fn find_free_respects_limit() {
        let mut image = image(2);
        let bitmap = Bitmap::new(BlockId::new(1), 1);

        for pos in 0..32 {
            bitmap.set(&mut image, pos, true).unwrap();
        }
        assert_eq!(bitmap.find_free(&image, 32).unwrap(), None);
        assert_eq!(bitmap.find_free(&image, 33).unwrap(), Some(32));
        assert_eq!(bitmap.count_used(&image, 40).unwrap(), 32);
    }

    #[test]
    fn spans_blocks() {
        let mut image = image(3);
        let bitmap = Bitmap::new(BlockId::new(1), 2);

        for pos in 0..BLOCK_BITS as u32 {
            bitmap.set(&mut image, pos, true).unwrap();
        }
        let limit = BLOCK_BITS as u32 + 10;
        assert_eq!(bitmap.find_free(&image, limit).unwrap(), Some(BLOCK_BITS as u32));
        assert_eq!(bitmap.find_free(&image, BLOCK_BITS as u32).unwrap(), None);
        assert!(bitmap.test(&image, 2 * BLOCK_BITS as u32).is_err());
    }
}
