//! # 文件读写层
//!
//! 一次读写至多一块，但可以跨越相邻的两块。

use log::{debug, trace};

use crate::image::BlockId;
use crate::layout::DiskInode;
use crate::{BLOCK_SIZE, DIRECT_COUNT, Error, Result, UnixFileSystem};

/// 一次读写在文件中覆盖的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// 第一块的直接索引序号
    index: usize,
    /// 第一块内的起始偏移
    inner: usize,
    /// 落在第一块内的字节数
    head: usize,
    /// 落在下一块内的字节数，不跨块时为0
    tail: usize,
}

impl Span {
    fn new(offset: usize, len: usize) -> Result<Self> {
        if len == 0 || len > BLOCK_SIZE {
            return Err(Error::InvalidLength(len));
        }

        let index = offset / BLOCK_SIZE;
        let inner = offset % BLOCK_SIZE;
        let head = len.min(BLOCK_SIZE - inner);

        Ok(Self {
            index,
            inner,
            head,
            tail: len - head,
        })
    }

    /// 涉及的最后一块的直接索引序号
    #[inline]
    fn last(&self) -> usize {
        if self.tail > 0 { self.index + 1 } else { self.index }
    }
}

impl UnixFileSystem {
    /// 从文件 `inum` 的 `offset` 处读满 `buf`。
    ///
    /// `buf` 长度须在 1 到 [`BLOCK_SIZE`] 之间，且不能读过文件末尾。
    pub fn read(&self, inum: u32, offset: usize, buf: &mut [u8]) -> Result<()> {
        let inode = self.file(inum)?;
        let span = Span::new(offset, buf.len())?;

        let end = offset + buf.len();
        if end > inode.size as usize {
            return Err(Error::OutOfBounds {
                offset,
                end,
                size: inode.size as usize,
            });
        }

        let (head, tail) = buf.split_at_mut(span.head);
        let block = self.file_block(&inode, span.index)?;
        head.copy_from_slice(&self.image.block(block)?[span.inner..span.inner + span.head]);
        if span.tail > 0 {
            let block = self.file_block(&inode, span.index + 1)?;
            tail.copy_from_slice(&self.image.block(block)?[..span.tail]);
        }

        trace!("read {} byte(s) at {offset} of inode {inum}", buf.len());
        Ok(())
    }

    /// 把 `buf` 写入文件 `inum` 的 `offset` 处，按需分配数据块。
    ///
    /// 只能在文件末尾之内或恰好在末尾开始写，不会留下空洞；
    /// 文件随写入增长，至多 [`DIRECT_COUNT`] 块。
    pub fn write(&mut self, inum: u32, offset: usize, buf: &[u8]) -> Result<()> {
        self.persist(|fs| fs.write_at(inum, offset, buf))
    }
}

impl UnixFileSystem {
    /// 确认 `inum` 是普通文件
    fn file(&self, inum: u32) -> Result<DiskInode> {
        let inode = self.inode(inum)?;
        if !inode.is_file() {
            return Err(Error::NotAFile(inum));
        }
        Ok(inode)
    }

    /// 文件第 `index` 块，必须已分配
    fn file_block(&self, inode: &DiskInode, index: usize) -> Result<BlockId> {
        let block = inode
            .block(index)
            .ok_or_else(|| Error::Corrupted(format!("block {index} of the file is missing")))?;
        self.owned_block(block)
    }

    /// 取得文件第 `index` 块，没有则分配一块新的；同时返回是否为新分配的
    fn ensure_block(&mut self, inode: &mut DiskInode, index: usize) -> Result<(BlockId, bool)> {
        if let Some(block) = inode.block(index) {
            return Ok((self.owned_block(block)?, false));
        }

        let block = self.alloc_data()?;
        inode.direct[index] = block.into();
        Ok((block, true))
    }

    fn write_at(&mut self, inum: u32, offset: usize, buf: &[u8]) -> Result<()> {
        let mut inode = self.file(inum)?;
        let span = Span::new(offset, buf.len())?;

        let size = inode.size as usize;
        if offset > size {
            return Err(Error::OutOfBounds {
                offset,
                end: offset + buf.len(),
                size,
            });
        }
        if span.last() >= DIRECT_COUNT {
            return Err(Error::CapacityExceeded(span.last()));
        }

        let (first, fresh) = self.ensure_block(&mut inode, span.index)?;
        let second = if span.tail > 0 {
            match self.ensure_block(&mut inode, span.index + 1) {
                Ok((block, _)) => Some(block),
                Err(err) => {
                    // 第二块分配失败时退回刚分配的第一块，位图保持原样
                    if fresh {
                        self.dealloc_data(first)?;
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        let (head, tail) = buf.split_at(span.head);
        self.image.block_mut(first)?[span.inner..span.inner + span.head].copy_from_slice(head);
        if let Some(second) = second {
            self.image.block_mut(second)?[..span.tail].copy_from_slice(tail);
        }

        let end = offset + buf.len();
        inode.size = inode.size.max(end as u32);
        self.store_inode(inum, &inode)?;

        debug!(
            "wrote {} byte(s) at {offset} of inode {inum}, size now {}",
            buf.len(),
            inode.size
        );
        Ok(())
    }
}
