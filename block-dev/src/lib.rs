//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块的大小由调用者传入的缓冲区长度决定。

use std::any::Any;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()>;

    /// 把此前写入的块持久化到介质上
    fn flush(&self) -> io::Result<()>;
}

/// 以内存为介质的块设备，记录 flush 的次数，
/// 调用者据此得知数据何时会到达介质
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
    flushes: AtomicUsize,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
            flushes: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn blocks(&self) -> usize {
        self.lock().len() / self.block_size
    }

    /// 至今为止 `flush` 的调用次数
    #[inline]
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// 取出整个盘面的拷贝
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        // 持锁期间不会 panic，中毒的锁里的数据依然完整
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn range(&self, block_id: usize, len: usize, total: usize) -> io::Result<std::ops::Range<usize>> {
        if len != self.block_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer of {len} bytes, expected {}", self.block_size),
            ));
        }

        let start = block_id * self.block_size;
        if start + len > total {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("block {block_id} is beyond the end of the disk"),
            ));
        }

        Ok(start..start + len)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> io::Result<()> {
        let data = self.lock();
        let range = self.range(block_id, buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> io::Result<()> {
        let mut data = self.lock();
        let range = self.range(block_id, buf.len(), data.len())?;
        data[range].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let disk = RamDisk::new(512, 8);

        let block = [0x42; 512];
        disk.write_block(3, &block).unwrap();

        let mut buf = [0; 512];
        disk.read_block(3, &mut buf).unwrap();
        assert_eq!(block, buf);

        disk.read_block(2, &mut buf).unwrap();
        assert_eq!([0; 512], buf);
    }

    #[test]
    fn out_of_range() {
        let disk = RamDisk::new(512, 8);
        let mut buf = [0; 512];
        assert!(disk.read_block(8, &mut buf).is_err());
        assert!(disk.write_block(0, &[0; 256]).is_err());
    }

    #[test]
    fn counts_flushes() {
        let disk = RamDisk::new(512, 1);
        assert_eq!(disk.flushes(), 0);
        disk.flush().unwrap();
        disk.flush().unwrap();
        assert_eq!(disk.flushes(), 2);
    }
}
