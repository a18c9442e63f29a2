use binrw::binrw;

use crate::layout::OnDisk;
use crate::{BLOCK_SIZE, Error, NAME_MAX_LEN, Result};

/// 目录块中一个目录项，共32字节
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    /// 空闲的目录项为 -1
    inum: i32,
}

impl OnDisk for DirEntry {
    const SIZE: usize = 32;
}

impl DirEntry {
    /// 一个目录块能容纳的目录项个数
    pub const PER_BLOCK: usize = BLOCK_SIZE / Self::SIZE;

    const FREE: i32 = -1;

    /// `name` 须先经过 [`validate_name`]，过长的部分会被截掉
    pub fn new(name: impl AsRef<[u8]>, inum: u32) -> Self {
        let bytes = name.as_ref();
        let len = bytes.len().min(NAME_MAX_LEN);
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..len].copy_from_slice(&bytes[..len]);

        Self {
            name,
            inum: inum as i32,
        }
    }

    #[inline]
    pub fn free() -> Self {
        Self {
            name: [0; NAME_MAX_LEN + 1],
            inum: Self::FREE,
        }
    }

    /// \0 之前的名字字节
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        &self.name[..len]
    }

    /// 目录项指向的 inode；空闲项为空
    #[inline]
    pub fn inode(&self) -> Option<u32> {
        u32::try_from(self.inum).ok()
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.inode().is_none()
    }

    /// 是否为名字为 `name` 的有效项
    #[inline]
    pub fn matches(&self, name: impl AsRef<[u8]>) -> bool {
        !self.is_free() && self.name() == name.as_ref()
    }
}

/// 名字须为 1 到 [`NAME_MAX_LEN`] 字节，且不含 \0 与 `/`；不要求是 UTF-8
pub fn validate_name(name: impl AsRef<[u8]>) -> Result<()> {
    let name = name.as_ref();
    if name.is_empty() || name.len() > NAME_MAX_LEN || name.iter().any(|&c| c == 0 || c == b'/') {
        return Err(Error::InvalidName(display_name(name)));
    }
    Ok(())
}

/// 用于日志与错误信息的名字，非 UTF-8 的字节被替换
pub fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
