use std::io::Cursor;

use binrw::{BinRead, BinResult, BinWrite, binrw};

use crate::{BUFFER_SIZE, NAME_MAX_LEN};

/// 请求的操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Lookup = 1,
    Stat = 2,
    Write = 3,
    Read = 4,
    Creat = 5,
    Unlink = 6,
    Shutdown = 7,
}

impl TryFrom<i32> for Operation {
    type Error = i32;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        Ok(match tag {
            1 => Self::Lookup,
            2 => Self::Stat,
            3 => Self::Write,
            4 => Self::Read,
            5 => Self::Creat,
            6 => Self::Unlink,
            7 => Self::Shutdown,
            tag => return Err(tag),
        })
    }
}

/// 文件类型在消息中的编码，与磁盘上 inode 的编码一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Directory = 0,
    RegularFile = 1,
}

impl TryFrom<i32> for FileType {
    type Error = i32;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Directory),
            1 => Ok(Self::RegularFile),
            raw => Err(raw),
        }
    }
}

/// 定长消息，共 [`Message::SIZE`] 字节，小端序。
///
/// 请求与响应使用同一结构，各字段的含义随操作而定：
///
/// | 操作     | 请求字段                        | 响应字段         |
/// |----------|---------------------------------|------------------|
/// | LOOKUP   | `inum`(父目录) `name`           | `rc` `inum`      |
/// | STAT     | `inum`                          | `rc` `kind` `size` |
/// | WRITE    | `inum` `offset` `nbytes` `buffer` | `rc`           |
/// | READ     | `inum` `offset` `nbytes`        | `rc` `buffer`    |
/// | CREAT    | `inum`(父目录) `kind` `name`    | `rc`             |
/// | UNLINK   | `inum`(父目录) `name`           | `rc`             |
/// | SHUTDOWN |                                 | `rc`             |
///
/// `rc` 为0表示成功，负数表示失败。
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub tag: i32,
    pub inum: i32,
    name: [u8; NAME_MAX_LEN + 1],
    pub offset: i32,
    pub nbytes: i32,
    pub buffer: [u8; BUFFER_SIZE],
    pub rc: i32,
    pub kind: i32,
    pub size: i32,
}

impl Message {
    pub const SIZE: usize = 4152;

    /// 除 `tag` 外全部清零的消息
    pub fn new(tag: i32) -> Self {
        Self {
            tag,
            inum: 0,
            name: [0; NAME_MAX_LEN + 1],
            offset: 0,
            nbytes: 0,
            buffer: [0; BUFFER_SIZE],
            rc: 0,
            kind: 0,
            size: 0,
        }
    }

    #[inline]
    pub fn request(operation: Operation) -> Self {
        Self::new(operation as i32)
    }

    /// 对 `request` 的成功响应，其余字段由调用者填写
    #[inline]
    pub fn success(request: &Self) -> Self {
        Self::new(request.tag)
    }

    #[inline]
    pub fn failure(request: &Self) -> Self {
        Self {
            rc: -1,
            ..Self::new(request.tag)
        }
    }

    #[inline]
    pub fn operation(&self) -> Option<Operation> {
        Operation::try_from(self.tag).ok()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.rc >= 0
    }

    /// \0 之前的名字字节，不要求是 UTF-8
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&c| c == 0).unwrap_or(self.name.len());
        &self.name[..len]
    }

    /// 写入名字，超出 [`NAME_MAX_LEN`] 的部分被截掉
    pub fn set_name(&mut self, name: impl AsRef<[u8]>) {
        let bytes = name.as_ref();
        let len = bytes.len().min(NAME_MAX_LEN);
        self.name = [0; NAME_MAX_LEN + 1];
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    /// 负载中由 `nbytes` 指明的有效部分
    pub fn payload(&self) -> Option<&[u8]> {
        usize::try_from(self.nbytes)
            .ok()
            .and_then(|len| self.buffer.get(..len))
    }

    pub fn encode(&self) -> BinResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(Self::SIZE));
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// 解码一个完整的数据报，长度必须恰好为 [`Message::SIZE`]
    pub fn decode(datagram: &[u8]) -> BinResult<Self> {
        if datagram.len() != Self::SIZE {
            return Err(binrw::Error::AssertFail {
                pos: 0,
                message: format!("message of {} bytes, expected {}", datagram.len(), Self::SIZE),
            });
        }
        Self::read(&mut Cursor::new(datagram))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size() {
        let message = Message::request(Operation::Stat);
        assert_eq!(message.encode().unwrap().len(), Message::SIZE);
    }

    #[test]
    fn field_offsets() {
        let mut message = Message::request(Operation::Write);
        message.inum = 2;
        message.set_name("abc");
        message.offset = 0x1234;
        message.nbytes = 3;
        message.buffer[..3].copy_from_slice(b"xyz");
        message.rc = -1;
        message.kind = 1;
        message.size = 77;

        let bytes = message.encode().unwrap();
        assert_eq!(bytes[0..4], 3i32.to_le_bytes());
        assert_eq!(bytes[4..8], 2i32.to_le_bytes());
        assert_eq!(&bytes[8..12], b"abc\0");
        assert_eq!(bytes[36..40], 0x1234i32.to_le_bytes());
        assert_eq!(bytes[40..44], 3i32.to_le_bytes());
        assert_eq!(&bytes[44..47], b"xyz");
        assert_eq!(bytes[4140..4144], (-1i32).to_le_bytes());
        assert_eq!(bytes[4144..4148], 1i32.to_le_bytes());
        assert_eq!(bytes[4148..4152], 77i32.to_le_bytes());

        assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn wrong_length() {
        assert!(Message::decode(&[0; 16]).is_err());
        assert!(Message::decode(&[0; Message::SIZE + 1]).is_err());
    }

    #[test]
    fn names() {
        let mut message = Message::new(0);
        assert_eq!(message.name(), b"");

        message.set_name("a-long-name-that-will-be-truncated");
        assert_eq!(message.name().len(), NAME_MAX_LEN);

        message.set_name("short");
        assert_eq!(message.name(), b"short");

        message.set_name([0xE9, b'a']);
        assert_eq!(message.name(), [0xE9, b'a']);
    }

    #[test]
    fn operations() {
        assert_eq!(Operation::try_from(1), Ok(Operation::Lookup));
        assert_eq!(Operation::try_from(7), Ok(Operation::Shutdown));
        assert_eq!(Operation::try_from(0), Err(0));
        assert_eq!(Message::new(42).operation(), None);
        assert_eq!(FileType::try_from(1), Ok(FileType::RegularFile));
        assert_eq!(FileType::try_from(2), Err(2));
    }

    #[test]
    fn responses() {
        let mut request = Message::request(Operation::Read);
        request.nbytes = 10;
        let ok = Message::success(&request);
        assert!(ok.is_success());
        assert_eq!(ok.tag, request.tag);
        assert_eq!(ok.nbytes, 0);

        let failed = Message::failure(&request);
        assert!(!failed.is_success());
        assert_eq!(failed.tag, request.tag);
        assert_eq!(request.payload().map(<[u8]>::len), Some(10));

        request.nbytes = -1;
        assert_eq!(request.payload(), None);
    }
}
