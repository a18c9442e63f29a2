use std::sync::Arc;

use block_dev::RamDisk;
use ufs::layout::{DirEntry, OnDisk, SuperBlock};
use ufs::{BLOCK_SIZE, DIRECT_COUNT, Error, InodeKind, ROOT_INODE, UnixFileSystem};

fn format(num_inodes: u32, num_data: u32) -> (Arc<RamDisk>, UnixFileSystem) {
    let blocks = SuperBlock::new(num_inodes, num_data).total_blocks();
    let disk = Arc::new(RamDisk::new(BLOCK_SIZE, blocks));
    let fs = UnixFileSystem::format(disk.clone(), num_inodes, num_data).unwrap();
    (disk, fs)
}

fn assert_consistent(fs: &UnixFileSystem) {
    let found = fs.check().unwrap();
    assert!(found.is_empty(), "{found:?}");
}

#[test]
fn round_trip() {
    let (_, mut fs) = format(64, 64);
    fs.creat(ROOT_INODE, InodeKind::File, "a").unwrap();
    let inum = fs.lookup(ROOT_INODE, "a").unwrap();

    fs.write(inum, 0, b"hello, ufs").unwrap();
    assert_eq!(fs.stat(inum).unwrap().size, 10);

    let mut buf = [0; 10];
    fs.read(inum, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"hello, ufs");
    assert_consistent(&fs);
}

#[test]
fn survives_reopen() {
    let (disk, mut fs) = format(64, 64);
    fs.creat(ROOT_INODE, InodeKind::Directory, "etc").unwrap();
    let etc = fs.lookup(ROOT_INODE, "etc").unwrap();
    fs.creat(etc, InodeKind::File, "motd").unwrap();
    let motd = fs.lookup(etc, "motd").unwrap();
    fs.write(motd, 0, b"welcome").unwrap();
    drop(fs);

    let fs = UnixFileSystem::open(disk).unwrap();
    let etc = fs.lookup(ROOT_INODE, "etc").unwrap();
    let motd = fs.lookup(etc, "motd").unwrap();
    let mut buf = [0; 7];
    fs.read(motd, 0, &mut buf).unwrap();
    assert_eq!(&buf, b"welcome");
    assert_consistent(&fs);
}

#[test]
fn idempotent_create() {
    let (_, mut fs) = format(64, 64);
    fs.creat(ROOT_INODE, InodeKind::Directory, "d").unwrap();
    let first = fs.lookup(ROOT_INODE, "d").unwrap();
    let free = fs.free_counts().unwrap();
    let size = fs.stat(ROOT_INODE).unwrap().size;

    fs.creat(ROOT_INODE, InodeKind::Directory, "d").unwrap();
    assert_eq!(fs.lookup(ROOT_INODE, "d").unwrap(), first);
    assert_eq!(fs.free_counts().unwrap(), free);
    assert_eq!(fs.stat(ROOT_INODE).unwrap().size, size);
    assert_consistent(&fs);
}

#[test]
fn unlink_semantics() {
    let (_, mut fs) = format(64, 64);
    fs.creat(ROOT_INODE, InodeKind::Directory, "d").unwrap();
    let d = fs.lookup(ROOT_INODE, "d").unwrap();
    fs.creat(d, InodeKind::File, "f").unwrap();

    assert!(matches!(fs.unlink(ROOT_INODE, "d"), Err(Error::DirectoryNotEmpty(_))));
    fs.unlink(d, "f").unwrap();
    fs.unlink(ROOT_INODE, "d").unwrap();
    assert!(matches!(fs.lookup(ROOT_INODE, "d"), Err(Error::NotFound(_))));

    // 不存在的名字视为已删除
    fs.unlink(ROOT_INODE, "d").unwrap();
    assert_eq!(fs.free_counts().unwrap(), (63, 63));
    assert_consistent(&fs);
}

#[test]
fn unlink_reclaims_every_block() {
    let (_, mut fs) = format(64, 64);
    fs.creat(ROOT_INODE, InodeKind::File, "big").unwrap();
    let big = fs.lookup(ROOT_INODE, "big").unwrap();
    for index in 0..5 {
        fs.write(big, index * BLOCK_SIZE, &[index as u8; BLOCK_SIZE]).unwrap();
    }
    fs.write(big, 5 * BLOCK_SIZE, b"x").unwrap();
    assert_eq!(fs.free_counts().unwrap(), (62, 57));

    fs.unlink(ROOT_INODE, "big").unwrap();
    assert_eq!(fs.free_counts().unwrap(), (63, 63));
    assert_consistent(&fs);
}

#[test]
fn block_spanning_write() {
    let (_, mut fs) = format(64, 64);
    fs.creat(ROOT_INODE, InodeKind::File, "f").unwrap();
    let f = fs.lookup(ROOT_INODE, "f").unwrap();

    fs.write(f, 0, &vec![b'.'; BLOCK_SIZE - 5]).unwrap();
    fs.write(f, BLOCK_SIZE - 5, b"0123456789").unwrap();

    let mut buf = [0; 10];
    fs.read(f, BLOCK_SIZE - 5, &mut buf).unwrap();
    assert_eq!(&buf, b"0123456789");

    let mut head = [0; 5];
    fs.read(f, BLOCK_SIZE - 5, &mut head).unwrap();
    assert_eq!(&head, b"01234");
    let mut tail = [0; 5];
    fs.read(f, BLOCK_SIZE, &mut tail).unwrap();
    assert_eq!(&tail, b"56789");
    assert_consistent(&fs);
}

#[test]
fn file_capacity() {
    let (_, mut fs) = format(8, 64);
    fs.creat(ROOT_INODE, InodeKind::File, "f").unwrap();
    let f = fs.lookup(ROOT_INODE, "f").unwrap();
    for index in 0..DIRECT_COUNT {
        fs.write(f, index * BLOCK_SIZE, &[0xa5; BLOCK_SIZE]).unwrap();
    }

    assert!(matches!(
        fs.write(f, DIRECT_COUNT * BLOCK_SIZE, b"z"),
        Err(Error::CapacityExceeded(_))
    ));
    assert_consistent(&fs);
}

#[test]
fn directory_capacity() {
    let (_, mut fs) = format(256, 8);
    let slots = DirEntry::PER_BLOCK - 2;
    for i in 0..slots {
        fs.creat(ROOT_INODE, InodeKind::File, &format!("file{i}")).unwrap();
    }
    assert_eq!(fs.stat(ROOT_INODE).unwrap().size as usize, DirEntry::PER_BLOCK * DirEntry::SIZE);

    assert!(matches!(
        fs.creat(ROOT_INODE, InodeKind::File, "one-too-many"),
        Err(Error::DirectoryFull(_))
    ));

    // 删掉一项后槽位可以复用
    fs.unlink(ROOT_INODE, "file42").unwrap();
    fs.creat(ROOT_INODE, InodeKind::File, "one-too-many").unwrap();
    assert_consistent(&fs);
}

#[test]
fn exhaustion_leaves_bitmaps_unchanged() {
    let (disk, mut fs) = format(4, 3);
    fs.creat(ROOT_INODE, InodeKind::Directory, "d").unwrap();
    fs.creat(ROOT_INODE, InodeKind::File, "f").unwrap();
    let f = fs.lookup(ROOT_INODE, "f").unwrap();
    fs.write(f, 0, b"data").unwrap();
    assert_eq!(fs.free_counts().unwrap(), (1, 0));

    let image = disk.snapshot();
    let flushes = disk.flushes();

    assert!(matches!(
        fs.creat(ROOT_INODE, InodeKind::Directory, "d2"),
        Err(Error::NoFreeDataBlock)
    ));
    assert!(matches!(
        fs.write(f, 4, &[1; BLOCK_SIZE]),
        Err(Error::NoFreeDataBlock)
    ));
    assert_eq!(fs.free_counts().unwrap(), (1, 0));

    fs.creat(ROOT_INODE, InodeKind::File, "g").unwrap();
    assert!(matches!(
        fs.creat(ROOT_INODE, InodeKind::File, "h"),
        Err(Error::NoFreeInode)
    ));
    assert_eq!(fs.free_counts().unwrap(), (0, 0));

    // 失败的操作没有落盘，成功的创建恰好落盘一次
    assert_eq!(disk.flushes(), flushes + 1);
    assert_ne!(disk.snapshot(), image);
    assert_consistent(&fs);
}

#[test]
fn scripted_sequence_stays_consistent() {
    let (_, mut fs) = format(64, 64);
    for round in 0..4 {
        let dir = format!("dir{round}");
        fs.creat(ROOT_INODE, InodeKind::Directory, &dir).unwrap();
        let d = fs.lookup(ROOT_INODE, &dir).unwrap();
        for i in 0..3 {
            let name = format!("f{i}");
            fs.creat(d, InodeKind::File, &name).unwrap();
            let f = fs.lookup(d, &name).unwrap();
            fs.write(f, 0, &[i as u8; 100]).unwrap();
            fs.write(f, 100, &vec![i as u8; BLOCK_SIZE]).unwrap();
            assert_consistent(&fs);
        }
        if round % 2 == 1 {
            for i in 0..3 {
                fs.unlink(d, &format!("f{i}")).unwrap();
                assert_consistent(&fs);
            }
            fs.unlink(ROOT_INODE, &dir).unwrap();
        }
        assert_consistent(&fs);
    }

    // dir0 与 dir2 各有三个两块的文件
    assert_eq!(fs.free_counts().unwrap(), (63 - 8, 63 - 2 - 12));
}

#[test]
fn only_mutations_flush() {
    let (disk, mut fs) = format(16, 16);
    assert_eq!(disk.flushes(), 1);

    fs.creat(ROOT_INODE, InodeKind::File, "f").unwrap();
    assert_eq!(disk.flushes(), 2);
    let f = fs.lookup(ROOT_INODE, "f").unwrap();
    fs.write(f, 0, b"abc").unwrap();
    assert_eq!(disk.flushes(), 3);

    let mut buf = [0; 3];
    fs.read(f, 0, &mut buf).unwrap();
    fs.stat(f).unwrap();
    fs.lookup(ROOT_INODE, "f").unwrap();
    fs.check().unwrap();
    assert_eq!(disk.flushes(), 3);

    fs.unlink(ROOT_INODE, "f").unwrap();
    assert_eq!(disk.flushes(), 4);

    // 校验失败的修改不落盘
    assert!(fs.unlink(ROOT_INODE, ".").is_err());
    assert!(fs.write(f, 0, b"x").is_err());
    assert_eq!(disk.flushes(), 4);
}
