//! # 一致性检查
//!
//! 从根目录出发遍历整棵目录树，核对位图与引用关系：
//! 每个已分配的 inode 恰好被一个目录项引用，每个已分配的数据块
//! 恰好属于一个 inode；未分配的则不被任何东西引用。

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use derive_more::Display;
use log::debug;

use crate::image::BlockId;
use crate::layout::{DirEntry, DiskInode, OnDisk, display_name};
use crate::{BLOCK_SIZE, MAX_FILE_SIZE, ROOT_INODE, Result, UnixFileSystem};

/// 检查发现的一处不一致
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Inconsistency {
    #[display(fmt = "inode {} is allocated but unreachable", _0)]
    UnreferencedInode(u32),
    #[display(fmt = "inode {} is referenced by {} entries", inum, count)]
    MultiplyReferencedInode { inum: u32, count: usize },
    #[display(fmt = "entry {:?} in directory {} points at free inode {}", name, dir, inum)]
    DanglingEntry { dir: u32, name: String, inum: u32 },
    #[display(fmt = "block {} is allocated but owned by no inode", _0)]
    UnownedBlock(BlockId),
    #[display(fmt = "block {} is owned by more than one inode, again by {}", block, inum)]
    SharedBlock { block: BlockId, inum: u32 },
    #[display(fmt = "inode {} points at unallocated block {}", inum, block)]
    DanglingPointer { inum: u32, block: BlockId },
    #[display(fmt = "inode {} has an impossible size {}", inum, size)]
    WrongSize { inum: u32, size: u32 },
}

#[derive(Default)]
struct Walk {
    /// inode 编号到引用它的目录项个数
    references: BTreeMap<u32, usize>,
    owned: BTreeSet<BlockId>,
    found: Vec<Inconsistency>,
}

impl UnixFileSystem {
    /// 核对整个镜像，返回发现的所有不一致；一致的镜像返回空表
    pub fn check(&self) -> Result<Vec<Inconsistency>> {
        let mut walk = Walk::default();
        walk.references.insert(ROOT_INODE, 1);

        let mut queue = VecDeque::from([ROOT_INODE]);
        while let Some(inum) = queue.pop_front() {
            let inode = self.read_inode(inum)?;
            self.check_blocks(inum, &inode, &mut walk)?;

            if inode.is_dir() {
                for child in self.check_directory(inum, &inode, &mut walk)? {
                    queue.push_back(child);
                }
            } else if inode.size as usize > MAX_FILE_SIZE
                || (0..(inode.size as usize).div_ceil(BLOCK_SIZE)).any(|index| inode.block(index).is_none())
            {
                walk.found.push(Inconsistency::WrongSize { inum, size: inode.size });
            }
        }

        for inum in 0..self.super_block.num_inodes {
            if !self.inode_allocated(inum)? {
                continue;
            }
            match walk.references.get(&inum) {
                None => walk.found.push(Inconsistency::UnreferencedInode(inum)),
                Some(&count) if count > 1 => walk
                    .found
                    .push(Inconsistency::MultiplyReferencedInode { inum, count }),
                Some(_) => {}
            }
        }

        for index in 0..self.super_block.num_data {
            let block = self.super_block.data_block(index);
            if self.data_bitmap.test(&self.image, index)? && !walk.owned.contains(&block) {
                walk.found.push(Inconsistency::UnownedBlock(block));
            }
        }

        debug!("check finished, {} inconsistency(ies)", walk.found.len());
        Ok(walk.found)
    }
}

impl UnixFileSystem {
    fn check_blocks(&self, inum: u32, inode: &DiskInode, walk: &mut Walk) -> Result<()> {
        for block in inode.blocks() {
            if !self.data_allocated(block)? {
                walk.found.push(Inconsistency::DanglingPointer { inum, block });
            } else if !walk.owned.insert(block) {
                walk.found.push(Inconsistency::SharedBlock { block, inum });
            }
        }
        Ok(())
    }

    /// 记录目录中各项的引用，返回第一次遇到的子 inode
    fn check_directory(&self, inum: u32, inode: &DiskInode, walk: &mut Walk) -> Result<Vec<u32>> {
        let Some(block) = inode.block(0).filter(|&block| walk.owned.contains(&block)) else {
            walk.found.push(Inconsistency::WrongSize { inum, size: inode.size });
            return Ok(Vec::new());
        };

        let mut live = 0;
        let mut children = Vec::new();
        for slot in 0..DirEntry::PER_BLOCK {
            let entry: DirEntry = self.image.map(block, slot * DirEntry::SIZE)?;
            let Some(child) = entry.inode() else {
                continue;
            };
            live += 1;

            if !self.inode_allocated(child)? {
                walk.found.push(Inconsistency::DanglingEntry {
                    dir: inum,
                    name: display_name(entry.name()),
                    inum: child,
                });
                continue;
            }
            if entry.name() == b"." || entry.name() == b".." {
                continue;
            }

            let count = walk.references.entry(child).or_default();
            *count += 1;
            if *count == 1 {
                children.push(child);
            }
        }

        if inode.size as usize != live * DirEntry::SIZE {
            walk.found.push(Inconsistency::WrongSize { inum, size: inode.size });
        }
        Ok(children)
    }
}
