//! 对象标识与磁盘定位

use derive_more::{Display, From, Into};

/// 对象编号：索引节点与数据块共用同一编号空间，全局单调分配
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct ObjId(u32);

impl ObjId {
    /// 根目录固定占用编号0
    pub const ROOT: Self = Self(0);

    /// 空编号，作根目录的父编号等哨兵用
    pub const NONE: Self = Self(0xffff_ffff);

    pub(crate) const fn bucket(self) -> usize {
        self.0 as usize % crate::HASH_SIZE
    }
}

/// 区域的逻辑编号，即描述符表的下标
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct AreaId(u16);

impl AreaId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

/// 两类对象在内存与磁盘间共有的部分：
/// 编号、覆盖版本以及当前生效记录的落点。
#[derive(Debug, Clone, Copy)]
pub(crate) struct Base {
    pub id: ObjId,
    pub seq: u32,
    pub area: AreaId,
    pub offset: u32,
}

/// 池中对象的指代
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ObjRef {
    Inode(InodeHandle),
    Block(BlockHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InodeHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockHandle(pub usize);
