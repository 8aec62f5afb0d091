//! # norfs
//!
//! 面向NOR闪存的日志结构文件系统，自上而下：
//!
//! 文件句柄层 | 路径解析层 | 索引节点/数据块层 | 空间回收层 | 磁盘数据结构层 | 闪存访问层
//!
//! 介质上只有追加写：每次变更都是一条带编号与版本的新记录，
//! 同一编号以版本大者为准。挂载时重放全部记录即可重建内存状态，
//! 空间则靠把存活记录搬进暂存区来整片回收。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod base;
mod block;
mod control;
pub mod disk;
mod error;
mod file;
mod flash;
mod format;
mod index;
mod inode;
mod path;
mod pool;
mod restore;
mod space;

pub use enumflags2::BitFlags;
pub use flash_dev::{AreaDesc, FlashDevice};

pub use self::base::{AreaId, ObjId};
pub use self::block::BlockFlag;
pub use self::control::NorFileSystem;
pub use self::error::Error;
pub use self::file::{FileDesc, OpenFlag};
pub use self::inode::InodeFlag;

/// 文件名长度上限（字节）
pub const NAME_MAX_LEN: usize = 16;

/// 单条数据块记录的磁盘总预算：头部加数据
pub const BLOCK_SIZE: usize = 512;

/// 一条数据块记录所能携带的数据量
pub const BLOCK_DATA_LEN: usize = BLOCK_SIZE - disk::DiskBlock::SIZE;

/// 解码时允许的数据长度上限，超出视为损坏
pub(crate) const BLOCK_MAX_DATA_SZ: usize = 2048;

/// 区域数量上限
pub const MAX_AREAS: usize = 32;

pub(crate) const HASH_SIZE: usize = 256;

pub(crate) const INODE_POOL_CAPACITY: usize = 128;
pub(crate) const BLOCK_POOL_CAPACITY: usize = 512;
pub(crate) const FILE_POOL_CAPACITY: usize = 16;
