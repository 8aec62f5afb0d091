//! # 索引节点层
//!
//! 文件与目录在内存中的持久身份。节点之间以池内槽位相连：
//! 父目录把子项串成一条按文件名升序的兄弟链，
//! 文件把数据块串成一条按rank升序的单链。
//!
//! 磁盘上的每次变更都是一条`seq`加一的新记录；
//! 内存里的`base`始终指向当前生效的那条。

use core::cmp::Ordering;

use enumflags2::{bitflags, BitFlags};

use crate::base::{AreaId, Base, BlockHandle, InodeHandle, ObjId, ObjRef};
use crate::control::NorFileSystem;
use crate::disk::{DiskBlock, DiskInode};
use crate::error::Error;
use crate::flash::Flash;
use crate::NAME_MAX_LEN;

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeFlag {
    /// 最新记录即删除记录
    Deleted = 0x0001,
    /// 占位或暂留：磁盘上没有（或不再有）与内存对应的生效记录
    Dummy = 0x0002,
    Directory = 0x0004,
    Test = 0x0080,
}

/// 文件或目录在内存中的形态
pub(crate) struct Inode {
    pub base: Base,
    pub flags: BitFlags<InodeFlag>,
    /// 打开的句柄数；不为零时删除只做标记
    pub refcnt: u8,
    pub parent: Option<InodeHandle>,
    /// 父目录子项链中的下一个兄弟
    pub sibling: Option<InodeHandle>,
    /// 目录：子项链头
    pub child: Option<InodeHandle>,
    /// 文件：数据块链头
    pub block: Option<BlockHandle>,
    /// 文件：数据总长的缓存，与块链保持一致
    pub data_len: u32,
    pub name_len: u8,
    pub name: [u8; NAME_MAX_LEN],
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.flags.contains(InodeFlag::Directory)
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }
}

/// 在`(area, offset)`处解码一条索引节点记录及其文件名
pub(crate) fn inode_read_disk(
    flash: &Flash,
    area: AreaId,
    offset: u32,
) -> Result<(DiskInode, [u8; NAME_MAX_LEN]), Error> {
    let mut buf = [0u8; DiskInode::SIZE];
    flash.read(area, offset, &mut buf)?;
    let disk = DiskInode::decode(&buf)?;

    let mut name = [0u8; NAME_MAX_LEN];
    flash.read(
        area,
        offset + DiskInode::SIZE as u32,
        &mut name[..disk.filename_len as usize],
    )?;
    Ok((disk, name))
}

/// 把一条索引节点记录写到调用方预留好的位置上
pub(crate) fn inode_write_disk(
    flash: &Flash,
    disk: &DiskInode,
    filename: &[u8],
    area: AreaId,
    offset: u32,
) -> Result<(), Error> {
    flash.write(area, offset, &disk.encode(filename))
}

impl NorFileSystem {
    /// 依据一条已落盘的记录建立内存节点并收入索引
    pub(crate) fn inode_from_disk(
        &mut self,
        disk: &DiskInode,
        name: &[u8],
        area: AreaId,
        offset: u32,
    ) -> Result<InodeHandle, Error> {
        debug_assert_eq!(disk.filename_len as usize, name.len());

        let mut inode = Inode {
            base: Base {
                id: disk.id,
                seq: disk.seq,
                area,
                offset,
            },
            flags: disk.flags,
            refcnt: 0,
            parent: None,
            sibling: None,
            child: None,
            block: None,
            data_len: 0,
            name_len: disk.filename_len,
            name: [0; NAME_MAX_LEN],
        };
        inode.name[..name.len()].copy_from_slice(name);

        let handle = InodeHandle(self.inodes.alloc(inode)?);
        self.index.insert(disk.id, ObjRef::Inode(handle));
        Ok(handle)
    }

    /// 在`parent`下新建文件或目录：写入首条记录并接入目录树
    pub(crate) fn inode_new(
        &mut self,
        parent: InodeHandle,
        name: &[u8],
        is_dir: bool,
    ) -> Result<InodeHandle, Error> {
        if name.is_empty() || name.len() > NAME_MAX_LEN {
            return Err(Error::InvalidInput);
        }
        debug_assert!(self.inode(parent).is_dir());
        if self.dir_lookup(parent, name).is_some() {
            return Err(Error::AlreadyExists);
        }
        if self.inodes.is_full() {
            return Err(Error::NoMemory);
        }

        let id = self.alloc_id();
        let flags: BitFlags<InodeFlag> = if is_dir {
            InodeFlag::Directory.into()
        } else {
            BitFlags::empty()
        };
        let disk = DiskInode {
            id,
            seq: 0,
            parent_id: self.inode(parent).base.id,
            flags,
            filename_len: name.len() as u8,
        };

        let (area, offset) = self.reserve_space(disk.disk_size())?;
        inode_write_disk(&self.flash, &disk, name, area, offset)?;

        let handle = self.inode_from_disk(&disk, name, area, offset)?;
        self.inode_add_child(parent, handle)?;
        Ok(handle)
    }

    /// 以当前内存状态追加一条`seq`加一的覆盖记录
    pub(crate) fn inode_update_disk(&mut self, handle: InodeHandle) -> Result<(), Error> {
        let (id, seq, flags, name_len, name) = {
            let node = self.inode(handle);
            debug_assert!(!node.flags.contains(InodeFlag::Deleted));
            (node.base.id, node.base.seq, node.flags, node.name_len, node.name)
        };
        let parent_id = self.inode_parent_id(handle);

        let disk = DiskInode {
            id,
            seq: seq + 1,
            parent_id,
            flags,
            filename_len: name_len,
        };
        let (area, offset) = self.reserve_space(disk.disk_size())?;
        inode_write_disk(&self.flash, &disk, &name[..name_len as usize], area, offset)?;

        let node = self.inode_mut(handle);
        node.base.seq += 1;
        node.base.area = area;
        node.base.offset = offset;
        Ok(())
    }

    /// 追加删除记录。记录自带全部语义，旧记录原样留待回收。
    pub(crate) fn inode_delete_from_disk(&mut self, handle: InodeHandle) -> Result<(), Error> {
        let (id, seq, flags) = {
            let node = self.inode(handle);
            (node.base.id, node.base.seq, node.flags)
        };
        let parent_id = self.inode_parent_id(handle);

        let disk = DiskInode {
            id,
            seq: seq + 1,
            parent_id,
            flags: flags | InodeFlag::Deleted,
            filename_len: 0,
        };
        let (area, offset) = self.reserve_space(disk.disk_size())?;
        inode_write_disk(&self.flash, &disk, &[], area, offset)?;

        let node = self.inode_mut(handle);
        node.base.seq += 1;
        node.base.area = area;
        node.base.offset = offset;
        Ok(())
    }

    /// 从内存中拆掉节点。
    ///
    /// 仍有句柄在引用时只摘链并标记，块的善后推迟到最后一次关闭；
    /// 否则目录递归拆除子项，文件释放整条块链。
    pub(crate) fn inode_delete_from_ram(&mut self, handle: InodeHandle) {
        self.inode_remove_child(handle);

        if self.inode(handle).refcnt > 0 {
            self.inode_mut(handle).flags |= InodeFlag::Deleted | InodeFlag::Dummy;
            return;
        }

        if self.inode(handle).is_dir() {
            while let Some(child) = self.inode(handle).child {
                self.inode_delete_from_ram(child);
            }
        } else if let Some(first) = self.inode(handle).block {
            let last = self.block_list_tail(first);
            self.block_delete_list_from_ram(handle, first, last);
        }

        let id = self.inode(handle).base.id;
        self.index.remove(id);
        self.inodes.free(handle.0);
    }

    pub(crate) fn inode_parent_id(&self, handle: InodeHandle) -> ObjId {
        match self.inode(handle).parent {
            Some(parent) => self.inode(parent).base.id,
            None => ObjId::NONE,
        }
    }

    /// 目录下按名查找子项
    pub(crate) fn dir_lookup(&self, dir: InodeHandle, name: &[u8]) -> Option<InodeHandle> {
        let mut cur = self.inode(dir).child;
        while let Some(child) = cur {
            if self.inode(child).name() == name {
                return Some(child);
            }
            cur = self.inode(child).sibling;
        }
        None
    }

    /// 把子项按文件名升序链入父目录；重名拒绝。
    /// 字节逐个比较，等长前缀相同时短名在前。
    pub(crate) fn inode_add_child(
        &mut self,
        parent: InodeHandle,
        child: InodeHandle,
    ) -> Result<(), Error> {
        debug_assert!(self.inode(parent).is_dir());

        let mut prev: Option<InodeHandle> = None;
        let mut cur = self.inode(parent).child;
        while let Some(c) = cur {
            match self.inode(c).name().cmp(self.inode(child).name()) {
                Ordering::Less => {
                    prev = Some(c);
                    cur = self.inode(c).sibling;
                }
                Ordering::Equal => return Err(Error::AlreadyExists),
                Ordering::Greater => break,
            }
        }

        self.link_child(parent, prev, child, cur);
        Ok(())
    }

    /// [`Self::inode_add_child`]的重建版本：
    /// 插入次序以磁盘上的文件名为准，两端都从闪存读回再比较。
    pub(crate) fn inode_add_child_from_disk(
        &mut self,
        parent: InodeHandle,
        child: InodeHandle,
    ) -> Result<(), Error> {
        let mut prev: Option<InodeHandle> = None;
        let mut cur = self.inode(parent).child;
        while let Some(c) = cur {
            match self.inode_filename_cmp_flash(c, child)? {
                Ordering::Less => {
                    prev = Some(c);
                    cur = self.inode(c).sibling;
                }
                Ordering::Equal => return Err(Error::AlreadyExists),
                Ordering::Greater => break,
            }
        }

        self.link_child(parent, prev, child, cur);
        Ok(())
    }

    fn link_child(
        &mut self,
        parent: InodeHandle,
        prev: Option<InodeHandle>,
        child: InodeHandle,
        next: Option<InodeHandle>,
    ) {
        let node = self.inode_mut(child);
        node.sibling = next;
        node.parent = Some(parent);
        match prev {
            Some(prev) => self.inode_mut(prev).sibling = Some(child),
            None => self.inode_mut(parent).child = Some(child),
        }
    }

    /// 把子项摘出父目录的子项链；未挂链时无事发生
    pub(crate) fn inode_remove_child(&mut self, child: InodeHandle) {
        let Some(parent) = self.inode(child).parent else {
            return;
        };

        let mut prev: Option<InodeHandle> = None;
        let mut cur = self.inode(parent).child;
        while let Some(c) = cur {
            if c == child {
                let next = self.inode(c).sibling;
                match prev {
                    Some(prev) => self.inode_mut(prev).sibling = next,
                    None => self.inode_mut(parent).child = next,
                }
                break;
            }
            prev = Some(c);
            cur = self.inode(c).sibling;
        }

        let node = self.inode_mut(child);
        node.parent = None;
        node.sibling = None;
    }

    /// 沿块链找到容纳`offset`的数据块。
    ///
    /// 返回`(前驱, 所在块, 块内偏移)`；`offset`等于文件长度时
    /// 所在块为空、前驱为末块，刚好是追加的落点。
    pub(crate) fn inode_seek(
        &self,
        handle: InodeHandle,
        offset: u32,
    ) -> Result<(Option<BlockHandle>, Option<BlockHandle>, usize), Error> {
        let node = self.inode(handle);
        if offset > node.data_len {
            return Err(Error::InvalidInput);
        }

        let mut prev = None;
        let mut cur = node.block;
        let mut pos = 0u32;
        while let Some(b) = cur {
            let len = self.block(b).data_len as u32;
            if offset < pos + len {
                return Ok((prev, Some(b), (offset - pos) as usize));
            }
            pos += len;
            prev = Some(b);
            cur = self.block(b).next;
        }

        Ok((prev, None, 0))
    }

    /// 自`offset`起连续读取，不足`buf.len()`时以实际读得为准。
    /// 数据不驻留内存，逐块即时从闪存取回。
    pub(crate) fn inode_read(
        &self,
        handle: InodeHandle,
        offset: u32,
        buf: &mut [u8],
    ) -> Result<usize, Error> {
        if offset >= self.inode(handle).data_len {
            return Ok(0);
        }
        let (_, mut cur, mut skip) = self.inode_seek(handle, offset)?;

        let mut read = 0;
        while read < buf.len() {
            let Some(b) = cur else { break };
            let block = self.block(b);
            let take = (buf.len() - read).min(block.data_len as usize - skip);
            self.flash.read(
                block.base.area,
                block.base.offset + DiskBlock::SIZE as u32 + skip as u32,
                &mut buf[read..read + take],
            )?;
            read += take;
            cur = block.next;
            skip = 0;
        }

        Ok(read)
    }

    /// 重算文件长度，用于重建后校正缓存
    pub(crate) fn inode_calc_data_length(&self, handle: InodeHandle) -> u32 {
        let mut len = 0;
        let mut cur = self.inode(handle).block;
        while let Some(b) = cur {
            len += self.block(b).data_len as u32;
            cur = self.block(b).next;
        }
        len
    }

    /// 文件名的磁盘对磁盘比较：两端都从各自的生效记录读回
    pub(crate) fn inode_filename_cmp_flash(
        &self,
        a: InodeHandle,
        b: InodeHandle,
    ) -> Result<Ordering, Error> {
        let (a_base, a_len) = {
            let node = self.inode(a);
            (node.base, node.name_len as usize)
        };
        let (b_base, b_len) = {
            let node = self.inode(b);
            (node.base, node.name_len as usize)
        };

        let mut a_name = [0u8; NAME_MAX_LEN];
        let mut b_name = [0u8; NAME_MAX_LEN];
        self.flash.read(
            a_base.area,
            a_base.offset + DiskInode::SIZE as u32,
            &mut a_name[..a_len],
        )?;
        self.flash.read(
            b_base.area,
            b_base.offset + DiskInode::SIZE as u32,
            &mut b_name[..b_len],
        )?;

        Ok(a_name[..a_len].cmp(&b_name[..b_len]))
    }

    /// 清空文件：先落一条覆盖记录，再注销全部数据块
    pub(crate) fn inode_truncate(&mut self, handle: InodeHandle) -> Result<(), Error> {
        self.inode_update_disk(handle)?;

        if let Some(first) = self.inode(handle).block {
            let last = self.block_list_tail(first);
            self.block_delete_list_from_disk(first, last)?;
            self.block_delete_list_from_ram(handle, first, last);
        }
        debug_assert_eq!(0, self.inode(handle).data_len);
        Ok(())
    }
}
