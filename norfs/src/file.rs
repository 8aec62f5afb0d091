//! # 文件句柄层
//!
//! 句柄把一个打开的文件、读写位置与访问方式捆在一起，
//! 凭据即文件池槽位。目录不经句柄操作。

use alloc::vec;

use enumflags2::{bitflags, BitFlags};

use crate::base::{BlockHandle, InodeHandle};
use crate::control::NorFileSystem;
use crate::disk::DiskBlock;
use crate::error::Error;
use crate::inode::InodeFlag;
use crate::BLOCK_DATA_LEN;

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    Read = 0x01,
    Write = 0x02,
    /// 每次写都落在文件尾
    Append = 0x04,
    /// 打开时清空既有内容
    Truncate = 0x08,
    /// 不存在则创建，父目录必须已在
    Create = 0x10,
}

/// 打开文件的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDesc(pub(crate) usize);

pub(crate) struct FileHandle {
    pub inode: InodeHandle,
    pub offset: u32,
    pub access: BitFlags<OpenFlag>,
}

impl NorFileSystem {
    pub(crate) fn file_open(
        &mut self,
        path: &str,
        flags: BitFlags<OpenFlag>,
    ) -> Result<FileDesc, Error> {
        if !flags.intersects(OpenFlag::Read | OpenFlag::Write) {
            return Err(Error::InvalidInput);
        }
        if flags.intersects(OpenFlag::Append | OpenFlag::Truncate | OpenFlag::Create)
            && !flags.contains(OpenFlag::Write)
        {
            return Err(Error::InvalidInput);
        }

        let (found, parent) = self.path_find(path)?;
        let inode = match found {
            Some(handle) => {
                if self.inode(handle).is_dir() {
                    return Err(Error::InvalidInput);
                }
                if flags.contains(OpenFlag::Truncate) {
                    self.inode_truncate(handle)?;
                }
                handle
            }
            None => {
                if !flags.contains(OpenFlag::Create) {
                    return Err(Error::NotFound);
                }
                let parent = parent.ok_or(Error::NotFound)?;
                let leaf = path.rsplit('/').next().unwrap_or_default();
                self.inode_new(parent, leaf.as_bytes(), false)?
            }
        };

        let fd = self.files.alloc(FileHandle {
            inode,
            offset: 0,
            access: flags,
        })?;
        self.inode_mut(inode).refcnt += 1;
        Ok(FileDesc(fd))
    }

    pub(crate) fn file_close(&mut self, fd: FileDesc) -> Result<(), Error> {
        let inode = self
            .files
            .get_checked(fd.0)
            .ok_or(Error::InvalidInput)?
            .inode;
        self.files.free(fd.0);

        let node = self.inode_mut(inode);
        node.refcnt -= 1;
        let defunct = node.refcnt == 0 && node.flags.contains(InodeFlag::Dummy);

        // unlink时欠下的善后：最后一个句柄关闭才注销数据块
        if defunct {
            if let Some(first) = self.inode(inode).block {
                let last = self.block_list_tail(first);
                self.block_delete_list_from_disk(first, last)?;
                self.block_delete_list_from_ram(inode, first, last);
            }
            let id = self.inode(inode).base.id;
            self.index.remove(id);
            self.inodes.free(inode.0);
        }
        Ok(())
    }

    pub(crate) fn file_seek(&mut self, fd: FileDesc, offset: u32) -> Result<(), Error> {
        let inode = self
            .files
            .get_checked(fd.0)
            .ok_or(Error::InvalidInput)?
            .inode;
        if offset > self.inode(inode).data_len {
            return Err(Error::InvalidInput);
        }

        self.files.get_mut(fd.0).offset = offset;
        Ok(())
    }

    pub(crate) fn file_read(&mut self, fd: FileDesc, buf: &mut [u8]) -> Result<usize, Error> {
        let (inode, offset, access) = {
            let file = self.files.get_checked(fd.0).ok_or(Error::InvalidInput)?;
            (file.inode, file.offset, file.access)
        };
        if !access.contains(OpenFlag::Read) {
            return Err(Error::AccessDenied);
        }

        let read = self.inode_read(inode, offset, buf)?;
        self.files.get_mut(fd.0).offset = offset + read as u32;
        Ok(read)
    }

    pub(crate) fn file_write(&mut self, fd: FileDesc, data: &[u8]) -> Result<usize, Error> {
        let (inode, offset, access) = {
            let file = self.files.get_checked(fd.0).ok_or(Error::InvalidInput)?;
            (file.inode, file.offset, file.access)
        };
        if !access.contains(OpenFlag::Write) {
            return Err(Error::AccessDenied);
        }

        let mut pos = if access.contains(OpenFlag::Append) {
            self.inode(inode).data_len
        } else {
            offset
        };

        let mut written = 0;
        while written < data.len() {
            let chunk = self.write_chunk(inode, pos, &data[written..])?;
            pos += chunk as u32;
            written += chunk;
        }

        self.files.get_mut(fd.0).offset = pos;
        Ok(written)
    }

    /// 单块推进：落在已有块内就覆盖那一块，落在文件尾就添一块
    fn write_chunk(&mut self, inode: InodeHandle, pos: u32, data: &[u8]) -> Result<usize, Error> {
        let (prev, cur, block_off) = self.inode_seek(inode, pos)?;
        match cur {
            Some(handle) => self.write_over_block(inode, handle, block_off, data),
            None => self.write_append_block(inode, prev, data),
        }
    }

    /// 覆盖：旧数据读回、叠上新字节，再以`seq`加一的记录顶替。
    /// 只有末块允许就地增长，中间块胀大会挤歪后续内容。
    fn write_over_block(
        &mut self,
        inode: InodeHandle,
        handle: BlockHandle,
        block_off: usize,
        data: &[u8],
    ) -> Result<usize, Error> {
        let (base, rank, inode_id, old_len, is_last) = {
            let block = self.block(handle);
            (
                block.base,
                block.rank,
                block.inode_id,
                block.data_len as usize,
                block.next.is_none(),
            )
        };

        let capacity = if is_last { BLOCK_DATA_LEN } else { old_len };
        let chunk = data.len().min(capacity - block_off);
        let new_len = old_len.max(block_off + chunk);

        let mut payload = vec![0u8; new_len];
        self.flash.read(
            base.area,
            base.offset + DiskBlock::SIZE as u32,
            &mut payload[..old_len],
        )?;
        payload[block_off..block_off + chunk].copy_from_slice(&data[..chunk]);

        let disk = DiskBlock {
            id: base.id,
            seq: base.seq + 1,
            rank,
            inode_id,
            flags: BitFlags::empty(),
            data_len: new_len as u16,
        };
        let (area, offset) = self.block_write_disk(&disk, &payload)?;

        {
            let block = self.block_mut(handle);
            block.base.seq += 1;
            block.base.area = area;
            block.base.offset = offset;
            block.data_len = new_len as u16;
        }
        self.inode_mut(inode).data_len += (new_len - old_len) as u32;
        Ok(chunk)
    }

    /// 追加：分配新编号、rank接续末块，写完链到文件尾
    fn write_append_block(
        &mut self,
        inode: InodeHandle,
        prev: Option<BlockHandle>,
        data: &[u8],
    ) -> Result<usize, Error> {
        if self.blocks.is_full() {
            return Err(Error::NoMemory);
        }

        let chunk = data.len().min(BLOCK_DATA_LEN);
        let disk = DiskBlock {
            id: self.alloc_id(),
            seq: 0,
            rank: prev.map_or(0, |p| self.block(p).rank + 1),
            inode_id: self.inode(inode).base.id,
            flags: BitFlags::empty(),
            data_len: chunk as u16,
        };
        let (area, offset) = self.block_write_disk(&disk, &data[..chunk])?;

        let handle = self.block_from_disk(&disk, area, offset)?;
        match prev {
            Some(prev) => self.block_mut(prev).next = Some(handle),
            None => self.inode_mut(inode).block = Some(handle),
        }
        self.inode_mut(inode).data_len += chunk as u32;
        Ok(chunk)
    }
}
