//! # 数据块层
//!
//! 块是文件数据的延伸单元，归属关系记在块身上，
//! 所有权始终在文件的块链一侧。

use enumflags2::{bitflags, BitFlags};

use crate::base::{AreaId, Base, BlockHandle, InodeHandle, ObjId, ObjRef};
use crate::control::NorFileSystem;
use crate::disk::DiskBlock;
use crate::error::Error;

#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFlag {
    /// 删除记录允许、也只有删除记录允许数据长度为零
    Deleted = 0x0001,
}

pub(crate) struct Block {
    pub base: Base,
    /// 所属文件的编号，句柄经索引即时解析
    pub inode_id: ObjId,
    pub next: Option<BlockHandle>,
    pub rank: u32,
    pub data_len: u16,
    pub flags: BitFlags<BlockFlag>,
}

/// 在`(area, offset)`处解码一条数据块记录的定长部分
pub(crate) fn block_read_disk(
    flash: &crate::flash::Flash,
    area: AreaId,
    offset: u32,
) -> Result<DiskBlock, Error> {
    let mut buf = [0u8; DiskBlock::SIZE];
    flash.read(area, offset, &mut buf)?;
    DiskBlock::decode(&buf)
}

impl NorFileSystem {
    /// 预留空间并写出一条数据块记录，返回实际落点
    pub(crate) fn block_write_disk(
        &mut self,
        disk: &DiskBlock,
        data: &[u8],
    ) -> Result<(AreaId, u32), Error> {
        let (area, offset) = self.reserve_space(disk.disk_size())?;
        self.flash.write(area, offset, &disk.encode(data))?;
        Ok((area, offset))
    }

    /// 依据一条已落盘的记录建立内存块并收入索引；块链由调用方接驳
    pub(crate) fn block_from_disk(
        &mut self,
        disk: &DiskBlock,
        area: AreaId,
        offset: u32,
    ) -> Result<BlockHandle, Error> {
        let block = Block {
            base: Base {
                id: disk.id,
                seq: disk.seq,
                area,
                offset,
            },
            inode_id: disk.inode_id,
            next: None,
            rank: disk.rank,
            data_len: disk.data_len,
            flags: disk.flags,
        };

        let handle = BlockHandle(self.blocks.alloc(block)?);
        self.index.insert(disk.id, ObjRef::Block(handle));
        Ok(handle)
    }

    /// 追加只含头部的删除记录：长度为零、带删除标志
    pub(crate) fn block_delete_from_disk(&mut self, handle: BlockHandle) -> Result<(), Error> {
        let (id, seq, rank, inode_id) = {
            let block = self.block(handle);
            (block.base.id, block.base.seq, block.rank, block.inode_id)
        };

        let disk = DiskBlock {
            id,
            seq: seq + 1,
            rank,
            inode_id,
            flags: BlockFlag::Deleted.into(),
            data_len: 0,
        };
        let (area, offset) = self.block_write_disk(&disk, &[])?;

        let block = self.block_mut(handle);
        block.base.seq += 1;
        block.base.area = area;
        block.base.offset = offset;
        Ok(())
    }

    /// 把块按rank升序链入文件，重建时使用
    pub(crate) fn inode_insert_block(&mut self, inode: InodeHandle, block: BlockHandle) {
        let rank = self.block(block).rank;

        let mut prev: Option<BlockHandle> = None;
        let mut cur = self.inode(inode).block;
        while let Some(b) = cur {
            if self.block(b).rank >= rank {
                break;
            }
            prev = Some(b);
            cur = self.block(b).next;
        }

        self.block_mut(block).next = cur;
        match prev {
            Some(prev) => self.block_mut(prev).next = Some(block),
            None => self.inode_mut(inode).block = Some(block),
        }
    }

    /// 块链末端
    pub(crate) fn block_list_tail(&self, first: BlockHandle) -> BlockHandle {
        let mut cur = first;
        while let Some(next) = self.block(cur).next {
            cur = next;
        }
        cur
    }

    /// 为`[first, last]`上的每个块各写一条删除记录
    pub(crate) fn block_delete_list_from_disk(
        &mut self,
        first: BlockHandle,
        last: BlockHandle,
    ) -> Result<(), Error> {
        let mut cur = Some(first);
        while let Some(b) = cur {
            self.block_delete_from_disk(b)?;
            if b == last {
                break;
            }
            cur = self.block(b).next;
        }
        Ok(())
    }

    /// 把`[first, last]`整段摘出块链并释放，文件长度随之回落
    pub(crate) fn block_delete_list_from_ram(
        &mut self,
        inode: InodeHandle,
        first: BlockHandle,
        last: BlockHandle,
    ) {
        // 先找到first的前驱
        let mut prev: Option<BlockHandle> = None;
        let mut cur = self.inode(inode).block;
        while let Some(b) = cur {
            if b == first {
                break;
            }
            prev = Some(b);
            cur = self.block(b).next;
        }
        debug_assert_eq!(Some(first), cur);

        let after = self.block(last).next;
        match prev {
            Some(prev) => self.block_mut(prev).next = after,
            None => self.inode_mut(inode).block = after,
        }

        let mut cur = Some(first);
        while let Some(b) = cur {
            let next = self.block(b).next;
            let (id, len) = {
                let block = self.block(b);
                (block.base.id, block.data_len as u32)
            };
            self.inode_mut(inode).data_len -= len;
            self.index.remove(id);
            self.blocks.free(b.0);

            if b == last {
                break;
            }
            cur = next;
        }
    }
}
