use alloc::vec::Vec;

use enumflags2::BitFlags;

use super::{ECC_PLACEHOLDER, INODE_MAGIC};
use crate::base::ObjId;
use crate::error::Error;
use crate::inode::InodeFlag;
use crate::NAME_MAX_LEN;

/// 索引节点记录的定长部分，其后紧跟文件名。
///
/// 同一编号的记录以`seq`大者为准；
/// 带删除标志的记录本身即是删除操作，旧记录从不回写。
#[derive(Debug, Clone, Copy)]
pub struct DiskInode {
    pub id: ObjId,
    pub seq: u32,
    pub parent_id: ObjId,
    pub flags: BitFlags<InodeFlag>,
    pub filename_len: u8,
}

impl DiskInode {
    pub const SIZE: usize = 23;

    /// 含文件名的记录总长
    pub fn disk_size(&self) -> u32 {
        (Self::SIZE + self.filename_len as usize) as u32
    }

    /// 序列化记录全文，文件名缀在尾部
    pub fn encode(&self, filename: &[u8]) -> Vec<u8> {
        debug_assert_eq!(self.filename_len as usize, filename.len());

        let mut buf = Vec::with_capacity(Self::SIZE + filename.len());
        buf.extend_from_slice(&INODE_MAGIC.to_le_bytes());
        buf.extend_from_slice(&u32::from(self.id).to_le_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&u32::from(self.parent_id).to_le_bytes());
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        buf.push(self.filename_len);
        buf.extend_from_slice(&ECC_PLACEHOLDER.to_le_bytes());
        buf.extend_from_slice(filename);
        buf
    }

    /// 解码定长部分；文件名由调用方按`filename_len`另行读取
    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<Self, Error> {
        if u32::from_le_bytes(buf[0..4].try_into().unwrap()) != INODE_MAGIC {
            return Err(Error::Corrupted);
        }

        let filename_len = buf[18];
        if filename_len as usize > NAME_MAX_LEN {
            return Err(Error::Corrupted);
        }

        Ok(Self {
            id: u32::from_le_bytes(buf[4..8].try_into().unwrap()).into(),
            seq: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            parent_id: u32::from_le_bytes(buf[12..16].try_into().unwrap()).into(),
            flags: BitFlags::from_bits_truncate(u16::from_le_bytes(
                buf[16..18].try_into().unwrap(),
            )),
            filename_len,
        })
    }
}
