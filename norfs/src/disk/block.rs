use alloc::vec::Vec;

use enumflags2::BitFlags;

use super::{BLOCK_MAGIC, ECC_PLACEHOLDER};
use crate::base::ObjId;
use crate::block::BlockFlag;
use crate::error::Error;
use crate::BLOCK_MAX_DATA_SZ;

/// 数据块记录的定长部分，其后紧跟数据。
///
/// `rank`决定块在文件内的先后；文件内容即按`rank`升序
/// 拼接各块数据所得。
#[derive(Debug, Clone, Copy)]
pub struct DiskBlock {
    pub id: ObjId,
    pub seq: u32,
    pub rank: u32,
    /// 所属文件的编号
    pub inode_id: ObjId,
    pub flags: BitFlags<BlockFlag>,
    pub data_len: u16,
}

impl DiskBlock {
    pub const SIZE: usize = 30;

    /// 含数据的记录总长
    pub fn disk_size(&self) -> u32 {
        (Self::SIZE + self.data_len as usize) as u32
    }

    /// 序列化记录全文，数据缀在尾部
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        debug_assert_eq!(self.data_len as usize, data.len());

        let mut buf = Vec::with_capacity(Self::SIZE + data.len());
        buf.extend_from_slice(&BLOCK_MAGIC.to_le_bytes());
        buf.extend_from_slice(&u32::from(self.id).to_le_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf.extend_from_slice(&self.rank.to_le_bytes());
        buf.extend_from_slice(&u32::from(self.inode_id).to_le_bytes());
        buf.extend_from_slice(&[0, 0]); // 保留字段
        buf.extend_from_slice(&self.flags.bits().to_le_bytes());
        buf.extend_from_slice(&self.data_len.to_le_bytes());
        buf.extend_from_slice(&ECC_PLACEHOLDER.to_le_bytes());
        buf.extend_from_slice(data);
        buf
    }

    /// 解码定长部分；数据由调用方按`data_len`另行读取
    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<Self, Error> {
        if u32::from_le_bytes(buf[0..4].try_into().unwrap()) != BLOCK_MAGIC {
            return Err(Error::Corrupted);
        }

        let data_len = u16::from_le_bytes(buf[24..26].try_into().unwrap());
        if data_len as usize > BLOCK_MAX_DATA_SZ {
            return Err(Error::Corrupted);
        }

        Ok(Self {
            id: u32::from_le_bytes(buf[4..8].try_into().unwrap()).into(),
            seq: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            rank: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            inode_id: u32::from_le_bytes(buf[16..20].try_into().unwrap()).into(),
            flags: BitFlags::from_bits_truncate(u16::from_le_bytes(
                buf[22..24].try_into().unwrap(),
            )),
            data_len,
        })
    }
}
