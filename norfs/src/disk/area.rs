use super::AREA_MAGIC;
use crate::error::Error;

/// 区域头，位于区域起始处。
///
/// `is_scratch`字节恰好落在区域内偏移23处；
/// 暂存区转正时整个头部原地重写，该字节由1变0。
#[derive(Debug, Clone, Copy)]
pub struct DiskArea {
    /// 区域总长，须与描述符表一致
    pub length: u32,
    /// 区域的回收代次，转正时取牺牲区域的代次加一
    pub seq: u8,
    pub is_scratch: bool,
}

impl DiskArea {
    pub const SIZE: usize = 24;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        for (i, word) in AREA_MAGIC.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        buf[16..20].copy_from_slice(&self.length.to_le_bytes());
        // buf[20..22]为保留字段
        buf[22] = self.seq;
        // 暂存标志写满1：转正时只需把位清零，不违反NOR的写入方向
        buf[23] = if self.is_scratch { 0xff } else { 0 };
        buf
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Result<Self, Error> {
        for (i, word) in AREA_MAGIC.iter().enumerate() {
            let got = u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
            if got != *word {
                return Err(Error::Corrupted);
            }
        }

        Ok(Self {
            length: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            seq: buf[22],
            is_scratch: buf[23] != 0,
        })
    }
}
