//! # 闪存访问层
//!
//! 在驱动之上补充边界检查、区域状态与区域间搬运。
//! 驱动只认逻辑区域编号，描述符表在建立时校验一次。

use alloc::sync::Arc;
use alloc::vec::Vec;

use flash_dev::{AreaDesc, FlashDevice};

use crate::base::AreaId;
use crate::disk::DiskArea;
use crate::error::Error;
use crate::{BLOCK_SIZE, MAX_AREAS};

/// 区域在内存中的状态
#[derive(Debug, Clone)]
pub(crate) struct Area {
    pub offset: u32,
    pub length: u32,
    /// 写游标：下一条记录的落点
    pub cur: u32,
    /// 回收代次，来自区域头
    pub seq: u8,
}

impl Area {
    pub fn free_space(&self) -> u32 {
        self.length - self.cur
    }
}

pub(crate) struct Flash {
    dev: Arc<dyn FlashDevice>,
    areas: Vec<Area>,
}

impl Flash {
    pub fn new(dev: Arc<dyn FlashDevice>, descs: &[AreaDesc]) -> Result<Self, Error> {
        desc_validate(descs)?;

        let areas = descs
            .iter()
            .map(|desc| Area {
                offset: desc.offset,
                length: desc.length,
                cur: DiskArea::SIZE as u32,
                seq: 0,
            })
            .collect();

        Ok(Self { dev, areas })
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// 全部区域的编号；迭代器不持有自身借用
    pub fn area_ids(&self) -> impl Iterator<Item = AreaId> {
        (0..self.areas.len() as u16).map(AreaId::from)
    }

    pub fn area(&self, id: AreaId) -> &Area {
        &self.areas[id.index()]
    }

    pub fn area_mut(&mut self, id: AreaId) -> &mut Area {
        &mut self.areas[id.index()]
    }

    pub fn read(&self, id: AreaId, offset: u32, buf: &mut [u8]) -> Result<(), Error> {
        self.check(id, offset, buf.len())?;
        self.dev.read(id.index(), offset, buf);
        Ok(())
    }

    pub fn write(&self, id: AreaId, offset: u32, buf: &[u8]) -> Result<(), Error> {
        self.check(id, offset, buf.len())?;
        self.dev.write(id.index(), offset, buf);
        Ok(())
    }

    pub fn erase(&self, id: AreaId) {
        self.dev.erase(id.index());
    }

    /// 在两个区域间搬运一段字节，经由栈上缓冲分批进行
    pub fn copy(
        &self,
        from: AreaId,
        from_off: u32,
        to: AreaId,
        to_off: u32,
        len: u32,
    ) -> Result<(), Error> {
        let mut buf = [0u8; 256];

        let mut done = 0;
        while done < len {
            let chunk = ((len - done) as usize).min(buf.len());
            self.read(from, from_off + done, &mut buf[..chunk])?;
            self.write(to, to_off + done, &buf[..chunk])?;
            done += chunk as u32;
        }

        Ok(())
    }

    fn check(&self, id: AreaId, offset: u32, len: usize) -> Result<(), Error> {
        let area = self.areas.get(id.index()).ok_or(Error::InvalidInput)?;
        if offset as usize + len > area.length as usize {
            return Err(Error::InvalidInput);
        }
        Ok(())
    }
}

/// 描述符表须在格式化与挂载前通过校验：
/// 每个区域的长度须大于区域头加一条最大记录。
pub(crate) fn desc_validate(descs: &[AreaDesc]) -> Result<(), Error> {
    if descs.is_empty() || descs.len() > MAX_AREAS {
        return Err(Error::InvalidInput);
    }

    for desc in descs {
        if (desc.length as usize) <= DiskArea::SIZE + BLOCK_SIZE {
            return Err(Error::InvalidInput);
        }
    }

    Ok(())
}
