//! # 空间回收层
//!
//! 追加写只消耗、不归还：空间靠垃圾回收整片取回。
//! 始终留着一个空白的暂存区，把最老区域里仍然生效的记录
//! 搬过去之后，老区域整个擦除，换班成为新的暂存区。

use alloc::vec::Vec;

use crate::base::{AreaId, ObjRef};
use crate::control::NorFileSystem;
use crate::disk::{record_align, DiskArea};
use crate::error::Error;
use crate::restore::Record;

impl NorFileSystem {
    /// 为一条记录预留`size`字节的连续空间。
    ///
    /// 先就地找，找不到就边回收边找；
    /// 所有活动区域都整理过一轮仍不够，才算真满。
    pub(crate) fn reserve_space(&mut self, size: u32) -> Result<(AreaId, u32), Error> {
        let need = record_align(size);
        if let Some(got) = self.take_space(need) {
            return Ok(got);
        }
        self.gc_until(need)
    }

    fn take_space(&mut self, size: u32) -> Option<(AreaId, u32)> {
        let scratch = self.scratch;
        for id in self.flash.area_ids() {
            if Some(id) == scratch {
                continue;
            }

            let area = self.flash.area_mut(id);
            if area.free_space() >= size {
                let offset = area.cur;
                area.cur += size;
                return Some((id, offset));
            }
        }
        None
    }

    fn gc_until(&mut self, size: u32) -> Result<(AreaId, u32), Error> {
        for _ in 1..self.flash.area_count() {
            self.gc()?;
            if let Some(got) = self.take_space(size) {
                return Ok(got);
            }
        }
        Err(Error::Full)
    }

    /// 回收一个区域，返回转正后的原暂存区编号。
    ///
    /// 牺牲者取代次最小的活动区域，代次相同时取编号小者。
    /// 搬运只带上索引仍然指着的记录；被覆盖的与带删除标志的
    /// 一概留在原地陪葬。
    pub(crate) fn gc(&mut self) -> Result<AreaId, Error> {
        let scratch = self.scratch.ok_or(Error::Corrupted)?;
        let victim = self
            .flash
            .area_ids()
            .filter(|&id| id != scratch)
            .min_by_key(|&id| (self.flash.area(id).seq, id))
            .ok_or(Error::Corrupted)?;
        log::debug!("gc: victim={victim} scratch={scratch}");

        // 第一遍只认记录，顺便算出搬运总量
        let end = self.flash.area(victim).cur;
        let mut keep: Vec<(u32, u32, ObjRef)> = Vec::new();
        let mut from = DiskArea::SIZE as u32;
        while from < end {
            let Some(record) = self.scan_record(victim, from) else {
                break;
            };
            let size = record.disk_size();
            if let Some(obj) = self.current_record(victim, from, &record) {
                keep.push((from, size, obj));
            }
            from += record_align(size);
        }

        let moved: u32 = keep.iter().map(|&(_, size, _)| record_align(size)).sum();
        if DiskArea::SIZE as u32 + moved > self.flash.area(scratch).length {
            return Err(Error::Full);
        }

        // 第二遍搬运，对象落点随之改写
        let mut to = DiskArea::SIZE as u32;
        for (from, size, obj) in keep.iter().copied() {
            self.flash.copy(victim, from, scratch, to, size)?;
            let base = match obj {
                ObjRef::Inode(handle) => &mut self.inode_mut(handle).base,
                ObjRef::Block(handle) => &mut self.block_mut(handle).base,
            };
            base.area = scratch;
            base.offset = to;
            to += record_align(size);
        }
        let kept = keep.len();

        // 先写转正头把搬运坐实，然后才擦牺牲者
        let seq = self.flash.area(victim).seq.wrapping_add(1);
        let header = DiskArea {
            length: self.flash.area(scratch).length,
            seq,
            is_scratch: false,
        };
        self.flash.write(scratch, 0, &header.encode())?;
        {
            let area = self.flash.area_mut(scratch);
            area.seq = seq;
            area.cur = to;
        }

        self.format_area(victim, true)?;
        self.scratch = Some(victim);

        log::info!("gc: area {victim} recycled, {kept} records moved to {scratch}");
        Ok(scratch)
    }

    /// 记录仍然生效，当且仅当索引里的同号对象恰好指着这条记录，
    /// 且记录未带删除标志。
    fn current_record(&self, area: AreaId, offset: u32, record: &Record) -> Option<ObjRef> {
        if record.deleted() {
            return None;
        }

        let (obj, base) = match (self.index.find(record.id()), record) {
            (Some(obj @ ObjRef::Inode(handle)), Record::Inode { .. }) => {
                (obj, self.inode(handle).base)
            }
            (Some(obj @ ObjRef::Block(handle)), Record::Block { .. }) => {
                (obj, self.block(handle).base)
            }
            _ => return None,
        };
        (base.area == area && base.offset == offset).then_some(obj)
    }
}
