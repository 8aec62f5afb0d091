//! # 重建
//!
//! 挂载即重放：把介质上所有区域的记录流扫一遍，
//! 同号记录按`seq`大者定胜负，随后把父子链、块链与长度缓存
//! 逐一复原。除补完一次中断的暂存区擦除外，重建不写闪存，
//! 重复挂载同一镜像因此得到相同的结果。

use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;

use crate::base::{AreaId, Base, BlockHandle, InodeHandle, ObjId, ObjRef};
use crate::block::{block_read_disk, BlockFlag};
use crate::control::NorFileSystem;
use crate::disk::{record_align, DiskArea, DiskBlock, DiskInode};
use crate::error::Error;
use crate::inode::{inode_read_disk, Inode, InodeFlag};
use crate::NAME_MAX_LEN;

/// 顺序扫描时读出的一条记录
pub(crate) enum Record {
    Inode {
        disk: DiskInode,
        name: [u8; NAME_MAX_LEN],
    },
    Block {
        disk: DiskBlock,
    },
}

impl Record {
    pub fn id(&self) -> ObjId {
        match self {
            Record::Inode { disk, .. } => disk.id,
            Record::Block { disk } => disk.id,
        }
    }

    pub fn disk_size(&self) -> u32 {
        match self {
            Record::Inode { disk, .. } => disk.disk_size(),
            Record::Block { disk } => disk.disk_size(),
        }
    }

    pub fn deleted(&self) -> bool {
        match self {
            Record::Inode { disk, .. } => disk.flags.contains(InodeFlag::Deleted),
            Record::Block { disk } => disk.flags.contains(BlockFlag::Deleted),
        }
    }
}

/// 区域头的三种状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AreaKind {
    Live,
    Scratch,
    /// 头部无法解读，视作未初始化
    Blank,
}

impl NorFileSystem {
    /// 辨认`(area, offset)`处的记录；魔数不符或越出区域边界
    /// 都视为记录流到此为止。
    pub(crate) fn scan_record(&self, area: AreaId, offset: u32) -> Option<Record> {
        let length = self.flash.area(area).length;
        if offset + DiskInode::SIZE as u32 > length {
            return None;
        }

        if let Ok((disk, name)) = inode_read_disk(&self.flash, area, offset) {
            if offset + disk.disk_size() <= length {
                return Some(Record::Inode { disk, name });
            }
            return None;
        }

        if offset + DiskBlock::SIZE as u32 > length {
            return None;
        }
        if let Ok(disk) = block_read_disk(&self.flash, area, offset) {
            if offset + disk.disk_size() <= length {
                return Some(Record::Block { disk });
            }
        }
        None
    }

    pub(crate) fn restore_on(mut fs: Self) -> Result<Self, Error> {
        let count = fs.flash.area_count();

        // 读区域头并归类
        let mut kinds = Vec::with_capacity(count);
        for i in 0..count {
            let id = AreaId::from(i as u16);
            let mut buf = [0u8; DiskArea::SIZE];
            fs.flash.read(id, 0, &mut buf)?;

            match DiskArea::decode(&buf) {
                Ok(header) => {
                    if header.length != fs.flash.area(id).length {
                        log::error!("restore: area {id} length disagrees with descriptor");
                        return Err(Error::Corrupted);
                    }
                    fs.flash.area_mut(id).seq = header.seq;
                    kinds.push(if header.is_scratch {
                        AreaKind::Scratch
                    } else {
                        AreaKind::Live
                    });
                }
                Err(_) => kinds.push(AreaKind::Blank),
            }
        }

        let blanks = kinds.iter().filter(|k| **k == AreaKind::Blank).count();
        let scratches = kinds.iter().filter(|k| **k == AreaKind::Scratch).count();

        if blanks == count {
            log::info!("restore: blank media, formatting");
            return Self::format_on(fs);
        }
        if scratches > 1 {
            // 多个暂存区只可能出自一次中断的首次格式化
            log::info!("restore: {scratches} scratch areas, formatting");
            return Self::format_on(fs);
        }

        let scratch_at = |kinds: &[AreaKind]| {
            kinds
                .iter()
                .position(|k| *k == AreaKind::Scratch)
                .map(|i| AreaId::from(i as u16))
        };
        match (scratches, blanks) {
            (1, 0) => fs.scratch = scratch_at(&kinds),
            (0, 1) => {
                // 暂存区擦到一半断了电，补完这一下
                let id = kinds
                    .iter()
                    .position(|k| *k == AreaKind::Blank)
                    .map(|i| AreaId::from(i as u16))
                    .unwrap();
                log::info!("restore: finishing interrupted scratch erase of area {id}");
                fs.format_area(id, true)?;
                fs.scratch = Some(id);
            }
            // 暂存区刚转正、牺牲者还没擦：扫描完才认得出牺牲者
            (0, 0) => {}
            // 首次格式化写到一半断电，还没有可丢的数据
            (0, _) => {
                log::info!("restore: half-formatted media, formatting");
                return Self::format_on(fs);
            }
            _ => return Err(Error::Corrupted),
        }

        // 搬运中途断电会留下一个写了一半的暂存区，重新擦干净
        if let Some(id) = fs.scratch {
            let mut word = [0u8; 4];
            fs.flash.read(id, DiskArea::SIZE as u32, &mut word)?;
            if word != [0xff; 4] {
                log::info!("restore: scratch area {id} is dirty, re-erasing");
                fs.format_area(id, true)?;
            }
        }

        // 活动区域按代次从新到旧扫描；同号同`seq`保先，
        // 于是中断回收留下的两份副本以新搬的为准。
        let mut order: Vec<AreaId> = (0..count as u16)
            .map(AreaId::from)
            .filter(|id| kinds[id.index()] == AreaKind::Live)
            .collect();
        order.sort_by(|&a, &b| {
            let (a_seq, b_seq) = (fs.flash.area(a).seq, fs.flash.area(b).seq);
            b_seq.cmp(&a_seq).then(a.cmp(&b))
        });
        for id in order {
            fs.restore_scan_area(id)?;
        }

        if fs.scratch.is_none() {
            fs.restore_missing_scratch()?;
        }

        fs.restore_sweep()?;

        fs.next_id = fs
            .index
            .iter()
            .map(|(id, _)| u32::from(id))
            .filter(|&id| id != u32::from(ObjId::NONE))
            .max()
            .map_or(1, |max| max + 1);

        log::info!(
            "restore: {} objects indexed, next_id={}",
            fs.index.iter().count(),
            fs.next_id,
        );
        Ok(fs)
    }

    fn restore_scan_area(&mut self, id: AreaId) -> Result<(), Error> {
        let mut offset = DiskArea::SIZE as u32;
        while let Some(record) = self.scan_record(id, offset) {
            let size = record.disk_size();
            self.restore_record(id, offset, record)?;
            offset += record_align(size);
        }

        self.flash.area_mut(id).cur = offset;
        log::debug!("restore: area {id} holds records up to {offset}");
        Ok(())
    }

    fn restore_record(&mut self, area: AreaId, offset: u32, record: Record) -> Result<(), Error> {
        match record {
            Record::Inode { disk, name } => match self.index.find(disk.id) {
                None => {
                    let handle = self.inode_from_disk(
                        &disk,
                        &name[..disk.filename_len as usize],
                        area,
                        offset,
                    )?;
                    if !disk.flags.contains(InodeFlag::Deleted) {
                        self.restore_attach_inode(handle, disk.parent_id)?;
                    }
                    Ok(())
                }
                Some(ObjRef::Inode(handle)) => {
                    let (old_seq, placeholder) = {
                        let node = self.inode(handle);
                        (node.base.seq, node.flags.contains(InodeFlag::Dummy))
                    };
                    if placeholder || disk.seq > old_seq {
                        self.restore_adopt_inode(handle, &disk, &name, area, offset)?;
                    }
                    Ok(())
                }
                Some(ObjRef::Block(_)) => {
                    log::error!("restore: inode record reuses block id {}", disk.id);
                    Ok(())
                }
            },
            Record::Block { disk } => match self.index.find(disk.id) {
                None => {
                    let handle = self.block_from_disk(&disk, area, offset)?;
                    if !disk.flags.contains(BlockFlag::Deleted) {
                        let owner = self.restore_owner(disk.inode_id)?;
                        self.inode_insert_block(owner, handle);
                    }
                    Ok(())
                }
                Some(ObjRef::Block(handle)) => {
                    if disk.seq > self.block(handle).base.seq {
                        self.block_remove_from_owner(handle);
                        {
                            let block = self.block_mut(handle);
                            block.base.seq = disk.seq;
                            block.base.area = area;
                            block.base.offset = offset;
                            block.inode_id = disk.inode_id;
                            block.rank = disk.rank;
                            block.data_len = disk.data_len;
                            block.flags = disk.flags;
                            block.next = None;
                        }
                        if !disk.flags.contains(BlockFlag::Deleted) {
                            let owner = self.restore_owner(disk.inode_id)?;
                            self.inode_insert_block(owner, handle);
                        }
                    }
                    Ok(())
                }
                Some(ObjRef::Inode(_)) => {
                    log::error!("restore: block record reuses inode id {}", disk.id);
                    Ok(())
                }
            },
        }
    }

    /// 让已有节点改用一条更新的记录，挂接关系照旧重算
    fn restore_adopt_inode(
        &mut self,
        handle: InodeHandle,
        disk: &DiskInode,
        name: &[u8; NAME_MAX_LEN],
        area: AreaId,
        offset: u32,
    ) -> Result<(), Error> {
        self.inode_remove_child(handle);
        {
            let node = self.inode_mut(handle);
            node.base.seq = disk.seq;
            node.base.area = area;
            node.base.offset = offset;
            node.flags = disk.flags;
            node.name_len = disk.filename_len;
            node.name = *name;
        }
        if !disk.flags.contains(InodeFlag::Deleted) {
            self.restore_attach_inode(handle, disk.parent_id)?;
        }
        Ok(())
    }

    /// 把节点挂到父目录下；父记录还没扫到时先立一个占位节点。
    /// 重名的后来者不挂链，留给清扫处理。
    fn restore_attach_inode(
        &mut self,
        handle: InodeHandle,
        parent_id: ObjId,
    ) -> Result<(), Error> {
        if parent_id == ObjId::NONE {
            return Ok(());
        }

        let parent = match self.index.find(parent_id) {
            Some(ObjRef::Inode(parent)) => parent,
            Some(ObjRef::Block(_)) => {
                log::error!("restore: parent id {parent_id} names a block");
                return Ok(());
            }
            None => self.restore_dummy_inode(parent_id)?,
        };

        match self.inode_add_child_from_disk(parent, handle) {
            Err(Error::AlreadyExists) => {
                log::error!("restore: duplicate name under {parent_id}");
                Ok(())
            }
            other => other,
        }
    }

    /// 数据块的归属方，必要时同样以占位节点垫上
    fn restore_owner(&mut self, inode_id: ObjId) -> Result<InodeHandle, Error> {
        match self.index.find(inode_id) {
            Some(ObjRef::Inode(owner)) => Ok(owner),
            Some(ObjRef::Block(_)) => {
                log::error!("restore: owner id {inode_id} names a block");
                self.restore_dummy_inode(inode_id)
            }
            None => self.restore_dummy_inode(inode_id),
        }
    }

    /// 占位节点：只有编号，等真记录来认领
    fn restore_dummy_inode(&mut self, id: ObjId) -> Result<InodeHandle, Error> {
        debug_assert!(self.index.find(id).is_none());

        let inode = Inode {
            base: Base {
                id,
                seq: 0,
                area: AreaId::from(0),
                offset: 0,
            },
            flags: InodeFlag::Dummy.into(),
            refcnt: 0,
            parent: None,
            sibling: None,
            child: None,
            block: None,
            data_len: 0,
            name_len: 0,
            name: [0; NAME_MAX_LEN],
        };
        let handle = InodeHandle(self.inodes.alloc(inode)?);
        self.index.insert(id, ObjRef::Inode(handle));
        Ok(handle)
    }

    /// 零暂存区收尾：回收转正后、牺牲者擦除前断电，
    /// 留下一个记录全数失效的旧区域，重新擦成暂存区。
    fn restore_missing_scratch(&mut self) -> Result<(), Error> {
        let mut counts = vec![0usize; self.flash.area_count()];
        for (_, obj) in self.index.iter() {
            let (base, placeholder) = match obj {
                ObjRef::Inode(handle) => {
                    let node = self.inode(handle);
                    (node.base, node.flags.contains(InodeFlag::Dummy))
                }
                ObjRef::Block(handle) => (self.block(handle).base, false),
            };
            if !placeholder {
                counts[base.area.index()] += 1;
            }
        }

        let Some(stale) = counts.iter().position(|&c| c == 0) else {
            log::error!("restore: no scratch and no stale area");
            return Err(Error::Corrupted);
        };
        let id = AreaId::from(stale as u16);
        log::info!("restore: re-erasing stale area {id} as scratch");
        self.format_area(id, true)?;
        self.scratch = Some(id);
        Ok(())
    }

    /// 标记清扫：根不可达者（占位、已删除、环）连同
    /// 失主或带删除标志的数据块一起出清，文件长度随后重算。
    fn restore_sweep(&mut self) -> Result<(), Error> {
        let root = self
            .index
            .find_inode(ObjId::ROOT)
            .map_err(|_| Error::Corrupted)?;
        if !self.inode(root).is_dir()
            || self
                .inode(root)
                .flags
                .intersects(InodeFlag::Deleted | InodeFlag::Dummy)
        {
            log::error!("restore: root is missing or malformed");
            return Err(Error::Corrupted);
        }
        // 根常驻：引用计数恒不为零
        self.inode_mut(root).refcnt = 1;
        self.root = Some(root);

        let mut reachable = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if !reachable.insert(self.inode(handle).base.id) {
                continue;
            }
            let mut cur = self.inode(handle).child;
            while let Some(child) = cur {
                stack.push(child);
                cur = self.inode(child).sibling;
            }
        }

        let entries: Vec<(ObjId, ObjRef)> = self.index.iter().collect();
        let mut dropped = 0usize;

        for (id, obj) in entries.iter().copied() {
            if let ObjRef::Inode(handle) = obj {
                if !reachable.contains(&id) {
                    self.index.remove(id);
                    self.inodes.free(handle.0);
                    dropped += 1;
                }
            }
        }

        for (id, obj) in entries.iter().copied() {
            if let ObjRef::Block(handle) = obj {
                let keep = !self.block(handle).flags.contains(BlockFlag::Deleted)
                    && matches!(
                        self.index.find(self.block(handle).inode_id),
                        Some(ObjRef::Inode(owner)) if !self.inode(owner).is_dir()
                    );
                if !keep {
                    self.block_remove_from_owner(handle);
                    self.index.remove(id);
                    self.blocks.free(handle.0);
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            log::info!("restore: swept {dropped} stale objects");
        }

        let survivors: Vec<ObjRef> = self.index.iter().map(|(_, obj)| obj).collect();
        for obj in survivors {
            if let ObjRef::Inode(handle) = obj {
                if !self.inode(handle).is_dir() {
                    let len = self.inode_calc_data_length(handle);
                    self.inode_mut(handle).data_len = len;
                }
            }
        }

        Ok(())
    }

    /// 把块从其归属文件的块链上摘下来；不在链上时无事发生
    pub(crate) fn block_remove_from_owner(&mut self, handle: BlockHandle) {
        let inode_id = self.block(handle).inode_id;
        let Ok(owner) = self.index.find_inode(inode_id) else {
            return;
        };

        let mut prev: Option<BlockHandle> = None;
        let mut cur = self.inode(owner).block;
        while let Some(b) = cur {
            if b == handle {
                let next = self.block(b).next;
                match prev {
                    Some(prev) => self.block_mut(prev).next = next,
                    None => self.inode_mut(owner).block = next,
                }
                self.block_mut(handle).next = None;
                return;
            }
            prev = Some(b);
            cur = self.block(b).next;
        }
    }
}
