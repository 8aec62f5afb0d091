//! 格式化：把介质铺成可挂载的空文件系统。

use crate::base::{AreaId, ObjId};
use crate::control::NorFileSystem;
use crate::disk::{DiskArea, DiskInode};
use crate::error::Error;
use crate::inode::{inode_write_disk, InodeFlag};

impl NorFileSystem {
    /// 擦除单个区域并写上区域头
    pub(crate) fn format_area(&mut self, id: AreaId, is_scratch: bool) -> Result<(), Error> {
        self.flash.erase(id);

        let area = self.flash.area_mut(id);
        area.cur = DiskArea::SIZE as u32;
        area.seq = 0;
        let header = DiskArea {
            length: area.length,
            // 暂存区的代次留成满1，等转正时一次写定
            seq: if is_scratch { 0xff } else { 0 },
            is_scratch,
        };
        self.flash.write(id, 0, &header.encode())
    }

    /// 在空白状态上完成整盘格式化：
    /// 末位区域留作暂存区，根目录记入第一个活动区域。
    pub(crate) fn format_on(mut fs: Self) -> Result<Self, Error> {
        let count = fs.flash.area_count();
        let scratch = AreaId::from((count - 1) as u16);
        for id in fs.flash.area_ids() {
            fs.format_area(id, id == scratch)?;
        }
        fs.scratch = Some(scratch);

        let disk = DiskInode {
            id: ObjId::ROOT,
            seq: 0,
            parent_id: ObjId::NONE,
            flags: InodeFlag::Directory.into(),
            filename_len: 0,
        };
        let (area, offset) = fs.reserve_space(disk.disk_size())?;
        inode_write_disk(&fs.flash, &disk, &[], area, offset)?;
        let root = fs.inode_from_disk(&disk, &[], area, offset)?;
        // 根常驻：引用计数恒不为零
        fs.inode_mut(root).refcnt = 1;
        fs.root = Some(root);
        fs.next_id = 1;

        log::info!("format: {count} areas, scratch={scratch}");
        Ok(fs)
    }
}
