//! 文件系统实例与对外接口。
//!
//! 全部运行期状态都收拢在 [`NorFileSystem`] 里，
//! 互不相干的镜像可以在同一进程内并存。
//! 核心按单写者设计：所有入口都要求独占借用。

use alloc::sync::Arc;

use enumflags2::BitFlags;

use flash_dev::{AreaDesc, FlashDevice};

use crate::base::{AreaId, BlockHandle, InodeHandle, ObjId};
use crate::block::Block;
use crate::error::Error;
use crate::file::{FileDesc, FileHandle, OpenFlag};
use crate::flash::Flash;
use crate::index::ObjIndex;
use crate::inode::Inode;
use crate::pool::Pool;
use crate::{BLOCK_POOL_CAPACITY, FILE_POOL_CAPACITY, INODE_POOL_CAPACITY};

pub struct NorFileSystem {
    pub(crate) flash: Flash,
    pub(crate) index: ObjIndex,
    pub(crate) inodes: Pool<Inode>,
    pub(crate) blocks: Pool<Block>,
    pub(crate) files: Pool<FileHandle>,
    pub(crate) root: Option<InodeHandle>,
    /// 常备的空白区域，垃圾回收的搬运目的地
    pub(crate) scratch: Option<AreaId>,
    /// 下一个待分配的对象编号
    pub(crate) next_id: u32,
}

impl NorFileSystem {
    /// 擦除全部区域并建立空文件系统。
    /// 最后一个区域充当暂存区，根目录记入第一个区域。
    pub fn format(dev: Arc<dyn FlashDevice>, descs: &[AreaDesc]) -> Result<Self, Error> {
        let fs = Self::fresh(dev, descs)?;
        Self::format_on(fs)
    }

    /// 扫描介质上的全部记录，重建内存状态。
    ///
    /// 除补完一次中断的暂存区擦除外不触碰闪存；
    /// 重复挂载同一镜像得到相同的状态。
    pub fn restore(dev: Arc<dyn FlashDevice>, descs: &[AreaDesc]) -> Result<Self, Error> {
        Self::restore_on(Self::fresh(dev, descs)?)
    }

    pub fn open(&mut self, path: &str, flags: BitFlags<OpenFlag>) -> Result<FileDesc, Error> {
        self.file_open(path, flags)
    }

    pub fn close(&mut self, fd: FileDesc) -> Result<(), Error> {
        self.file_close(fd)
    }

    /// 从句柄当前偏移读出至多`buf.len()`字节，返回实际读得的长度
    pub fn read(&mut self, fd: FileDesc, buf: &mut [u8]) -> Result<usize, Error> {
        self.file_read(fd, buf)
    }

    /// 自句柄当前偏移写入（`Append`时恒在文件尾），返回写入的长度。
    /// 中途失败时文件停留在最后一条落盘数据块的长度上。
    pub fn write(&mut self, fd: FileDesc, data: &[u8]) -> Result<usize, Error> {
        self.file_write(fd, data)
    }

    pub fn seek(&mut self, fd: FileDesc, offset: u32) -> Result<(), Error> {
        self.file_seek(fd, offset)
    }

    /// 删除文件或空目录
    pub fn unlink(&mut self, path: &str) -> Result<(), Error> {
        self.path_unlink(path)
    }

    /// 目标已存在时将其覆盖掉
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        self.path_rename(from, to)
    }

    pub fn mkdir(&mut self, path: &str) -> Result<(), Error> {
        self.path_new_dir(path)
    }
}

impl NorFileSystem {
    /// 空白的内存状态，格式化与挂载共同的起点
    pub(crate) fn fresh(dev: Arc<dyn FlashDevice>, descs: &[AreaDesc]) -> Result<Self, Error> {
        Ok(Self {
            flash: Flash::new(dev, descs)?,
            index: ObjIndex::new(),
            inodes: Pool::new(INODE_POOL_CAPACITY),
            blocks: Pool::new(BLOCK_POOL_CAPACITY),
            files: Pool::new(FILE_POOL_CAPACITY),
            root: None,
            scratch: None,
            next_id: 1,
        })
    }

    pub(crate) fn alloc_id(&mut self) -> ObjId {
        let id = self.next_id;
        self.next_id += 1;
        ObjId::from(id)
    }

    pub(crate) fn inode(&self, handle: InodeHandle) -> &Inode {
        self.inodes.get(handle.0)
    }

    pub(crate) fn inode_mut(&mut self, handle: InodeHandle) -> &mut Inode {
        self.inodes.get_mut(handle.0)
    }

    pub(crate) fn block(&self, handle: BlockHandle) -> &Block {
        self.blocks.get(handle.0)
    }

    pub(crate) fn block_mut(&mut self, handle: BlockHandle) -> &mut Block {
        self.blocks.get_mut(handle.0)
    }
}
