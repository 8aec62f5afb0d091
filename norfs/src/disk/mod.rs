//! # 磁盘数据结构层
//!
//! 介质上只有三种结构，均为小端序：
//!
//! 区域头 | 索引节点记录 | 数据块记录
//!
//! 区域头固定在区域起始处；其余空间是一条紧挨一条的记录流。
//! 记录靠魔数自定界，顺序扫描时魔数不符即视为记录流的终点。

mod area;
mod block;
mod inode;

pub use self::area::DiskArea;
pub use self::block::DiskBlock;
pub use self::inode::DiskInode;

/// 区域头魔数，四个字依次排布
pub const AREA_MAGIC: [u32; 4] = [0xb98a_31e2, 0x7fb0_428c, 0xace0_8253, 0xb185_fc8e];

/// 索引节点记录魔数
pub const INODE_MAGIC: u32 = 0x925f_8bc0;

/// 数据块记录魔数
pub const BLOCK_MAGIC: u32 = 0x53ba_23b9;

/// 校验字段的占位值。
/// 字段参与记录长度的计算，但内容暂不产生也不检查。
pub(crate) const ECC_PLACEHOLDER: u32 = 0;

/// 记录落盘按字对齐：预留与扫描都以对齐后的尺寸推进游标，
/// 记录本身只占实际长度，缝隙保持擦除态。
pub(crate) const fn record_align(size: u32) -> u32 {
    (size + 3) & !3
}

#[cfg(test)]
mod tests {
    use enumflags2::BitFlags;

    use super::*;
    use crate::base::ObjId;
    use crate::inode::InodeFlag;

    #[test]
    fn layout() {
        assert_eq!(24, DiskArea::SIZE);
        assert_eq!(23, DiskInode::SIZE);
        assert_eq!(30, DiskBlock::SIZE);
    }

    #[test]
    fn area_round_trip() {
        let header = DiskArea {
            length: 4096,
            seq: 7,
            is_scratch: true,
        };
        let buf = header.encode();
        assert_eq!(0xff, buf[23]);

        let decoded = DiskArea::decode(&buf).unwrap();
        assert_eq!(4096, decoded.length);
        assert_eq!(7, decoded.seq);
        assert!(decoded.is_scratch);
    }

    #[test]
    fn inode_round_trip() {
        let disk = DiskInode {
            id: ObjId::from(3),
            seq: 2,
            parent_id: ObjId::ROOT,
            flags: InodeFlag::Directory.into(),
            filename_len: 5,
        };
        let bytes = disk.encode(b"entry");
        assert_eq!(disk.disk_size() as usize, bytes.len());

        let decoded = DiskInode::decode(bytes[..DiskInode::SIZE].try_into().unwrap()).unwrap();
        assert_eq!(ObjId::from(3), decoded.id);
        assert_eq!(2, decoded.seq);
        assert_eq!(ObjId::ROOT, decoded.parent_id);
        assert_eq!(BitFlags::from(InodeFlag::Directory), decoded.flags);
        assert_eq!(5, decoded.filename_len);
    }

    #[test]
    fn block_round_trip() {
        let disk = DiskBlock {
            id: ObjId::from(9),
            seq: 0,
            rank: 4,
            inode_id: ObjId::from(3),
            flags: BitFlags::empty(),
            data_len: 3,
        };
        let bytes = disk.encode(b"abc");
        assert_eq!(disk.disk_size() as usize, bytes.len());

        let decoded = DiskBlock::decode(bytes[..DiskBlock::SIZE].try_into().unwrap()).unwrap();
        assert_eq!(ObjId::from(9), decoded.id);
        assert_eq!(4, decoded.rank);
        assert_eq!(ObjId::from(3), decoded.inode_id);
        assert_eq!(3, decoded.data_len);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let erased = [0xffu8; DiskArea::SIZE];
        assert!(DiskArea::decode(&erased).is_err());

        let zeros = [0u8; DiskInode::SIZE];
        assert!(DiskInode::decode(&zeros).is_err());

        let zeros = [0u8; DiskBlock::SIZE];
        assert!(DiskBlock::decode(&zeros).is_err());
    }

    #[test]
    fn oversized_name_is_rejected() {
        let disk = DiskInode {
            id: ObjId::from(3),
            seq: 0,
            parent_id: ObjId::ROOT,
            flags: BitFlags::empty(),
            filename_len: 16,
        };
        let mut bytes = disk.encode(b"sixteen-byte-nam");
        assert!(DiskInode::decode(bytes[..DiskInode::SIZE].try_into().unwrap()).is_ok());

        bytes[18] = 17;
        assert!(DiskInode::decode(bytes[..DiskInode::SIZE].try_into().unwrap()).is_err());
    }
}
