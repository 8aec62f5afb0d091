//! # 对象索引
//!
//! 以编号低八位散列的桶式索引，给出每个编号当前生效的对象。
//! 同一编号至多一项；替换之前调用方须先移除旧项。

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::base::{BlockHandle, InodeHandle, ObjId, ObjRef};
use crate::error::Error;
use crate::HASH_SIZE;

struct Entry {
    id: ObjId,
    obj: ObjRef,
    next: Option<Box<Entry>>,
}

pub(crate) struct ObjIndex {
    buckets: Vec<Option<Box<Entry>>>,
}

impl ObjIndex {
    pub fn new() -> Self {
        Self {
            buckets: (0..HASH_SIZE).map(|_| None).collect(),
        }
    }

    pub fn find(&self, id: ObjId) -> Option<ObjRef> {
        let mut entry = self.buckets[id.bucket()].as_deref();
        while let Some(e) = entry {
            if e.id == id {
                return Some(e.obj);
            }
            entry = e.next.as_deref();
        }
        None
    }

    /// 按类型取出索引节点；编号缺失或类型不符都按未找到处理
    pub fn find_inode(&self, id: ObjId) -> Result<InodeHandle, Error> {
        match self.find(id) {
            Some(ObjRef::Inode(handle)) => Ok(handle),
            _ => Err(Error::NotFound),
        }
    }

    pub fn find_block(&self, id: ObjId) -> Result<BlockHandle, Error> {
        match self.find(id) {
            Some(ObjRef::Block(handle)) => Ok(handle),
            _ => Err(Error::NotFound),
        }
    }

    pub fn insert(&mut self, id: ObjId, obj: ObjRef) {
        debug_assert!(self.find(id).is_none());

        let bucket = &mut self.buckets[id.bucket()];
        *bucket = Some(Box::new(Entry {
            id,
            obj,
            next: bucket.take(),
        }));
    }

    pub fn remove(&mut self, id: ObjId) -> Option<ObjRef> {
        let mut cursor = &mut self.buckets[id.bucket()];
        loop {
            let hit = match cursor {
                None => return None,
                Some(entry) => entry.id == id,
            };

            if hit {
                let entry = cursor.take().unwrap();
                *cursor = entry.next;
                return Some(entry.obj);
            }
            cursor = &mut cursor.as_mut().unwrap().next;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjId, ObjRef)> + '_ {
        self.buckets
            .iter()
            .flat_map(|head| core::iter::successors(head.as_deref(), |e| e.next.as_deref()))
            .map(|e| (e.id, e.obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_remove() {
        let mut index = ObjIndex::new();
        index.insert(ObjId::from(1), ObjRef::Inode(InodeHandle(0)));
        // 与编号1同桶
        index.insert(ObjId::from(257), ObjRef::Block(BlockHandle(1)));

        assert_eq!(Ok(InodeHandle(0)), index.find_inode(ObjId::from(1)));
        assert_eq!(Ok(BlockHandle(1)), index.find_block(ObjId::from(257)));
        assert_eq!(Err(Error::NotFound), index.find_block(ObjId::from(1)));
        assert_eq!(None, index.find(ObjId::from(2)));

        assert_eq!(
            Some(ObjRef::Inode(InodeHandle(0))),
            index.remove(ObjId::from(1))
        );
        assert_eq!(None, index.find(ObjId::from(1)));
        assert!(index.find(ObjId::from(257)).is_some());

        assert_eq!(2, {
            index.insert(ObjId::from(513), ObjRef::Block(BlockHandle(7)));
            index.iter().count()
        });
    }
}
