//! # 路径解析层
//!
//! 路径是以`/`开头、`/`分隔的绝对路径；不识别`.`与`..`，
//! 空白路径段一律拒绝。解析在单一根目录下逐段下行。

use crate::base::InodeHandle;
use crate::control::NorFileSystem;
use crate::error::Error;
use crate::NAME_MAX_LEN;

/// 路径段
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// 中间段，须解析成目录
    Branch(&'a str),
    /// 末段
    Leaf(&'a str),
}

pub(crate) struct Tokenizer<'a> {
    components: core::iter::Peekable<core::str::Split<'a, char>>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(path: &'a str) -> Result<Self, Error> {
        let rest = path.strip_prefix('/').ok_or(Error::InvalidInput)?;
        if rest.is_empty() {
            return Err(Error::InvalidInput);
        }
        Ok(Self {
            components: rest.split('/').peekable(),
        })
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<Token<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let component = self.components.next()?;
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.len() > NAME_MAX_LEN
        {
            return Some(Err(Error::InvalidInput));
        }

        Some(Ok(if self.components.peek().is_some() {
            Token::Branch(component)
        } else {
            Token::Leaf(component)
        }))
    }
}

impl NorFileSystem {
    /// 从根目录起解析路径，返回`(目标, 末段的父目录)`。
    ///
    /// - 全程命中：两者俱在；
    /// - 只差末段：目标为空、父目录可用，新建文件即落在这里；
    /// - 中间段缺失或不是目录：两者皆空。
    pub(crate) fn path_find(
        &self,
        path: &str,
    ) -> Result<(Option<InodeHandle>, Option<InodeHandle>), Error> {
        let root = self.root.ok_or(Error::Corrupted)?;
        if path == "/" {
            return Ok((Some(root), None));
        }

        let mut parent = root;
        for token in Tokenizer::new(path)? {
            match token? {
                Token::Branch(name) => match self.dir_lookup(parent, name.as_bytes()) {
                    Some(next) if self.inode(next).is_dir() => parent = next,
                    _ => {
                        log::debug!("path: middle segment {name:?} unresolved");
                        return Ok((None, None));
                    }
                },
                Token::Leaf(name) => {
                    return Ok((self.dir_lookup(parent, name.as_bytes()), Some(parent)));
                }
            }
        }
        unreachable!("tokenizer always ends with a leaf");
    }

    /// 解析且要求目标存在
    pub(crate) fn path_find_inode(&self, path: &str) -> Result<InodeHandle, Error> {
        let (inode, _) = self.path_find(path)?;
        inode.ok_or(Error::NotFound)
    }

    pub(crate) fn path_unlink(&mut self, path: &str) -> Result<(), Error> {
        let handle = self.path_find_inode(path)?;
        if Some(handle) == self.root {
            return Err(Error::InvalidInput);
        }
        if self.inode(handle).is_dir() && self.inode(handle).child.is_some() {
            return Err(Error::DirectoryNotEmpty);
        }

        self.inode_delete_from_disk(handle)?;

        // 句柄全关时数据块就地注销，否则连同内存拆除一起推迟
        if self.inode(handle).refcnt == 0 {
            if let Some(first) = self.inode(handle).block {
                let last = self.block_list_tail(first);
                self.block_delete_list_from_disk(first, last)?;
            }
        }
        self.inode_delete_from_ram(handle);
        Ok(())
    }

    /// 移动或改名。`to`已存在时原子地以新代旧：
    /// 旧目标先落删除记录，新记录再归于新名下。
    pub(crate) fn path_rename(&mut self, from: &str, to: &str) -> Result<(), Error> {
        let src = self.path_find_inode(from)?;
        if Some(src) == self.root {
            return Err(Error::InvalidInput);
        }

        let (dest, dest_parent) = self.path_find(to)?;
        let Some(dest_parent) = dest_parent else {
            return Err(Error::NotFound);
        };
        let leaf = to.rsplit('/').next().unwrap_or_default().as_bytes();

        // 目录不能搬进自己的子孙里
        let mut cursor = Some(dest_parent);
        while let Some(c) = cursor {
            if c == src {
                return Err(Error::InvalidInput);
            }
            cursor = self.inode(c).parent;
        }

        if let Some(dest) = dest {
            if dest == src {
                return Ok(());
            }
            match (self.inode(src).is_dir(), self.inode(dest).is_dir()) {
                (true, true) | (false, false) => {}
                _ => return Err(Error::InvalidInput),
            }
            if self.inode(dest).is_dir() && self.inode(dest).child.is_some() {
                return Err(Error::DirectoryNotEmpty);
            }

            self.inode_delete_from_disk(dest)?;
            if self.inode(dest).refcnt == 0 {
                if let Some(first) = self.inode(dest).block {
                    let last = self.block_list_tail(first);
                    self.block_delete_list_from_disk(first, last)?;
                }
            }
            self.inode_delete_from_ram(dest);
        }

        self.inode_remove_child(src);
        {
            let node = self.inode_mut(src);
            node.name_len = leaf.len() as u8;
            node.name = [0; NAME_MAX_LEN];
            node.name[..leaf.len()].copy_from_slice(leaf);
        }
        self.inode_add_child(dest_parent, src)?;
        self.inode_update_disk(src)?;
        Ok(())
    }

    pub(crate) fn path_new_dir(&mut self, path: &str) -> Result<(), Error> {
        let (inode, parent) = self.path_find(path)?;
        if inode.is_some() {
            return Err(Error::AlreadyExists);
        }
        let Some(parent) = parent else {
            return Err(Error::NotFound);
        };

        let leaf = path.rsplit('/').next().unwrap_or_default().as_bytes();
        self.inode_new(parent, leaf, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_splits_branches_and_leaf() {
        let tokens: alloc::vec::Vec<_> = Tokenizer::new("/usr/bin/env")
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(
            alloc::vec![
                Token::Branch("usr"),
                Token::Branch("bin"),
                Token::Leaf("env")
            ],
            tokens
        );
    }

    #[test]
    fn tokenizer_rejects_malformed() {
        assert!(Tokenizer::new("relative").is_err());
        assert!(Tokenizer::new("/").is_err());

        let mut empty_segment = Tokenizer::new("/a//b").unwrap();
        assert!(empty_segment.nth(1).unwrap().is_err());

        let mut relative = Tokenizer::new("/a/../b").unwrap();
        assert!(relative.nth(1).unwrap().is_err());

        let mut trailing = Tokenizer::new("/a/").unwrap();
        assert!(trailing.nth(1).unwrap().is_err());

        let mut long = Tokenizer::new("/seventeen-bytes-x").unwrap();
        assert!(long.next().unwrap().is_err());
    }
}
