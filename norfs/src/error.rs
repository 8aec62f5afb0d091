/// 各入口的失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 对象池耗尽
    NoMemory,
    NotFound,
    AlreadyExists,
    InvalidInput,
    AccessDenied,
    DirectoryNotEmpty,
    /// 介质上的结构无法解读
    Corrupted,
    /// 垃圾回收后仍凑不出足够的连续空间
    Full,
    Io,
}
