//! norfs的宿主侧支撑：拿普通文件或一段内存冒充NOR闪存。

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use flash_dev::{AreaDesc, FlashDevice};

/// 文件背后的闪存：镜像按描述符表铺在文件里
pub struct FlashFile {
    file: Mutex<File>,
    descs: Vec<AreaDesc>,
}

impl FlashFile {
    pub fn new(file: File, descs: Vec<AreaDesc>) -> Self {
        Self {
            file: Mutex::new(file),
            descs,
        }
    }

    pub fn descs(&self) -> &[AreaDesc] {
        &self.descs
    }
}

impl FlashDevice for FlashFile {
    fn read(&self, area: usize, offset: u32, buf: &mut [u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((self.descs[area].offset + offset) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("short image read");
    }

    fn write(&self, area: usize, offset: u32, buf: &[u8]) {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((self.descs[area].offset + offset) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("short image write");
    }

    fn erase(&self, area: usize) {
        let desc = self.descs[area];
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(desc.offset as u64))
            .expect("seeking error");
        file.write_all(&vec![0xff; desc.length as usize])
            .expect("short image write");
    }
}

/// 内存闪存：区域连续排布，擦除回到`0xff`。
///
/// 写入可以人为“断电”：配额用尽后写与擦除都无声丢弃，
/// 介质便停留在断电一刻的样子。
pub struct RamFlash {
    areas: Mutex<Vec<Vec<u8>>>,
    descs: Vec<AreaDesc>,
    writes_left: Mutex<Option<usize>>,
}

impl RamFlash {
    pub fn new(area_count: usize, area_len: u32) -> Self {
        let descs = (0..area_count)
            .map(|i| AreaDesc::new(i as u32 * area_len, area_len))
            .collect();
        Self {
            areas: Mutex::new(vec![vec![0xff; area_len as usize]; area_count]),
            descs,
            writes_left: Mutex::new(None),
        }
    }

    pub fn descs(&self) -> &[AreaDesc] {
        &self.descs
    }

    /// 再过`count`次写入或擦除后“断电”
    pub fn cut_power_after(&self, count: usize) {
        *self.writes_left.lock().unwrap() = Some(count);
    }

    pub fn power_on(&self) {
        *self.writes_left.lock().unwrap() = None;
    }

    /// 区域内容的快照
    pub fn area_bytes(&self, area: usize) -> Vec<u8> {
        self.areas.lock().unwrap()[area].clone()
    }

    /// 直接改写介质上的一个字节，供破坏性测试用
    pub fn poke(&self, area: usize, offset: usize, value: u8) {
        self.areas.lock().unwrap()[area][offset] = value;
    }

    fn consume_write(&self) -> bool {
        let mut left = self.writes_left.lock().unwrap();
        match left.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        }
    }
}

impl FlashDevice for RamFlash {
    fn read(&self, area: usize, offset: u32, buf: &mut [u8]) {
        let areas = self.areas.lock().unwrap();
        let offset = offset as usize;
        buf.copy_from_slice(&areas[area][offset..offset + buf.len()]);
    }

    fn write(&self, area: usize, offset: u32, buf: &[u8]) {
        if !self.consume_write() {
            return;
        }
        let mut areas = self.areas.lock().unwrap();
        let offset = offset as usize;
        areas[area][offset..offset + buf.len()].copy_from_slice(buf);
    }

    fn erase(&self, area: usize) {
        if !self.consume_write() {
            return;
        }
        self.areas.lock().unwrap()[area].fill(0xff);
    }
}
