use std::sync::Arc;

use norfs::disk::INODE_MAGIC;
use norfs::{Error, NorFileSystem, OpenFlag};
use norfs_fuse::RamFlash;

const AREA_LEN: u32 = 4096;

fn flash(areas: usize) -> Arc<RamFlash> {
    Arc::new(RamFlash::new(areas, AREA_LEN))
}

fn format(dev: &Arc<RamFlash>) -> NorFileSystem {
    NorFileSystem::format(dev.clone(), dev.descs()).unwrap()
}

fn remount(dev: &Arc<RamFlash>) -> NorFileSystem {
    NorFileSystem::restore(dev.clone(), dev.descs()).unwrap()
}

fn write_file(fs: &mut NorFileSystem, path: &str, data: &[u8]) {
    let fd = fs.open(path, OpenFlag::Create | OpenFlag::Write).unwrap();
    assert_eq!(data.len(), fs.write(fd, data).unwrap());
    fs.close(fd).unwrap();
}

fn read_file(fs: &mut NorFileSystem, path: &str) -> Vec<u8> {
    let fd = fs.open(path, OpenFlag::Read.into()).unwrap();
    let mut buf = vec![0u8; 64 * 1024];
    let len = fs.read(fd, &mut buf).unwrap();
    fs.close(fd).unwrap();
    buf.truncate(len);
    buf
}

/// 介质上搜一条指定`seq`的索引节点记录，返回区域内偏移
fn find_inode_record(dev: &RamFlash, area: usize, seq: u32) -> Option<usize> {
    let bytes = dev.area_bytes(area);
    (0..bytes.len() - 12).find(|&i| {
        u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap()) == INODE_MAGIC
            && u32::from_le_bytes(bytes[i + 8..i + 12].try_into().unwrap()) == seq
    })
}

#[test]
fn create_write_read() {
    let dev = flash(2);
    let mut fs = format(&dev);

    write_file(&mut fs, "/a", b"hello");

    let fd = fs.open("/a", OpenFlag::Read.into()).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(5, fs.read(fd, &mut buf).unwrap());
    assert_eq!(b"hello", &buf);
    fs.close(fd).unwrap();
}

#[test]
fn multi_block_file_survives_remount() {
    let dev = flash(3);
    let mut fs = format(&dev);

    fs.mkdir("/d").unwrap();
    write_file(&mut fs, "/d/f", &[0xAA; 600]);
    drop(fs);

    let mut fs = remount(&dev);
    assert_eq!(vec![0xAA; 600], read_file(&mut fs, "/d/f"));
}

#[test]
fn gc_reclaims_unlinked_space() {
    let dev = flash(3);
    let mut fs = format(&dev);

    // 塞到接近全满
    let names: Vec<String> = (0..14).map(|i| format!("/f{i}")).collect();
    for name in &names {
        write_file(&mut fs, name, &[0x5A; 482]);
    }

    for name in names.iter().take(7) {
        fs.unlink(name).unwrap();
    }

    // 大于任何一个区域尾部的剩余空间，必须经过一次回收
    let big: Vec<u8> = (0..1500).map(|i| i as u8).collect();
    write_file(&mut fs, "/big", &big);
    assert_eq!(big, read_file(&mut fs, "/big"));

    // 没删的文件毫发无损
    for name in names.iter().skip(7) {
        assert_eq!(vec![0x5A; 482], read_file(&mut fs, name));
    }

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(big, read_file(&mut fs, "/big"));
}

#[test]
fn full_media_reports_full() {
    let dev = flash(2);
    let mut fs = format(&dev);

    let fd = fs.open("/fat", OpenFlag::Create | OpenFlag::Write).unwrap();
    let err = loop {
        match fs.write(fd, &[0u8; 482]) {
            Ok(_) => {}
            Err(e) => break e,
        }
    };
    assert_eq!(Error::Full, err);
}

#[test]
fn rename_replaces_existing_target() {
    let dev = flash(3);
    let mut fs = format(&dev);

    write_file(&mut fs, "/a", b"fresh");
    write_file(&mut fs, "/b", b"stale");

    fs.rename("/a", "/b").unwrap();
    assert_eq!(Err(Error::NotFound), fs.open("/a", OpenFlag::Read.into()));
    assert_eq!(b"fresh".to_vec(), read_file(&mut fs, "/b"));

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(Err(Error::NotFound), fs.open("/a", OpenFlag::Read.into()));
    assert_eq!(b"fresh".to_vec(), read_file(&mut fs, "/b"));
}

#[test]
fn rename_moves_directory() {
    let dev = flash(3);
    let mut fs = format(&dev);

    fs.mkdir("/d1").unwrap();
    fs.mkdir("/d2").unwrap();
    write_file(&mut fs, "/d1/f", b"content");

    fs.rename("/d1", "/d2/moved").unwrap();
    assert_eq!(b"content".to_vec(), read_file(&mut fs, "/d2/moved/f"));

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(b"content".to_vec(), read_file(&mut fs, "/d2/moved/f"));
}

#[test]
fn overwrite_mid_file() {
    let dev = flash(3);
    let mut fs = format(&dev);

    let data: Vec<u8> = (0..2000).map(|i| i as u8).collect();
    write_file(&mut fs, "/x", &data);

    let fd = fs.open("/x", OpenFlag::Read | OpenFlag::Write).unwrap();
    fs.seek(fd, 500).unwrap();
    assert_eq!(10, fs.write(fd, &[0x55; 10]).unwrap());
    fs.close(fd).unwrap();

    let mut expected = data;
    expected[500..510].fill(0x55);
    assert_eq!(expected, read_file(&mut fs, "/x"));

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(expected, read_file(&mut fs, "/x"));
}

#[test]
fn corrupt_record_falls_back_to_prior_version() {
    let dev = flash(2);
    let mut fs = format(&dev);

    write_file(&mut fs, "/a", b"hello");
    fs.rename("/a", "/b").unwrap();
    drop(fs);

    // 抹掉改名那条记录的魔数，旧版本重新生效
    let offset = find_inode_record(&dev, 0, 1).expect("the rename record");
    dev.poke(0, offset, 0x00);

    let mut fs = remount(&dev);
    assert_eq!(Err(Error::NotFound), fs.open("/b", OpenFlag::Read.into()));
    assert_eq!(b"hello".to_vec(), read_file(&mut fs, "/a"));
}

#[test]
fn power_cut_between_reserve_and_write_is_invisible() {
    let dev = flash(2);
    let mut fs = format(&dev);

    write_file(&mut fs, "/keep", b"hello");

    dev.cut_power_after(0);
    write_file(&mut fs, "/lost", b"vanishes");
    drop(fs);
    dev.power_on();

    let mut fs = remount(&dev);
    assert_eq!(b"hello".to_vec(), read_file(&mut fs, "/keep"));
    assert_eq!(Err(Error::NotFound), fs.open("/lost", OpenFlag::Read.into()));
}

#[test]
fn unlink_survives_remount() {
    let dev = flash(2);
    let mut fs = format(&dev);

    write_file(&mut fs, "/gone", b"bye");
    fs.unlink("/gone").unwrap();
    assert_eq!(Err(Error::NotFound), fs.open("/gone", OpenFlag::Read.into()));

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(Err(Error::NotFound), fs.open("/gone", OpenFlag::Read.into()));
}

#[test]
fn repeated_restore_is_idempotent() {
    let dev = flash(3);
    let mut fs = format(&dev);

    fs.mkdir("/d").unwrap();
    write_file(&mut fs, "/d/f", &[7; 900]);
    write_file(&mut fs, "/top", b"abc");
    fs.unlink("/top").unwrap();
    drop(fs);

    let mut first = remount(&dev);
    let from_first = read_file(&mut first, "/d/f");
    drop(first);

    let mut second = remount(&dev);
    assert_eq!(from_first, read_file(&mut second, "/d/f"));
    assert_eq!(vec![7; 900], from_first);
    assert_eq!(
        Err(Error::NotFound),
        second.open("/top", OpenFlag::Read.into())
    );
}

#[test]
fn deep_paths_resolve() {
    let dev = flash(3);
    let mut fs = format(&dev);

    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    fs.mkdir("/a/b/c").unwrap();
    write_file(&mut fs, "/a/b/c/leaf", b"deep");

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(b"deep".to_vec(), read_file(&mut fs, "/a/b/c/leaf"));
}

#[test]
fn read_through_handle_outlives_unlink() {
    let dev = flash(2);
    let mut fs = format(&dev);

    let fd = fs.open("/f", OpenFlag::Create | OpenFlag::Write | OpenFlag::Read).unwrap();
    assert_eq!(7, fs.write(fd, b"payload").unwrap());

    fs.unlink("/f").unwrap();
    assert_eq!(Err(Error::NotFound), fs.open("/f", OpenFlag::Read.into()));

    // 旧句柄照常读
    fs.seek(fd, 0).unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(7, fs.read(fd, &mut buf).unwrap());
    assert_eq!(b"payload", &buf);
    fs.close(fd).unwrap();

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(Err(Error::NotFound), fs.open("/f", OpenFlag::Read.into()));
}

#[test]
fn truncate_discards_content() {
    let dev = flash(3);
    let mut fs = format(&dev);

    write_file(&mut fs, "/t", &[1; 600]);

    let fd = fs
        .open("/t", OpenFlag::Write | OpenFlag::Truncate)
        .unwrap();
    assert_eq!(3, fs.write(fd, b"new").unwrap());
    fs.close(fd).unwrap();

    assert_eq!(b"new".to_vec(), read_file(&mut fs, "/t"));

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(b"new".to_vec(), read_file(&mut fs, "/t"));
}

#[test]
fn append_writes_at_end() {
    let dev = flash(2);
    let mut fs = format(&dev);

    write_file(&mut fs, "/log", b"abc");

    let fd = fs.open("/log", OpenFlag::Write | OpenFlag::Append).unwrap();
    assert_eq!(3, fs.write(fd, b"def").unwrap());
    fs.close(fd).unwrap();

    assert_eq!(b"abcdef".to_vec(), read_file(&mut fs, "/log"));
}

#[test]
fn filename_length_boundary() {
    let dev = flash(2);
    let mut fs = format(&dev);

    write_file(&mut fs, "/0123456789abcdef", b"ok");
    assert_eq!(b"ok".to_vec(), read_file(&mut fs, "/0123456789abcdef"));

    assert_eq!(
        Err(Error::InvalidInput),
        fs.open("/0123456789abcdefg", OpenFlag::Create | OpenFlag::Write)
    );
}

#[test]
fn error_cases() {
    let dev = flash(2);
    let mut fs = format(&dev);

    assert_eq!(Err(Error::NotFound), fs.open("/nope", OpenFlag::Read.into()));
    assert_eq!(
        Err(Error::NotFound),
        fs.open("/no/parent", OpenFlag::Create | OpenFlag::Write)
    );
    assert_eq!(Err(Error::InvalidInput), fs.open("relative", OpenFlag::Read.into()));
    assert_eq!(Err(Error::InvalidInput), fs.open("/a/../b", OpenFlag::Read.into()));
    assert_eq!(Err(Error::InvalidInput), fs.open("/", OpenFlag::Read.into()));
    assert_eq!(Err(Error::InvalidInput), fs.unlink("/"));

    fs.mkdir("/d").unwrap();
    assert_eq!(Err(Error::AlreadyExists), fs.mkdir("/d"));
    assert_eq!(Err(Error::InvalidInput), fs.open("/d", OpenFlag::Read.into()));

    write_file(&mut fs, "/d/f", b"x");
    assert_eq!(Err(Error::DirectoryNotEmpty), fs.unlink("/d"));

    // 文件顶替目录、目录顶替非空目录都不行
    write_file(&mut fs, "/plain", b"y");
    assert_eq!(Err(Error::InvalidInput), fs.rename("/plain", "/d"));
    fs.mkdir("/d2").unwrap();
    assert_eq!(Err(Error::DirectoryNotEmpty), fs.rename("/d2", "/d"));
    // 目录不能搬进自己的子孙里
    assert_eq!(Err(Error::InvalidInput), fs.rename("/d", "/d/sub"));

    let fd = fs.open("/plain", OpenFlag::Write.into()).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(Err(Error::AccessDenied), fs.read(fd, &mut buf));
    fs.close(fd).unwrap();

    let fd = fs.open("/plain", OpenFlag::Read.into()).unwrap();
    assert_eq!(Err(Error::AccessDenied), fs.write(fd, b"z"));
    assert_eq!(Err(Error::InvalidInput), fs.seek(fd, 2));
    fs.close(fd).unwrap();

    assert_eq!(
        Err(Error::InvalidInput),
        fs.open("/plain", OpenFlag::Truncate.into())
    );
}

#[test]
fn write_seek_read_round_trip() {
    let dev = flash(3);
    let mut fs = format(&dev);

    let data: Vec<u8> = (0..1500).map(|i| (i * 7) as u8).collect();
    let fd = fs
        .open("/rt", OpenFlag::Create | OpenFlag::Write | OpenFlag::Read)
        .unwrap();
    assert_eq!(data.len(), fs.write(fd, &data).unwrap());

    fs.seek(fd, 0).unwrap();
    let mut buf = vec![0u8; data.len()];
    assert_eq!(data.len(), fs.read(fd, &mut buf).unwrap());
    assert_eq!(data, buf);
    fs.close(fd).unwrap();
}

#[test]
fn gc_survives_remount_mid_generation() {
    let dev = flash(3);
    let mut fs = format(&dev);

    // 多轮覆盖写迫使回收轮转几圈
    let mut last = Vec::new();
    for round in 0..6u8 {
        last = vec![round; 700];
        write_file(&mut fs, "/churn", &last);
        fs.unlink("/churn").unwrap();
        write_file(&mut fs, "/churn", &last);
    }

    drop(fs);
    let mut fs = remount(&dev);
    assert_eq!(last, read_file(&mut fs, "/churn"));
}
