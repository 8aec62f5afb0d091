mod cli;

use std::fs::{self, File, OpenOptions};
use std::io;
use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use flash_dev::AreaDesc;
use norfs::{NorFileSystem, OpenFlag};
use norfs_fuse::FlashFile;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    println!("source={:?}", cli.source);

    let image_len = cli.area_len as u64 * cli.area_count as u64;
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(cli.out_dir.join("fs.img"))?;
    fd.set_len(image_len)?;

    let descs: Vec<AreaDesc> = (0..cli.area_count)
        .map(|i| AreaDesc::new(i as u32 * cli.area_len, cli.area_len))
        .collect();
    let dev = Arc::new(FlashFile::new(fd, descs.clone()));
    let mut fs = NorFileSystem::format(dev, &descs).expect("format image");

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };

        let mut host_file = File::open(entry.path())?;
        let mut data = Vec::new();
        host_file.read_to_end(&mut data)?;

        log::info!("packing {name:?} ({} bytes)", data.len());
        let path = format!("/{name}");
        let fd = match fs.open(&path, OpenFlag::Create | OpenFlag::Write) {
            Ok(fd) => fd,
            Err(e) => {
                log::warn!("skipping {name:?}: {e:?}");
                continue;
            }
        };
        fs.write(fd, &data).expect("image full");
        fs.close(fd).expect("close packed file");
    }

    Ok(())
}
