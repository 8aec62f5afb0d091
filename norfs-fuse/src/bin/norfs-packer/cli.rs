use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
pub struct Cli {
    /// Host directory to pack
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,

    /// Flash area length in bytes
    #[arg(long, default_value_t = 64 * 1024)]
    pub area_len: u32,

    /// Flash area count
    #[arg(long, default_value_t = 8)]
    pub area_count: u16,
}
