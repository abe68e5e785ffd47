//! pagestore - byte-level access to a file through the buffer store

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use pagestore::storage::config::{DEFAULT_BATCH_SIZE, DEFAULT_CAPACITY, DEFAULT_PAGE_BITS};
use pagestore::storage::{BufferStore, PageManager, StoreConfig};
use std::fs::File;
use std::path::PathBuf;

/// pagestore - read and write bytes of a file through a page cache
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File used as the backing medium (created if missing)
    path: PathBuf,

    /// Page size as a power of two
    #[arg(short = 'b', long, default_value_t = DEFAULT_PAGE_BITS)]
    page_bits: u32,

    /// Number of pages cached in memory
    #[arg(short, long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Pages written back or dropped per eviction round
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Seed for eviction choices
    #[arg(long)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the byte at an address
    Get { address: u64 },
    /// Store a byte at an address
    Set { address: u64, value: u8 },
    /// Store the same byte over a range
    Fill { address: u64, len: usize, value: u8 },
    /// Print a range as hex
    Dump { address: u64, len: usize },
    /// Print page and pool counts
    Stat,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = StoreConfig::default()
        .with_page_bits(args.page_bits)
        .with_capacity(args.capacity)
        .with_batch_size(args.batch_size);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    config.validate().context("Invalid store configuration")?;

    let disk = PageManager::open_or_create(&args.path, config.page_bits)
        .with_context(|| format!("Failed to open medium: {:?}", args.path))?;
    let mut store = BufferStore::new(disk.into_inner(), config)?;

    run(&mut store, args.command)?;

    store.flush().context("Failed to flush dirty pages")?;
    Ok(())
}

fn run(store: &mut BufferStore<File>, command: Command) -> Result<()> {
    match command {
        Command::Get { address } => {
            let value = store.get(address)?;
            println!("{:#06x}: {:#04x}", address, value);
        }
        Command::Set { address, value } => {
            store.set(address, value)?;
        }
        Command::Fill {
            address,
            len,
            value,
        } => {
            store.write(address, &vec![value; len])?;
        }
        Command::Dump { address, len } => {
            let mut buf = vec![0u8; len];
            store.read(address, &mut buf)?;
            for (i, line) in buf.chunks(16).enumerate() {
                let hex: Vec<String> = line.iter().map(|b| format!("{:02x}", b)).collect();
                println!("{:08x}  {}", address + (i * 16) as u64, hex.join(" "));
            }
        }
        Command::Stat => {
            let stats = store.stats();
            let (clean, dirty) = store.resident_pages();
            println!("medium:    {} bytes", store.medium().metadata()?.len());
            println!("page size: {} bytes", store.page_size());
            println!("capacity:  {} frames", stats.capacity);
            println!("free:      {}", stats.free);
            println!("clean:     {} {:?}", stats.clean, clean);
            println!("dirty:     {} {:?}", stats.dirty, dirty);
        }
    }
    Ok(())
}
