use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser as ArgParser, Subcommand};

use agdb_codecs::codec_for;
use agdb_core::{
    BlockIndex, ContainerHeader, Database, FileSource, FileType, Parser, UncompressedStream,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(ArgParser)]
#[command(
    name = "agdb",
    about = "Inspect and decode Windows SuperFetch database files",
    version
)]
struct Cli {
    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode and print volume, file, and source records
    Info {
        /// SuperFetch database file (e.g. AgGlGlobalHistory.db)
        file: PathBuf,
        /// Emit the records as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print container classification and block index statistics
    Inspect {
        /// SuperFetch database file
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::TRACE
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { file, json } => run_info(&file, json),
        Commands::Inspect { file, blocks } => run_inspect(&file, blocks),
    }
}

// ── info ───────────────────────────────────────────────────────────────────

fn open_database(path: &Path) -> anyhow::Result<Database> {
    let mut source = FileSource::open(path)
        .with_context(|| format!("unable to open {}", path.display()))?;
    let header = ContainerHeader::read(&mut source).context("unable to read container header")?;
    let codec = codec_for(header.file_type);
    let index =
        BlockIndex::scan(&mut source, &header).context("unable to index compressed blocks")?;
    let stream = UncompressedStream::new(source, header, index, codec);
    Parser::new(stream)
        .parse()
        .with_context(|| format!("unable to parse {}", path.display()))
}

fn run_info(path: &Path, json: bool) -> anyhow::Result<()> {
    let database = open_database(path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&database)?);
        return Ok(());
    }

    println!("Windows SuperFetch database information:");
    println!();
    println!("Volumes:");
    println!("\tNumber of volumes\t\t: {}", database.volumes.len());
    println!();
    for (index, volume) in database.volumes.iter().enumerate() {
        println!("Volume: {} information:", index + 1);
        println!("\tDevice path\t\t\t: {}", volume.device_path_lossy());
        println!(
            "\tCreation time\t\t\t: {}",
            format_filetime(volume.creation_time)
        );
        println!("\tSerial number\t\t\t: 0x{:08x}", volume.serial_number);
        println!();
        println!("Files:");
        println!("\tNumber of files\t\t\t: {}", volume.files.len());
        println!();
        for (file_index, file) in volume.files.iter().enumerate() {
            println!("File: {} information:", file_index + 1);
            println!("\tPath\t\t\t\t: {}", file.path_lossy());
            println!();
        }
    }
    println!("Sources:");
    println!("\tNumber of sources\t\t: {}", database.sources.len());
    println!();
    for (index, source) in database.sources.iter().enumerate() {
        println!("Source: {} information:", index + 1);
        println!(
            "\tExecutable filename\t\t: {}",
            source.executable_filename()
        );
        println!();
    }

    Ok(())
}

// ── inspect ────────────────────────────────────────────────────────────────

fn file_type_name(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Uncompressed => "uncompressed",
        FileType::CompressedVista => "compressed (Windows Vista, LZNT1)",
        FileType::CompressedWindows7 => "compressed (Windows 7, LZXpress-Huffman)",
        FileType::CompressedWindows8 => "compressed (Windows 8, LZXpress-Huffman)",
    }
}

fn run_inspect(path: &Path, blocks: bool) -> anyhow::Result<()> {
    let mut source = FileSource::open(path)
        .with_context(|| format!("unable to open {}", path.display()))?;
    let header = ContainerHeader::read(&mut source).context("unable to read container header")?;

    println!("Container:");
    println!("\tFile type\t\t\t: {}", file_type_name(header.file_type));
    println!("\tFile size\t\t\t: {}", header.file_size);
    println!(
        "\tUncompressed block size\t\t: {}",
        header.uncompressed_block_size
    );
    println!(
        "\tUncompressed data size\t\t: {}",
        header.uncompressed_total_size
    );
    println!();

    let index =
        BlockIndex::scan(&mut source, &header).context("unable to index compressed blocks")?;
    let compressed_total: u64 = index
        .blocks()
        .iter()
        .map(|block| u64::from(block.compressed_size))
        .sum();

    println!("Blocks:");
    println!("\tNumber of blocks\t\t: {}", index.len());
    println!("\tCompressed bytes\t\t: {compressed_total}");
    if compressed_total > 0 {
        println!(
            "\tCompression ratio\t\t: {:.2}",
            u64::from(header.uncompressed_total_size) as f64 / compressed_total as f64
        );
    }
    if blocks {
        println!();
        for (number, block) in index.blocks().iter().enumerate() {
            println!(
                "\tBlock {number}: offset {}, {} -> {} bytes",
                block.compressed_offset, block.compressed_size, block.uncompressed_size
            );
        }
    }

    Ok(())
}

// ── FILETIME rendering ─────────────────────────────────────────────────────

const FILETIME_TICKS_PER_SECOND: u64 = 10_000_000;
const SECONDS_1601_TO_1970: i64 = 11_644_473_600;

/// Render a FILETIME (100ns ticks since 1601-01-01 UTC) as a UTC date-time.
fn format_filetime(filetime: u64) -> String {
    if filetime == 0 {
        return "not set".to_string();
    }
    let seconds = (filetime / FILETIME_TICKS_PER_SECOND) as i64 - SECONDS_1601_TO_1970;
    let days = seconds.div_euclid(86_400);
    let time_of_day = seconds.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);
    format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02} UTC",
        time_of_day / 3_600,
        (time_of_day / 60) % 60,
        time_of_day % 60
    )
}

/// Gregorian date from days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let days = days + 719_468;
    let era = days.div_euclid(146_097);
    let day_of_era = days.rem_euclid(146_097);
    let year_of_era = (day_of_era - day_of_era / 1_460 + day_of_era / 36_524
        - day_of_era / 146_096)
        / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
