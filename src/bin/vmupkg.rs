//! vmupkg
//!
//! Inspect, extract and build memory card save packages on the host

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use vmu_saves::core::{compression, frame, package};
use vmu_saves::{PackageTemplate, SaveConfig, BLOCK_SIZE};

#[derive(Parser, Debug)]
#[command(name = "vmupkg")]
#[command(about = "Inspect and build memory card save packages")]
struct Args {
    /// TOML configuration supplying the package descriptions
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header of a package file
    Inspect {
        file: PathBuf,
    },

    /// Write the save bytes held by a package file
    Extract {
        file: PathBuf,
        out: PathBuf,

        /// Keep LZ4-compressed saves compressed
        #[arg(long)]
        raw: bool,
    },

    /// Build a framed package from a save file
    Pack {
        long_name: String,
        input: PathBuf,
        out: PathBuf,

        /// Compress the save with LZ4 before framing
        #[arg(long)]
        compress: bool,

        /// Largest package to produce, in bytes
        #[arg(long, default_value_t = 200 * BLOCK_SIZE)]
        max_size: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SaveConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SaveConfig::default(),
    };

    match args.command {
        Command::Inspect { file } => inspect(&file),
        Command::Extract { file, out, raw } => extract(&file, &out, raw),
        Command::Pack {
            long_name,
            input,
            out,
            compress,
            max_size,
        } => pack(&config, &long_name, &input, &out, compress, max_size),
    }
}

fn inspect(file: &Path) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let parsed = package::parse(&bytes)?;
    let header = &parsed.header;

    println!("short description: {}", header.short_description());
    println!("long description:  {}", header.long_description());
    println!("application id:    {}", header.app_id());
    println!("icons:             {} (speed {})", header.icon_count, header.icon_anim_speed);
    println!("eye-catch:         {:?} ({} bytes)", header.eyecatch_type, parsed.eyecatch.len());
    println!("payload:           {} bytes at offset {}", parsed.payload.len(), parsed.payload_offset());
    println!(
        "package:           {} bytes, {} block(s)",
        parsed.encoded_len(),
        parsed.encoded_len().div_ceil(BLOCK_SIZE)
    );

    match frame::read_frame(parsed.payload) {
        Ok(framed) => {
            println!("long name:         {}", framed.long_name);
            println!(
                "save:              {} bytes{}",
                framed.save.len(),
                if compression::is_compressed(framed.save) {
                    " (LZ4)"
                } else {
                    ""
                }
            );
        }
        Err(_) => println!("long name:         (raw package, no frame)"),
    }
    Ok(())
}

fn extract(file: &Path, out: &Path, raw: bool) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let parsed = package::parse(&bytes)?;
    let framed = frame::read_frame(parsed.payload)
        .with_context(|| format!("{} does not hold a framed save", file.display()))?;

    let save = if raw {
        framed.save.to_vec()
    } else {
        compression::decompress(framed.save)?
    };
    fs::write(out, &save).with_context(|| format!("writing {}", out.display()))?;

    info!(long_name = %framed.long_name, bytes = save.len(), "save extracted");
    Ok(())
}

fn pack(
    config: &SaveConfig,
    long_name: &str,
    input: &Path,
    out: &Path,
    compress: bool,
    max_size: usize,
) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let save = if compress {
        compression::compress(&data)?
    } else {
        data
    };

    let template = PackageTemplate::from_config(config);
    let (framed, _) = frame::write_frame(long_name, &save)?;
    let bytes = template.build(long_name, &framed, max_size)?;
    fs::write(out, &bytes).with_context(|| format!("writing {}", out.display()))?;

    println!(
        "{}: {} bytes, {} block(s)",
        out.display(),
        bytes.len(),
        bytes.len().div_ceil(BLOCK_SIZE)
    );
    Ok(())
}
