use std::{
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use chunker_core::{ChunkCodec, ChunkFormat, FrameInfo};
use clap::Args;
use serde_json::Value;

/// Print the records stored in a chunk file
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// The chunk file to inspect
    #[arg(name = "FILE")]
    pub file: PathBuf,

    /// Treat a chunk without a frame header as compressed
    #[arg(long)]
    pub compressed: bool,
}

/// Run the `inspect` command
pub async fn run_inspect(args: InspectArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("unable to read chunk file: {}", args.file.display()))?;

    let codec = ChunkCodec::new(args.compressed, ChunkFormat::Raw);
    let info = codec
        .inspect(&bytes)
        .with_context(|| format!("invalid chunk file: {}", args.file.display()))?;
    let records: Vec<Value> = codec
        .decode(&bytes)
        .with_context(|| format!("unable to decode chunk file: {}", args.file.display()))?;

    let stdout = io::stdout().lock();
    let mut writer = BufWriter::new(stdout);
    for record in &records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    eprintln!("{}, {} records", describe(&info), records.len());

    Ok(())
}

fn describe(info: &FrameInfo) -> String {
    let compression = if info.compressed {
        "compressed"
    } else {
        "uncompressed"
    };
    match info.version {
        Some(version) => format!(
            "Framed chunk (version {version}), {compression}, {} payload bytes",
            info.payload_len
        ),
        None => format!(
            "Headerless chunk, {compression}, {} bytes",
            info.payload_len
        ),
    }
}
