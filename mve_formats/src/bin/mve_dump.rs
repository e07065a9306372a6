//! Inventory tool: walks the records and chunks of an MVE file and prints
//! what the stream contains, without decoding any payloads.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};
use clap::Parser;
use memmap2::MmapOptions;
use serde::Serialize;

use mve_formats::chunk::{
    ChunkOpcode, ChunkWalker, RECORD_HEADER_LEN, RecordHeader, STREAM_HEADER_LEN, StreamHeader,
};

#[derive(Parser, Debug)]
#[command(about = "Dump the record/chunk inventory of an Interplay MVE file", version)]
struct Args {
    /// MVE file to inspect
    path: PathBuf,

    /// Emit the inventory as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Print every chunk instead of the per-opcode summary
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct Inventory {
    path: String,
    records: usize,
    chunks: usize,
    opcode_counts: BTreeMap<String, usize>,
    payload_bytes: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = File::open(&args.path)
        .with_context(|| format!("opening MVE file {}", args.path.display()))?;
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .with_context(|| format!("memory-mapping {}", args.path.display()))?;

    let header = StreamHeader::parse(&mmap).context("validating MVE header")?;
    log::debug!(
        "header check words {:#06x}/{:#06x}",
        header.check1,
        header.check2
    );

    let mut offset = STREAM_HEADER_LEN;
    let mut inventory = Inventory {
        path: args.path.display().to_string(),
        records: 0,
        chunks: 0,
        opcode_counts: BTreeMap::new(),
        payload_bytes: 0,
    };
    let mut finished = false;

    while !finished {
        ensure!(
            offset + RECORD_HEADER_LEN <= mmap.len(),
            "record header at {offset} runs past end of file"
        );
        let header = RecordHeader::parse(&mmap[offset..])?;
        let start = offset + RECORD_HEADER_LEN;
        let end = start + header.len as usize;
        ensure!(end <= mmap.len(), "record at {offset} runs past end of file");

        inventory.records += 1;
        if args.verbose {
            println!("record {:>4} kind {:?} ({} bytes)", inventory.records, header.kind, header.len);
        }

        let mut walker = ChunkWalker::new(&mmap[start..end]);
        while let Some(chunk) = walker.next_chunk()? {
            inventory.chunks += 1;
            inventory.payload_bytes += chunk.payload.len() as u64;
            *inventory
                .opcode_counts
                .entry(chunk.opcode.name().to_string())
                .or_insert(0) += 1;
            if args.verbose {
                println!(
                    "  {:<24} v{} {:>6} bytes",
                    chunk.opcode.name(),
                    chunk.version,
                    chunk.payload.len()
                );
            }
            if chunk.opcode == ChunkOpcode::EndOfStream {
                finished = true;
            }
        }
        offset = end;
        if offset == mmap.len() {
            break;
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
    } else {
        println!(
            "{}: {} records, {} chunks, {} payload bytes",
            inventory.path, inventory.records, inventory.chunks, inventory.payload_bytes
        );
        for (name, count) in &inventory.opcode_counts {
            println!("{name:<24} {count:>6}");
        }
    }
    Ok(())
}
