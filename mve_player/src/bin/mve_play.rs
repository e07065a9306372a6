//! Headless MVE player: decodes a movie end to end and reports what it
//! played. Faults exit with the subsystem's numeric code.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use mve_player::{CountingHost, Session, SpeedMode, StepOutcome};

#[derive(Parser, Debug)]
#[command(about = "Play an Interplay MVE movie without a display", version)]
struct Args {
    /// MVE file to play
    path: PathBuf,

    /// Decode as fast as possible instead of honoring the stream timer
    #[arg(long)]
    fast: bool,

    /// Emit the playback summary as JSON
    #[arg(long)]
    json: bool,

    /// Stop after this many presented frames
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Summary {
    path: String,
    frames_presented: u64,
    frames_dropped: u64,
    audio_samples: u64,
    width: usize,
    height: usize,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file =
        File::open(&args.path).with_context(|| format!("opening {}", args.path.display()))?;
    let mut session = Session::open(BufReader::new(file), CountingHost::default())
        .with_context(|| format!("opening MVE stream {}", args.path.display()))?;
    if args.fast {
        session.set_speed_mode(SpeedMode::Fast);
    }

    let started = Instant::now();
    let mut audio_samples = 0u64;
    let mut scratch = vec![0i16; 4096];
    loop {
        match session.step() {
            StepOutcome::Frame => {
                audio_samples += drain(&mut session, &mut scratch);
                if args
                    .max_frames
                    .is_some_and(|limit| session.frames_presented() >= limit)
                {
                    break;
                }
            }
            StepOutcome::Held => {}
            StepOutcome::End => break,
            StepOutcome::Fatal(fault) => {
                eprintln!("{fault:#}");
                std::process::exit(i32::from(fault.code.code()));
            }
        }
    }
    audio_samples += drain(&mut session, &mut scratch);

    let (width, height) = session.video_size().unwrap_or((0, 0));
    let summary = Summary {
        path: args.path.display().to_string(),
        frames_presented: session.frames_presented(),
        frames_dropped: session.frames_dropped(),
        audio_samples,
        width,
        height,
        elapsed_ms: started.elapsed().as_millis(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} frames ({} dropped), {} audio samples, {}x{}, {} ms",
            summary.path,
            summary.frames_presented,
            summary.frames_dropped,
            summary.audio_samples,
            summary.width,
            summary.height,
            summary.elapsed_ms
        );
    }
    Ok(())
}

fn drain(session: &mut Session<BufReader<File>, CountingHost>, scratch: &mut [i16]) -> u64 {
    let mut total = 0u64;
    loop {
        let drained = session.drain_audio(scratch);
        if drained == 0 {
            return total;
        }
        total += drained as u64;
    }
}
