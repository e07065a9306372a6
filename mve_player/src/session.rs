//! Playback session: stages records, walks their chunks and drives the
//! video codec, audio decoder, palette and clock.
//!
//! `step` runs the interpreter until one frame has been presented (or the
//! stream ends), so a host can pull frames at its own pace. All faults are
//! terminal; the only degraded path is audio with parameters the decoder
//! cannot honor, which downgrades to silent playback.

use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, trace, warn};
use thiserror::Error;

use mve_formats::chunk::{
    CHUNK_HEADER_LEN, ChunkOpcode, ChunkWalker, RecordHeader, STREAM_HEADER_LEN, StreamHeader,
};
use mve_formats::{AudioDecoder, AudioParams, PALETTE_ENTRIES, PaletteTable, VideoBlockCodec};

use crate::clock::{ClockEngine, SpeedMode};
use crate::host::{FrameView, PlaybackHost};
use crate::pool::{MemoryPool, PoolLane};

/// Which subsystem a terminal fault came from. The numeric codes are the
/// process exit codes of the headless player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    Timer = 1,
    Audio = 2,
    Video = 3,
    Graphics = 4,
    DecodingMap = 5,
    Stream = 6,
}

impl FaultCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Timer => "timer",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Graphics => "graphics",
            Self::DecodingMap => "decoding-map",
            Self::Stream => "stream",
        }
    }
}

/// Terminal playback failure. Carries the subsystem code plus the
/// underlying cause chain.
#[derive(Debug, Error)]
#[error("{} fault (code {}): {}", .code.name(), .code.code(), .detail)]
pub struct PlaybackFault {
    pub code: FaultCode,
    pub detail: anyhow::Error,
}

fn fault(code: FaultCode) -> impl FnOnce(anyhow::Error) -> PlaybackFault {
    move |detail| PlaybackFault { code, detail }
}

/// Result of one `step` call.
#[derive(Debug)]
pub enum StepOutcome {
    /// One frame was presented to the host.
    Frame,
    /// Playback is held; nothing was consumed.
    Held,
    /// The stream ended cleanly or the host aborted.
    End,
    /// Terminal fault; every later `step` also fails.
    Fatal(PlaybackFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Running,
    Ended,
    Failed,
}

/// What a dispatched chunk did, as far as the step loop cares.
enum ChunkEffect {
    None,
    NextRecord,
    FramePresented,
    FrameDropped,
    EndOfStream,
}

pub struct Session<R: Read, H: PlaybackHost> {
    reader: R,
    host: H,
    pool: MemoryPool,
    codec: VideoBlockCodec,
    audio: AudioDecoder,
    palette: PaletteTable,
    clock: Option<ClockEngine>,
    speed: SpeedMode,
    state: SessionState,
    surface: Option<(u16, u16)>,
    hicolor: bool,
    record_pos: usize,
    map_len: usize,
    audio_enabled: bool,
    frames_presented: u64,
    started_at: Instant,
    held_since: Option<Instant>,
}

impl<R: Read, H: PlaybackHost> Session<R, H> {
    /// Validate the stream header and stage the first record. A malformed
    /// header is rejected here, before any subsystem is touched.
    pub fn open(mut reader: R, host: H) -> Result<Self> {
        let mut header = [0u8; STREAM_HEADER_LEN];
        reader
            .read_exact(&mut header)
            .context("reading MVE stream header")?;
        let header = StreamHeader::parse(&header)?;
        debug!(
            "opened MVE stream, check words {:#06x}/{:#06x}",
            header.check1, header.check2
        );

        let mut session = Self {
            reader,
            host,
            pool: MemoryPool::new(),
            codec: VideoBlockCodec::new(),
            audio: AudioDecoder::new(),
            palette: PaletteTable::new(),
            clock: None,
            speed: SpeedMode::Normal,
            state: SessionState::Running,
            surface: None,
            hicolor: false,
            record_pos: 0,
            map_len: 0,
            audio_enabled: false,
            frames_presented: 0,
            started_at: Instant::now(),
            held_since: None,
        };
        session.read_record().context("staging first record")?;
        Ok(session)
    }

    /// Run the interpreter until a frame is presented, the stream ends or a
    /// fault occurs. Dropped frames do not surface; the loop keeps going.
    pub fn step(&mut self) -> StepOutcome {
        match self.state {
            SessionState::Running => {}
            SessionState::Ended => return StepOutcome::End,
            SessionState::Failed => {
                return StepOutcome::Fatal(PlaybackFault {
                    code: FaultCode::Stream,
                    detail: anyhow!("session already failed"),
                });
            }
        }
        if self.held_since.is_some() {
            return StepOutcome::Held;
        }

        loop {
            if self.host.poll_abort() {
                info!(
                    "host aborted playback after {} frames",
                    self.frames_presented
                );
                self.state = SessionState::Ended;
                return StepOutcome::End;
            }

            if self.record_pos >= self.pool.lane(PoolLane::Record).len() {
                return self.fail(fault(FaultCode::Stream)(anyhow!(
                    "record ended without an end-of-record chunk"
                )));
            }

            let (opcode, version, start, end) = {
                let record = self.pool.lane(PoolLane::Record);
                let mut walker = ChunkWalker::new(&record[self.record_pos..]);
                match walker.next_chunk() {
                    Ok(Some(chunk)) => {
                        let start = self.record_pos + CHUNK_HEADER_LEN;
                        (chunk.opcode, chunk.version, start, start + chunk.payload.len())
                    }
                    Ok(None) => {
                        return self.fail(fault(FaultCode::Stream)(anyhow!(
                            "empty record tail at offset {}",
                            self.record_pos
                        )));
                    }
                    Err(err) => return self.fail(fault(FaultCode::Stream)(err)),
                }
            };
            self.record_pos = end;
            trace!("{} chunk v{version} ({} bytes)", opcode.name(), end - start);

            match self.apply_chunk(opcode, version, start, end) {
                Ok(ChunkEffect::None) | Ok(ChunkEffect::FrameDropped) => {}
                Ok(ChunkEffect::NextRecord) => {
                    if let Err(err) = self.read_record() {
                        return self.fail(fault(FaultCode::Stream)(err));
                    }
                }
                Ok(ChunkEffect::FramePresented) => {
                    self.frames_presented += 1;
                    return StepOutcome::Frame;
                }
                Ok(ChunkEffect::EndOfStream) => {
                    info!(
                        "stream ended after {} frames ({} dropped)",
                        self.frames_presented,
                        self.frames_dropped()
                    );
                    self.state = SessionState::Ended;
                    return StepOutcome::End;
                }
                Err(fault) => return self.fail(fault),
            }
        }
    }

    /// Freeze playback. While held, `step` is a no-op; the hold duration is
    /// added to every pending frame deadline on resume.
    pub fn hold_playback(&mut self) {
        if self.held_since.is_none() {
            self.held_since = Some(Instant::now());
        }
    }

    pub fn resume_playback(&mut self) {
        if let Some(held_at) = self.held_since.take() {
            let held_us = held_at.elapsed().as_micros() as u64;
            if let Some(clock) = &mut self.clock {
                clock.defer(held_us);
            }
            debug!("resumed after {held_us}us held");
        }
    }

    pub fn set_speed_mode(&mut self, speed: SpeedMode) {
        self.speed = speed;
    }

    /// Tear down every buffer the session grew. The session is finished
    /// afterwards; `step` reports a clean end.
    pub fn release_resources(&mut self) {
        self.pool.shrink();
        self.codec = VideoBlockCodec::new();
        self.audio = AudioDecoder::new();
        self.clock = None;
        self.map_len = 0;
        self.audio_enabled = false;
        self.state = SessionState::Ended;
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn frames_dropped(&self) -> u64 {
        self.clock.as_ref().map_or(0, ClockEngine::frames_dropped)
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    pub fn audio_buffered(&self) -> usize {
        self.audio.ring().buffered()
    }

    /// Move committed PCM out of the ring, freeing writer space.
    pub fn drain_audio(&mut self, out: &mut [i16]) -> usize {
        self.audio.ring_mut().consume(out)
    }

    pub fn video_size(&self) -> Option<(usize, usize)> {
        self.codec
            .is_configured()
            .then(|| (self.codec.width(), self.codec.height()))
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    fn fail(&mut self, fault: PlaybackFault) -> StepOutcome {
        error!("{fault:#}");
        self.state = SessionState::Failed;
        StepOutcome::Fatal(fault)
    }

    /// Stage the next record into the pool's record lane.
    fn read_record(&mut self) -> Result<()> {
        let mut header = [0u8; 4];
        self.reader
            .read_exact(&mut header)
            .context("reading record header")?;
        let header = RecordHeader::parse(&header)?;
        let buf = self.pool.lane_mut(PoolLane::Record);
        buf.clear();
        buf.resize(header.len as usize, 0);
        self.reader
            .read_exact(buf)
            .with_context(|| format!("reading {} byte {:?} record", header.len, header.kind))?;
        self.record_pos = 0;
        trace!("staged {:?} record ({} bytes)", header.kind, header.len);
        Ok(())
    }

    fn apply_chunk(
        &mut self,
        opcode: ChunkOpcode,
        version: u8,
        start: usize,
        end: usize,
    ) -> Result<ChunkEffect, PlaybackFault> {
        match opcode {
            ChunkOpcode::EndOfStream => return Ok(ChunkEffect::EndOfStream),
            ChunkOpcode::EndOfRecord => return Ok(ChunkEffect::NextRecord),

            ChunkOpcode::CreateTimer => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let rate = read_u32(payload, 0).map_err(fault(FaultCode::Timer))?;
                let divider = read_u16(payload, 4).map_err(fault(FaultCode::Timer))?;
                let clock = ClockEngine::new(rate, divider).map_err(fault(FaultCode::Timer))?;
                debug!("timer period {}us", clock.period_us());
                self.clock = Some(clock);
            }

            ChunkOpcode::AllocAudioBuffers => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let params =
                    AudioParams::parse(payload, version).map_err(fault(FaultCode::Audio))?;
                match self.audio.configure(params) {
                    Ok(()) => {
                        debug!(
                            "audio: {}ch {}-bit {}Hz{}",
                            params.channels,
                            params.bits,
                            params.sample_rate,
                            if params.delta_coded { " delta" } else { "" }
                        );
                        self.audio_enabled = true;
                    }
                    Err(err) => {
                        warn!("audio disabled, playing silent: {err:#}");
                        self.audio_enabled = false;
                    }
                }
            }

            ChunkOpcode::SynchAudio => {
                if self.audio_enabled && self.audio.sync() {
                    debug!("audio ring ran dry before synch");
                }
            }

            ChunkOpcode::AllocVideoBuffers => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let width_blocks = read_u16(payload, 0).map_err(fault(FaultCode::Video))?;
                let height_blocks = read_u16(payload, 2).map_err(fault(FaultCode::Video))?;
                self.codec
                    .configure(width_blocks, height_blocks, self.hicolor, self.surface)
                    .map_err(fault(FaultCode::Video))?;
            }

            ChunkOpcode::DecompVideoLegacy => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let flags = read_u16(payload, 0).map_err(fault(FaultCode::Video))?;
                let map_len = read_u16(payload, 2).map_err(fault(FaultCode::Video))? as usize;
                if payload.len() < 4 + map_len {
                    return Err(fault(FaultCode::Video)(anyhow!(
                        "legacy video chunk shorter than its inline map"
                    )));
                }
                let map = &payload[4..4 + map_len];
                let data = &payload[4 + map_len..];
                self.codec
                    .decode_frame(map, data, flags & 0x01 != 0)
                    .map_err(fault(FaultCode::Video))?;
            }

            ChunkOpcode::ShowFrame => {
                return self.show_frame(start, end);
            }

            ChunkOpcode::AudioFrame | ChunkOpcode::SilenceFrame => {
                let silence = opcode == ChunkOpcode::SilenceFrame;
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let seq = read_u16(payload, 0).map_err(fault(FaultCode::Audio))?;
                let stream_mask = read_u16(payload, 2).map_err(fault(FaultCode::Audio))?;
                let pcm_len = read_u16(payload, 4).map_err(fault(FaultCode::Audio))? as usize;
                if self.audio_enabled && stream_mask & 0x01 != 0 {
                    trace!("audio frame {seq}: {pcm_len} PCM bytes, silence={silence}");
                    self.audio
                        .decode_frame(&payload[6..], pcm_len, silence)
                        .map_err(fault(FaultCode::Audio))?;
                }
            }

            ChunkOpcode::InitGraphics => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let width = read_u16(payload, 0).map_err(fault(FaultCode::Graphics))?;
                let height = read_u16(payload, 2).map_err(fault(FaultCode::Graphics))?;
                let flags = read_u16(payload, 4).map_err(fault(FaultCode::Graphics))?;
                if width == 0 || height == 0 {
                    return Err(fault(FaultCode::Graphics)(anyhow!(
                        "empty graphics surface {width}x{height}"
                    )));
                }
                self.surface = Some((width, height));
                self.hicolor = flags & 0x01 != 0;
                debug!(
                    "graphics surface {width}x{height}, hicolor={}",
                    self.hicolor
                );
            }

            ChunkOpcode::SynthPalette => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                self.palette
                    .synthesize_from_components(payload)
                    .map_err(fault(FaultCode::Stream))?;
            }

            ChunkOpcode::LoadPalette => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let pal_start = read_u16(payload, 0).map_err(fault(FaultCode::Stream))?;
                let count = read_u16(payload, 2).map_err(fault(FaultCode::Stream))?;
                self.palette
                    .load_range(pal_start as usize, count as usize, &payload[4..])
                    .map_err(fault(FaultCode::Stream))?;
            }

            ChunkOpcode::LoadPaletteCompressed => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                self.palette
                    .load_compressed(payload)
                    .map_err(fault(FaultCode::Stream))?;
            }

            ChunkOpcode::SetPaletteEntries => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                self.palette
                    .set_entries(payload)
                    .map_err(fault(FaultCode::Stream))?;
            }

            ChunkOpcode::SetDecodingMap => {
                self.pool.stage_map_from_record(start..end);
                self.map_len = end - start;
            }

            ChunkOpcode::SetDecodingMapDirect => {
                if version != 1 {
                    return Err(fault(FaultCode::DecodingMap)(anyhow!(
                        "unsupported direct decoding-map version {version}"
                    )));
                }
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let block_count = read_u16(payload, 0).map_err(fault(FaultCode::DecodingMap))?;
                let map = &payload[2..];
                if map.len() * 2 < block_count as usize {
                    return Err(fault(FaultCode::DecodingMap)(anyhow!(
                        "direct map holds {} nibbles for {block_count} blocks",
                        map.len() * 2
                    )));
                }
                self.pool.stage_map_from_record(start + 2..end);
                self.map_len = end - start - 2;
            }

            ChunkOpcode::DecompVideo => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let frame_seq = read_u16(payload, 0).map_err(fault(FaultCode::Video))?;
                let flags = read_u16(payload, 2).map_err(fault(FaultCode::Video))?;
                if self.map_len == 0 {
                    return Err(fault(FaultCode::DecodingMap)(anyhow!(
                        "video frame {frame_seq} arrived with no decoding map staged"
                    )));
                }
                let map_len = self.map_len;
                self.codec
                    .decode_frame(
                        &self.pool.lane(PoolLane::DecodingMap)[..map_len],
                        &self.pool.lane(PoolLane::Record)[start + 4..end],
                        flags & 0x01 != 0,
                    )
                    .map_err(fault(FaultCode::Video))?;
            }

            ChunkOpcode::DecompVideoRaw => {
                let payload = &self.pool.lane(PoolLane::Record)[start..end];
                let _frame_seq = read_u16(payload, 0).map_err(fault(FaultCode::Video))?;
                let flags = read_u16(payload, 2).map_err(fault(FaultCode::Video))?;
                self.codec
                    .decode_raw_frame(&payload[4..], flags & 0x01 != 0)
                    .map_err(fault(FaultCode::Video))?;
            }
        }
        Ok(ChunkEffect::None)
    }

    /// Apply the clock's present-or-drop decision, then hand the frame to
    /// the host. Without a timer every frame is presented immediately.
    fn show_frame(&mut self, start: usize, end: usize) -> Result<ChunkEffect, PlaybackFault> {
        let payload = &self.pool.lane(PoolLane::Record)[start..end];
        let pal_start = read_u16(payload, 0).map_err(fault(FaultCode::Stream))? as usize;
        let pal_count = read_u16(payload, 2).map_err(fault(FaultCode::Stream))? as usize;
        if pal_start + pal_count > PALETTE_ENTRIES {
            return Err(fault(FaultCode::Stream)(anyhow!(
                "show-frame palette range {pal_start}+{pal_count} out of bounds"
            )));
        }
        if !self.codec.is_configured() {
            return Err(fault(FaultCode::Video)(anyhow!(
                "show-frame before alloc-video-buffers"
            )));
        }

        if let Some(clock) = &mut self.clock {
            let now_us = self.started_at.elapsed().as_micros() as u64;
            let level = clock.wait_level(now_us);
            if level > clock.period_us() as i64 && !clock.drop_owed() {
                clock.mark_frame_dropped();
                clock.advance();
                debug!(
                    "dropped frame {} ({}us behind)",
                    self.frames_presented, level
                );
                return Ok(ChunkEffect::FrameDropped);
            }
            if level < 0 && self.speed == SpeedMode::Normal {
                thread::sleep(Duration::from_micros(level.unsigned_abs()));
            }
            clock.mark_frame_presented();
            clock.advance();
        }

        let frame = FrameView {
            pixels: self.codec.current_frame(),
            width: self.codec.width(),
            height: self.codec.height(),
            stride: self.codec.stride(),
            hicolor: self.codec.hicolor(),
            palette: &self.palette,
            palette_start: pal_start,
            palette_count: pal_count,
        };
        self.host
            .present_frame(frame)
            .map_err(fault(FaultCode::Graphics))?;
        Ok(ChunkEffect::FramePresented)
    }
}

fn read_u16(payload: &[u8], offset: usize) -> Result<u16> {
    let bytes = payload
        .get(offset..offset + 2)
        .with_context(|| format!("chunk payload truncated at offset {offset}"))?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(payload: &[u8], offset: usize) -> Result<u32> {
    let bytes = payload
        .get(offset..offset + 4)
        .with_context(|| format!("chunk payload truncated at offset {offset}"))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_codes_are_stable() {
        assert_eq!(FaultCode::Timer.code(), 1);
        assert_eq!(FaultCode::Audio.code(), 2);
        assert_eq!(FaultCode::Video.code(), 3);
        assert_eq!(FaultCode::Graphics.code(), 4);
        assert_eq!(FaultCode::DecodingMap.code(), 5);
        assert_eq!(FaultCode::Stream.code(), 6);
    }

    #[test]
    fn fault_display_names_the_subsystem() {
        let fault = PlaybackFault {
            code: FaultCode::DecodingMap,
            detail: anyhow!("no map staged"),
        };
        let text = fault.to_string();
        assert!(text.contains("decoding-map"), "{text}");
        assert!(text.contains("code 5"), "{text}");
    }

    #[test]
    fn payload_readers_reject_truncation() {
        assert!(read_u16(&[1], 0).is_err());
        assert_eq!(read_u16(&[0x34, 0x12], 0).unwrap(), 0x1234);
        assert!(read_u32(&[1, 2, 3], 0).is_err());
        assert_eq!(read_u32(&[1, 0, 0, 0], 0).unwrap(), 1);
    }
}
