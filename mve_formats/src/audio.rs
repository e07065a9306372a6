//! Audio frame decoding into a fixed-capacity PCM ring.
//!
//! The stream carries 8/16-bit mono/stereo PCM, either raw or delta-coded
//! against a 256-entry signed expansion table. Decoded samples land in an
//! [`AudioRing`] through an acquire/commit window so an external sink can
//! drain from its own read window without ever racing the writer.

use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};

/// Audio stream parameters from an alloc-audio-buffers chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioParams {
    pub channels: u16,
    pub sample_rate: u16,
    pub bits: u16,
    pub delta_coded: bool,
    pub min_buffer_len: u32,
}

impl AudioParams {
    /// Parse the alloc-audio-buffers payload. Version 1 widens the
    /// minimum-buffer hint to 32 bits and adds the delta flag.
    pub fn parse(payload: &[u8], version: u8) -> Result<Self> {
        ensure!(payload.len() >= 8, "alloc-audio-buffers payload too short");
        let flags = LittleEndian::read_u16(&payload[2..4]);
        let sample_rate = LittleEndian::read_u16(&payload[4..6]);
        let channels = if flags & 0x01 != 0 { 2 } else { 1 };
        let bits = if flags & 0x02 != 0 { 16 } else { 8 };
        let delta_coded = version >= 1 && flags & 0x04 != 0;
        let min_buffer_len = if version >= 1 {
            ensure!(payload.len() >= 10, "v1 alloc-audio-buffers payload too short");
            LittleEndian::read_u32(&payload[6..10])
        } else {
            u32::from(LittleEndian::read_u16(&payload[6..8]))
        };
        Ok(Self {
            channels,
            sample_rate,
            bits,
            delta_coded,
            min_buffer_len,
        })
    }

    fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits / 8)
    }
}

/// Signed delta expansion table, derived by formula: a cubic ramp that is
/// fine-grained near zero and close to full scale at the extremes, mirrored
/// for the negative half, with the one unmatched minimum at index 128.
pub fn delta_expansion_table() -> [i16; 256] {
    fn ramp(i: usize) -> i16 {
        (i + i * i * i / 64) as i16
    }
    let mut table = [0i16; 256];
    for i in 0..=127 {
        table[i] = ramp(i);
    }
    table[128] = i16::MIN;
    for i in 129..=255 {
        table[i] = -ramp(256 - i);
    }
    table
}

/// Fixed-capacity circular PCM buffer with independent read/write cursors.
/// The writer claims a contiguous window with [`AudioRing::acquire`] and
/// publishes it with [`AudioRing::commit`]; the reader drains committed
/// samples only. A full ring hands out an empty window instead of
/// overwriting unread data.
pub struct AudioRing {
    samples: Vec<i16>,
    read_pos: usize,
    write_pos: usize,
    committed: usize,
    acquired: usize,
}

impl AudioRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity.max(1)],
            read_pos: 0,
            write_pos: 0,
            committed: 0,
            acquired: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples committed and not yet consumed.
    pub fn buffered(&self) -> usize {
        self.committed
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.committed
    }

    /// Claim a contiguous write window of at most `want` samples. The
    /// window may be shorter than requested near the wrap point or when the
    /// ring is nearly full; it is empty when the ring is full.
    pub fn acquire(&mut self, want: usize) -> &mut [i16] {
        let len = want
            .min(self.free())
            .min(self.capacity() - self.write_pos);
        self.acquired = len;
        &mut self.samples[self.write_pos..self.write_pos + len]
    }

    /// Publish `count` samples of the acquired window.
    pub fn commit(&mut self, count: usize) -> Result<()> {
        ensure!(
            count <= self.acquired,
            "commit of {count} samples exceeds acquired window of {}",
            self.acquired
        );
        self.write_pos = (self.write_pos + count) % self.capacity();
        self.committed += count;
        self.acquired = 0;
        Ok(())
    }

    /// Drain committed samples into `out`, returning how many were copied.
    pub fn consume(&mut self, out: &mut [i16]) -> usize {
        let mut copied = 0;
        while copied < out.len() && self.committed > 0 {
            let run = (out.len() - copied)
                .min(self.committed)
                .min(self.capacity() - self.read_pos);
            out[copied..copied + run]
                .copy_from_slice(&self.samples[self.read_pos..self.read_pos + run]);
            self.read_pos = (self.read_pos + run) % self.capacity();
            self.committed -= run;
            copied += run;
        }
        copied
    }
}

/// Decodes audio chunks and feeds the ring.
pub struct AudioDecoder {
    params: Option<AudioParams>,
    ring: AudioRing,
    table: [i16; 256],
    predictors: [i16; 2],
    start_threshold: usize,
    started: bool,
}

impl AudioDecoder {
    pub fn new() -> Self {
        Self {
            params: None,
            ring: AudioRing::with_capacity(1),
            table: delta_expansion_table(),
            predictors: [0; 2],
            start_threshold: 1,
            started: false,
        }
    }

    pub fn params(&self) -> Option<&AudioParams> {
        self.params.as_ref()
    }

    pub fn ring(&self) -> &AudioRing {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut AudioRing {
        &mut self.ring
    }

    /// Create or replace the ring from the stream parameters. Unsupported
    /// combinations are rejected here; the caller decides whether that
    /// downgrades playback or fails the session.
    pub fn configure(&mut self, params: AudioParams) -> Result<()> {
        ensure!(params.sample_rate > 0, "audio sample rate of zero");
        if params.delta_coded {
            ensure!(
                params.bits == 16,
                "delta-coded audio requires 16-bit samples"
            );
        }
        let hint_samples = params.min_buffer_len as usize / params.bytes_per_sample();
        // Double the hint so one staged frame never starves the sink.
        let capacity = hint_samples.max(1024) * 2;
        self.ring = AudioRing::with_capacity(capacity);
        self.predictors = [0; 2];
        // Half the stream's own buffer hint is "sufficient" to start.
        self.start_threshold = (hint_samples / 2).max(1);
        self.started = false;
        self.params = Some(params);
        Ok(())
    }

    /// Decode one audio or silence frame. `pcm_len` is the byte length the
    /// chunk header declared; a payload that decodes to anything else is a
    /// chunk integrity error. Returns the number of samples committed.
    pub fn decode_frame(&mut self, payload: &[u8], pcm_len: usize, silence: bool) -> Result<usize> {
        let params = *self
            .params
            .as_ref()
            .context("audio frame before alloc-audio-buffers")?;
        if silence {
            let samples = pcm_len / params.bytes_per_sample();
            return self.write_silence(samples);
        }
        if params.delta_coded {
            let seed_bytes = usize::from(params.channels) * 2;
            ensure!(
                payload.len() >= seed_bytes,
                "delta audio frame shorter than its channel seeds"
            );
            // Seeds expand to one sample each, every other byte to one
            // 16-bit sample.
            let decoded_bytes = 2 * payload.len() - seed_bytes;
            ensure!(
                decoded_bytes == pcm_len,
                "delta audio frame decodes to {decoded_bytes} bytes, header declared {pcm_len}"
            );
            self.write_delta(payload, params.channels as usize)
        } else {
            ensure!(
                payload.len() == pcm_len,
                "audio frame carries {} bytes, header declared {pcm_len}",
                payload.len()
            );
            self.write_raw(payload, &params)
        }
    }

    /// Start the sink once enough PCM is staged; reports whether playback
    /// has fallen behind (started but the ring ran dry).
    pub fn sync(&mut self) -> bool {
        if !self.started && self.ring.buffered() >= self.start_threshold {
            self.started = true;
        }
        self.started && self.ring.buffered() == 0
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn write_silence(&mut self, mut samples: usize) -> Result<usize> {
        let mut written = 0;
        while samples > 0 {
            let window = self.ring.acquire(samples);
            if window.is_empty() {
                bail!("audio ring full while writing silence");
            }
            let len = window.len();
            window.fill(0);
            self.ring.commit(len)?;
            samples -= len;
            written += len;
        }
        Ok(written)
    }

    fn write_raw(&mut self, payload: &[u8], params: &AudioParams) -> Result<usize> {
        if params.bits == 16 {
            ensure!(payload.len() % 2 == 0, "odd 16-bit PCM payload length");
            let mut samples = payload.chunks_exact(2).map(LittleEndian::read_i16);
            self.push_all(payload.len() / 2, &mut samples)
        } else {
            // 8-bit PCM is unsigned and centered into the 16-bit ring.
            let mut samples = payload
                .iter()
                .map(|&b| ((i16::from(b)) - 128) << 8);
            self.push_all(payload.len(), &mut samples)
        }
    }

    fn write_delta(&mut self, payload: &[u8], channels: usize) -> Result<usize> {
        let seed_bytes = channels * 2;
        ensure!(
            payload.len() >= seed_bytes,
            "delta audio frame shorter than its channel seeds"
        );
        for channel in 0..channels {
            self.predictors[channel] =
                LittleEndian::read_i16(&payload[channel * 2..channel * 2 + 2]);
        }
        let deltas = &payload[seed_bytes..];
        let total = channels + deltas.len();

        let mut channel = 0usize;
        let mut emitted_seeds = 0usize;
        let mut delta_pos = 0usize;
        let table = self.table;
        let mut predictors = self.predictors;
        let mut samples = std::iter::from_fn(|| {
            if emitted_seeds < channels {
                let value = predictors[emitted_seeds];
                emitted_seeds += 1;
                return Some(value);
            }
            let byte = *deltas.get(delta_pos)?;
            delta_pos += 1;
            let next = i32::from(predictors[channel]) + i32::from(table[byte as usize]);
            predictors[channel] = next.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
            let value = predictors[channel];
            channel = (channel + 1) % channels;
            Some(value)
        });
        let written = self.push_all(total, &mut samples)?;
        self.predictors = predictors;
        Ok(written)
    }

    fn push_all(
        &mut self,
        total: usize,
        samples: &mut dyn Iterator<Item = i16>,
    ) -> Result<usize> {
        let mut written = 0;
        while written < total {
            let window = self.ring.acquire(total - written);
            if window.is_empty() {
                bail!(
                    "audio ring full: {} of {} samples staged",
                    written,
                    total
                );
            }
            let mut filled = 0;
            for slot in window.iter_mut() {
                match samples.next() {
                    Some(value) => {
                        *slot = value;
                        filled += 1;
                    }
                    None => break,
                }
            }
            self.ring.commit(filled)?;
            written += filled;
            if filled == 0 {
                break;
            }
        }
        Ok(written)
    }
}

impl Default for AudioDecoder {
    fn default() -> Self {
        Self::new()
    }
}
