//! Stream header, record headers and the chunk opcode enumeration.
//!
//! An MVE file is a 26-byte header followed by records; each record is a
//! flat run of opcode-tagged chunks. Everything here is pure parsing over
//! borrowed bytes so the interpreter can stage one record at a time.

use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian};

/// Fixed magic prefix of every MVE stream.
pub const STREAM_MAGIC: &[u8; 20] = b"Interplay MVE File\x1a\0";

/// Header tag word following the magic.
pub const HEADER_TAG: u16 = 0x001A;

/// Bias added to the ones'-complement of the first check word.
pub const HEADER_CHECK_BIAS: u16 = 0x1234;

/// Total size of the stream header in bytes.
pub const STREAM_HEADER_LEN: usize = 26;

/// Size of a record header (payload length + record kind).
pub const RECORD_HEADER_LEN: usize = 4;

/// Size of a chunk header (payload length + opcode + version).
pub const CHUNK_HEADER_LEN: usize = 4;

/// Validated stream header. Only the two check words carry information;
/// the magic and tag word are constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub check1: u16,
    pub check2: u16,
}

impl StreamHeader {
    /// Parse and validate the header. Rejects the stream before any decode
    /// work if the magic, tag word or check relationship is off.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= STREAM_HEADER_LEN,
            "stream shorter than MVE header: {} bytes",
            bytes.len()
        );
        if &bytes[..20] != STREAM_MAGIC {
            bail!("missing Interplay MVE magic");
        }
        let tag = LittleEndian::read_u16(&bytes[20..22]);
        ensure!(tag == HEADER_TAG, "bad MVE header tag {tag:#06x}");

        let check1 = LittleEndian::read_u16(&bytes[22..24]);
        let check2 = LittleEndian::read_u16(&bytes[24..26]);
        let expected = (!check1).wrapping_add(HEADER_CHECK_BIAS);
        ensure!(
            check2 == expected,
            "MVE header check mismatch: {check2:#06x} != {expected:#06x}"
        );
        Ok(Self { check1, check2 })
    }

    /// Encode a valid header for the given first check word.
    pub fn encode(check1: u16) -> [u8; STREAM_HEADER_LEN] {
        let mut out = [0u8; STREAM_HEADER_LEN];
        out[..20].copy_from_slice(STREAM_MAGIC);
        LittleEndian::write_u16(&mut out[20..22], HEADER_TAG);
        LittleEndian::write_u16(&mut out[22..24], check1);
        LittleEndian::write_u16(&mut out[24..26], (!check1).wrapping_add(HEADER_CHECK_BIAS));
        out
    }
}

/// Record kinds as written by the retail encoder. Informational only; the
/// interpreter dispatches on chunk opcodes, not record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    InitAudio,
    Audio,
    InitVideo,
    Video,
    Shutdown,
    End,
    Other(u16),
}

impl From<u16> for RecordKind {
    fn from(value: u16) -> Self {
        match value {
            0 => Self::InitAudio,
            1 => Self::Audio,
            2 => Self::InitVideo,
            3 => Self::Video,
            4 => Self::Shutdown,
            5 => Self::End,
            other => Self::Other(other),
        }
    }
}

/// Header of one physical record.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub len: u16,
    pub kind: RecordKind,
}

impl RecordHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(bytes.len() >= RECORD_HEADER_LEN, "truncated record header");
        let len = LittleEndian::read_u16(&bytes[0..2]);
        let kind = RecordKind::from(LittleEndian::read_u16(&bytes[2..4]));
        Ok(Self { len, kind })
    }

    pub fn encode(len: u16, kind: u16) -> [u8; RECORD_HEADER_LEN] {
        let mut out = [0u8; RECORD_HEADER_LEN];
        LittleEndian::write_u16(&mut out[0..2], len);
        LittleEndian::write_u16(&mut out[2..4], kind);
        out
    }
}

/// Closed enumeration of chunk opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkOpcode {
    EndOfStream = 0x00,
    EndOfRecord = 0x01,
    CreateTimer = 0x02,
    AllocAudioBuffers = 0x03,
    SynchAudio = 0x04,
    AllocVideoBuffers = 0x05,
    DecompVideoLegacy = 0x06,
    ShowFrame = 0x07,
    AudioFrame = 0x08,
    SilenceFrame = 0x09,
    InitGraphics = 0x0A,
    SynthPalette = 0x0B,
    LoadPalette = 0x0C,
    LoadPaletteCompressed = 0x0D,
    SetPaletteEntries = 0x0E,
    SetDecodingMap = 0x0F,
    SetDecodingMapDirect = 0x10,
    DecompVideo = 0x11,
    DecompVideoRaw = 0x12,
}

impl TryFrom<u8> for ChunkOpcode {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0x00 => Self::EndOfStream,
            0x01 => Self::EndOfRecord,
            0x02 => Self::CreateTimer,
            0x03 => Self::AllocAudioBuffers,
            0x04 => Self::SynchAudio,
            0x05 => Self::AllocVideoBuffers,
            0x06 => Self::DecompVideoLegacy,
            0x07 => Self::ShowFrame,
            0x08 => Self::AudioFrame,
            0x09 => Self::SilenceFrame,
            0x0A => Self::InitGraphics,
            0x0B => Self::SynthPalette,
            0x0C => Self::LoadPalette,
            0x0D => Self::LoadPaletteCompressed,
            0x0E => Self::SetPaletteEntries,
            0x0F => Self::SetDecodingMap,
            0x10 => Self::SetDecodingMapDirect,
            0x11 => Self::DecompVideo,
            0x12 => Self::DecompVideoRaw,
            other => bail!("unknown chunk opcode {other:#04x}"),
        })
    }
}

impl ChunkOpcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::EndOfStream => "end-of-stream",
            Self::EndOfRecord => "end-of-record",
            Self::CreateTimer => "create-timer",
            Self::AllocAudioBuffers => "alloc-audio-buffers",
            Self::SynchAudio => "synch-audio",
            Self::AllocVideoBuffers => "alloc-video-buffers",
            Self::DecompVideoLegacy => "decomp-video-legacy",
            Self::ShowFrame => "show-frame",
            Self::AudioFrame => "audio-frame",
            Self::SilenceFrame => "silence-frame",
            Self::InitGraphics => "init-graphics",
            Self::SynthPalette => "synth-palette",
            Self::LoadPalette => "load-palette",
            Self::LoadPaletteCompressed => "load-palette-compressed",
            Self::SetPaletteEntries => "set-palette-entries",
            Self::SetDecodingMap => "set-decoding-map",
            Self::SetDecodingMapDirect => "set-decoding-map-direct",
            Self::DecompVideo => "decomp-video",
            Self::DecompVideoRaw => "decomp-video-raw",
        }
    }
}

/// One chunk borrowed out of a record.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub opcode: ChunkOpcode,
    pub version: u8,
    pub payload: &'a [u8],
}

/// Walks the chunks of one staged record. Parsed headers are discarded as
/// soon as the payload slice is handed out; nothing here is retained.
pub struct ChunkWalker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkWalker<'a> {
    pub fn new(record: &'a [u8]) -> Self {
        Self {
            data: record,
            pos: 0,
        }
    }

    /// Fetch the next chunk, or `None` once the record is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk<'a>>> {
        if self.pos == self.data.len() {
            return Ok(None);
        }
        ensure!(
            self.pos + CHUNK_HEADER_LEN <= self.data.len(),
            "trailing bytes too short for a chunk header at offset {}",
            self.pos
        );
        let len = LittleEndian::read_u16(&self.data[self.pos..self.pos + 2]) as usize;
        let opcode = ChunkOpcode::try_from(self.data[self.pos + 2])
            .with_context(|| format!("chunk at offset {}", self.pos))?;
        let version = self.data[self.pos + 3];
        let start = self.pos + CHUNK_HEADER_LEN;
        let end = start
            .checked_add(len)
            .context("chunk length overflow")?;
        ensure!(
            end <= self.data.len(),
            "{} chunk payload runs past the record ({} > {})",
            opcode.name(),
            end,
            self.data.len()
        );
        self.pos = end;
        Ok(Some(Chunk {
            opcode,
            version,
            payload: &self.data[start..end],
        }))
    }
}

/// Append one encoded chunk to a record buffer. Shared by the CLI tools and
/// the fixture-building tests.
pub fn push_chunk(record: &mut Vec<u8>, opcode: ChunkOpcode, version: u8, payload: &[u8]) {
    let mut header = [0u8; CHUNK_HEADER_LEN];
    LittleEndian::write_u16(&mut header[0..2], payload.len() as u16);
    header[2] = opcode as u8;
    header[3] = version;
    record.extend_from_slice(&header);
    record.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let bytes = StreamHeader::encode(0x0100);
        let header = StreamHeader::parse(&bytes).unwrap();
        assert_eq!(header.check1, 0x0100);
        assert_eq!(header.check2, 0x1133);
    }

    #[test]
    fn every_single_byte_mutation_is_rejected() {
        let valid = StreamHeader::encode(0x0100);
        for position in 0..STREAM_HEADER_LEN {
            let mut mutated = valid;
            mutated[position] ^= 0x40;
            assert!(
                StreamHeader::parse(&mutated).is_err(),
                "mutation at byte {position} slipped through"
            );
        }
        assert!(StreamHeader::parse(&valid).is_ok());
    }

    #[test]
    fn truncated_header_is_rejected() {
        let valid = StreamHeader::encode(0x0100);
        assert!(StreamHeader::parse(&valid[..STREAM_HEADER_LEN - 1]).is_err());
    }

    #[test]
    fn walker_yields_chunks_in_order() {
        let mut record = Vec::new();
        push_chunk(&mut record, ChunkOpcode::CreateTimer, 0, &[1, 2, 3, 4, 5, 6]);
        push_chunk(&mut record, ChunkOpcode::EndOfRecord, 0, &[]);

        let mut walker = ChunkWalker::new(&record);
        let first = walker.next_chunk().unwrap().unwrap();
        assert_eq!(first.opcode, ChunkOpcode::CreateTimer);
        assert_eq!(first.payload.len(), 6);
        let second = walker.next_chunk().unwrap().unwrap();
        assert_eq!(second.opcode, ChunkOpcode::EndOfRecord);
        assert!(walker.next_chunk().unwrap().is_none());
    }

    #[test]
    fn walker_rejects_overlong_chunk() {
        let mut record = Vec::new();
        push_chunk(&mut record, ChunkOpcode::AudioFrame, 0, &[0u8; 8]);
        record.truncate(record.len() - 2);
        let mut walker = ChunkWalker::new(&record);
        assert!(walker.next_chunk().is_err());
    }

    #[test]
    fn walker_rejects_unknown_opcode() {
        let record = vec![0u8, 0, 0x30, 0];
        let mut walker = ChunkWalker::new(&record);
        assert!(walker.next_chunk().is_err());
    }
}
