//! Palette table plus its derived 15-bit hicolor table.
//!
//! Stream palettes use 6-bit components; entries are widened to 8 bits on
//! load. The hicolor table is a pure function of the RGB table and is
//! rebuilt privately after every mutation path, never written directly.

use anyhow::{Result, ensure};

pub const PALETTE_ENTRIES: usize = 256;

/// Width of one component in the stream (6 bits, VGA DAC convention).
const COMPONENT_MAX: u8 = 63;

#[derive(Clone)]
pub struct PaletteTable {
    rgb: [[u8; 3]; PALETTE_ENTRIES],
    hicolor: [u16; PALETTE_ENTRIES],
}

impl PaletteTable {
    pub fn new() -> Self {
        let mut table = Self {
            rgb: [[0; 3]; PALETTE_ENTRIES],
            hicolor: [0; PALETTE_ENTRIES],
        };
        table.recompute_hicolor();
        table
    }

    /// 8-bit RGB triple for a palette index.
    pub fn rgb(&self, index: u8) -> [u8; 3] {
        self.rgb[index as usize]
    }

    /// Packed 1555 value for a palette index.
    pub fn hicolor(&self, index: u8) -> u16 {
        self.hicolor[index as usize]
    }

    pub fn hicolor_table(&self) -> &[u16; PALETTE_ENTRIES] {
        &self.hicolor
    }

    /// Overwrite a contiguous range from 6-bit component triples.
    pub fn load_range(&mut self, start: usize, count: usize, bytes: &[u8]) -> Result<()> {
        ensure!(
            start + count <= PALETTE_ENTRIES,
            "palette range {start}+{count} exceeds {PALETTE_ENTRIES} entries"
        );
        ensure!(
            bytes.len() >= count * 3,
            "palette payload holds {} bytes, range needs {}",
            bytes.len(),
            count * 3
        );
        for (entry, triple) in self.rgb[start..start + count]
            .iter_mut()
            .zip(bytes.chunks_exact(3))
        {
            *entry = [
                widen_component(triple[0]),
                widen_component(triple[1]),
                widen_component(triple[2]),
            ];
        }
        self.recompute_hicolor();
        Ok(())
    }

    /// Apply a compressed palette chunk: a 32-byte presence bitmask, then
    /// one 6-bit triple per set bit, in index order.
    pub fn load_compressed(&mut self, payload: &[u8]) -> Result<()> {
        ensure!(payload.len() >= 32, "compressed palette mask truncated");
        let (mask, mut data) = payload.split_at(32);
        for index in 0..PALETTE_ENTRIES {
            if mask[index / 8] >> (index % 8) & 1 == 0 {
                continue;
            }
            ensure!(
                data.len() >= 3,
                "compressed palette data ends before entry {index}"
            );
            self.rgb[index] = [
                widen_component(data[0]),
                widen_component(data[1]),
                widen_component(data[2]),
            ];
            data = &data[3..];
        }
        self.recompute_hicolor();
        Ok(())
    }

    /// Sparse updates: explicit (index, triple) pairs.
    pub fn set_entries(&mut self, payload: &[u8]) -> Result<()> {
        ensure!(payload.len() >= 2, "palette entry list truncated");
        let count = u16::from_le_bytes([payload[0], payload[1]]) as usize;
        let data = &payload[2..];
        ensure!(
            data.len() >= count * 4,
            "palette entry list declares {count} entries, payload too short"
        );
        for entry in data.chunks_exact(4).take(count) {
            self.rgb[entry[0] as usize] = [
                widen_component(entry[1]),
                widen_component(entry[2]),
                widen_component(entry[3]),
            ];
        }
        self.recompute_hicolor();
        Ok(())
    }

    /// Build a palette from base/step parameters instead of literal bytes:
    /// one red/blue ramp block and one red/green ramp block, each laid out
    /// row-major from its base index.
    pub fn synthesize_from_components(&mut self, payload: &[u8]) -> Result<()> {
        ensure!(payload.len() >= 6, "synthetic palette payload too short");
        self.fill_ramp(
            payload[0] as usize,
            payload[1] as usize,
            payload[2] as usize,
            false,
        )?;
        self.fill_ramp(
            payload[3] as usize,
            payload[4] as usize,
            payload[5] as usize,
            true,
        )?;
        self.recompute_hicolor();
        Ok(())
    }

    fn fill_ramp(&mut self, base: usize, rows: usize, cols: usize, green: bool) -> Result<()> {
        ensure!(
            base + rows * cols <= PALETTE_ENTRIES,
            "synthetic palette ramp {base}+{rows}x{cols} exceeds the table"
        );
        for row in 0..rows {
            for col in 0..cols {
                let r = ramp_component(row, rows);
                let other = ramp_component(col, cols);
                let entry = &mut self.rgb[base + row * cols + col];
                *entry = if green {
                    [widen_component(r), widen_component(other), 0]
                } else {
                    [widen_component(r), 0, widen_component(other)]
                };
            }
        }
        Ok(())
    }

    fn recompute_hicolor(&mut self) {
        for (packed, rgb) in self.hicolor.iter_mut().zip(self.rgb.iter()) {
            *packed = pack_1555(rgb[0], rgb[1], rgb[2]);
        }
    }
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Widen a 6-bit DAC component to 8 bits, replicating the top bits so full
/// scale maps to 255.
fn widen_component(value: u8) -> u8 {
    let v = value.min(COMPONENT_MAX);
    (v << 2) | (v >> 4)
}

/// Even spacing of `steps` levels over the 6-bit component range.
fn ramp_component(step: usize, steps: usize) -> u8 {
    if steps <= 1 {
        return 0;
    }
    (step * COMPONENT_MAX as usize / (steps - 1)) as u8
}

fn pack_1555(r: u8, g: u8, b: u8) -> u16 {
    (u16::from(r >> 3) << 10) | (u16::from(g >> 3) << 5) | u16::from(b >> 3)
}
