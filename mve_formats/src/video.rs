// SPDX-License-Identifier: GPL-2.0-or-later
//
// 8x8 block codec for Interplay MVE video frames.
//
// Each frame is described by a nibble-per-block decoding map plus a data
// stream of literal bytes. Sixteen block codes cover temporal skips, motion
// compensation against the current or previous frame, bit-packed two- and
// four-color pattern synthesis, and a handful of coarse fills. Decoding
// always reads temporal sources from the previous buffer and writes the
// current one; the pair is swapped (never copied) when a chunk requests a
// frame advance.

use anyhow::{Context, Result, bail, ensure};

/// Edge length of one block in pixels.
pub const BLOCK_EDGE: usize = 8;

/// Number of pixels in one block.
pub const BLOCK_PIXELS: usize = BLOCK_EDGE * BLOCK_EDGE;

/// Byte cursor over a chunk payload. Every advance is checked against the
/// payload length so corrupt streams surface as errors, never as UB.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let value = *self
            .data
            .get(self.pos)
            .context("video data stream truncated")?;
        self.pos += 1;
        Ok(value)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).context("video cursor overflow")?;
        ensure!(end <= self.data.len(), "video data stream truncated");
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

/// Decodes 8x8 blocks into an alternating current/previous frame pair.
pub struct VideoBlockCodec {
    width_blocks: usize,
    height_blocks: usize,
    stride: usize,
    height: usize,
    hicolor: bool,
    current: Vec<u8>,
    previous: Vec<u8>,
}

impl VideoBlockCodec {
    pub fn new() -> Self {
        Self {
            width_blocks: 0,
            height_blocks: 0,
            stride: 0,
            height: 0,
            hicolor: false,
            current: Vec::new(),
            previous: Vec::new(),
        }
    }

    /// Size the frame pair in block units. Buffers only ever grow so a
    /// reconfigure mid-stream reuses the existing allocation.
    pub fn configure(
        &mut self,
        width_blocks: u16,
        height_blocks: u16,
        hicolor: bool,
        surface: Option<(u16, u16)>,
    ) -> Result<()> {
        ensure!(
            width_blocks > 0 && height_blocks > 0,
            "video geometry {width_blocks}x{height_blocks} blocks is empty"
        );
        let width_px = width_blocks as usize * BLOCK_EDGE;
        let height_px = height_blocks as usize * BLOCK_EDGE;
        if let Some((surface_w, surface_h)) = surface {
            ensure!(
                width_px <= surface_w as usize && height_px <= surface_h as usize,
                "video geometry {width_px}x{height_px} exceeds surface {surface_w}x{surface_h}"
            );
        }
        let frame_len = width_px
            .checked_mul(height_px)
            .context("video frame size overflow")?;

        self.width_blocks = width_blocks as usize;
        self.height_blocks = height_blocks as usize;
        self.stride = width_px;
        self.height = height_px;
        self.hicolor = hicolor;
        if self.current.len() < frame_len {
            self.current.resize(frame_len, 0);
            self.previous.resize(frame_len, 0);
        }
        self.current[..frame_len].fill(0);
        self.previous[..frame_len].fill(0);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.stride > 0
    }

    pub fn width(&self) -> usize {
        self.stride
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn hicolor(&self) -> bool {
        self.hicolor
    }

    pub fn frame_len(&self) -> usize {
        self.stride * self.height
    }

    /// Pixels of the frame most recently decoded into.
    pub fn current_frame(&self) -> &[u8] {
        &self.current[..self.frame_len()]
    }

    /// Pixels of the temporal reference frame.
    pub fn previous_frame(&self) -> &[u8] {
        &self.previous[..self.frame_len()]
    }

    /// Decode one frame. `map` holds one nibble per block (low nibble
    /// first); `data` is the literal byte stream. When `advance` is set the
    /// buffer pair is swapped before decoding, so temporal codes reference
    /// what was current a frame ago.
    pub fn decode_frame(&mut self, map: &[u8], data: &[u8], advance: bool) -> Result<()> {
        ensure!(self.is_configured(), "video buffers not allocated");
        let total = self.width_blocks * self.height_blocks;
        ensure!(
            map.len() * 2 >= total,
            "decoding map too short: {} nibbles for {} blocks",
            map.len() * 2,
            total
        );

        if advance {
            std::mem::swap(&mut self.current, &mut self.previous);
        }

        let mut cursor = Cursor::new(data);
        let mut block = 0usize;
        while block < total {
            let nibble = map[block / 2] >> ((block % 2) * 4) & 0x0F;
            let (x, y) = self.block_origin(block);
            let skipped = self
                .decode_block(nibble, x, y, &mut cursor)
                .with_context(|| format!("block {block} (code {nibble:#x})"))?;
            block += 1 + skipped;
        }
        Ok(())
    }

    /// Decode a frame carried as literal pixels with no decoding map.
    pub fn decode_raw_frame(&mut self, data: &[u8], advance: bool) -> Result<()> {
        ensure!(self.is_configured(), "video buffers not allocated");
        let len = self.frame_len();
        ensure!(
            data.len() >= len,
            "raw frame carries {} of {} pixel bytes",
            data.len(),
            len
        );
        if advance {
            std::mem::swap(&mut self.current, &mut self.previous);
        }
        self.current[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    fn block_origin(&self, index: usize) -> (usize, usize) {
        (
            (index % self.width_blocks) * BLOCK_EDGE,
            (index / self.width_blocks) * BLOCK_EDGE,
        )
    }

    /// Apply one block code at cell (x, y). Returns how many extra cells the
    /// code consumed (nonzero only for the run-length skip).
    fn decode_block(&mut self, code: u8, x: usize, y: usize, cursor: &mut Cursor<'_>) -> Result<usize> {
        match code {
            0x0 => self.copy_from_previous(x, y, 0, 0)?,
            0x1 => {} // cell already correct
            0x2 => {
                let (dx, dy) = long_offset(cursor.read_byte()?);
                self.copy_within_current(x, y, dx, dy)?;
            }
            0x3 => {
                let (dx, dy) = long_offset(cursor.read_byte()?);
                self.copy_within_current(x, y, -dx, -dy)?;
            }
            0x4 => {
                let byte = cursor.read_byte()?;
                let dx = (byte & 0x0F) as isize - 8;
                let dy = (byte >> 4) as isize - 8;
                self.copy_from_previous(x, y, dx, dy)?;
            }
            0x5 => {
                let dx = cursor.read_byte()? as i8 as isize;
                let dy = cursor.read_byte()? as i8 as isize;
                self.copy_from_previous(x, y, dx, dy)?;
            }
            0x6 => {
                let byte = cursor.read_byte()?;
                return Ok((byte & 0x0F) as usize);
            }
            0x7 => self.pattern_two_color(x, y, cursor)?,
            0x8 => self.pattern_two_color_fine(x, y, cursor)?,
            0x9 => self.pattern_four_color(x, y, cursor)?,
            0xA => self.pattern_four_color_fine(x, y, cursor)?,
            0xB => {
                let raw = cursor.read_exact(BLOCK_PIXELS)?;
                for row in 0..BLOCK_EDGE {
                    let dst = self.row_mut(x, y + row)?;
                    dst.copy_from_slice(&raw[row * BLOCK_EDGE..(row + 1) * BLOCK_EDGE]);
                }
            }
            0xC => {
                let colors = cursor.read_exact(4)?;
                for quadrant in 0..4 {
                    let qx = x + (quadrant % 2) * 4;
                    let qy = y + (quadrant / 2) * 4;
                    self.fill_rect(qx, qy, 4, 4, colors[quadrant])?;
                }
            }
            0xD => {
                let colors = cursor.read_exact(2)?;
                self.fill_rect(x, y, BLOCK_EDGE, 4, colors[0])?;
                self.fill_rect(x, y + 4, BLOCK_EDGE, 4, colors[1])?;
            }
            0xE => {
                let color = cursor.read_byte()?;
                self.fill_rect(x, y, BLOCK_EDGE, BLOCK_EDGE, color)?;
            }
            0xF => {
                let colors = cursor.read_exact(2)?;
                for pair in 0..4 {
                    let color = colors[pair % 2];
                    self.fill_rect(x, y + pair * 2, BLOCK_EDGE, 2, color)?;
                }
            }
            other => bail!("block code {other:#x} out of range"),
        }
        Ok(0)
    }

    /// Code 7: one bit per pixel when the samples arrive in ascending
    /// order, one bit per 2x2 sub-block otherwise. The comparison is the
    /// encoder's convention for marking the variant; do not simplify it.
    fn pattern_two_color(&mut self, x: usize, y: usize, cursor: &mut Cursor<'_>) -> Result<()> {
        let samples = cursor.read_exact(2)?;
        let (p0, p1) = (samples[0], samples[1]);
        if p0 > p1 {
            let mask = cursor.read_exact(2)?;
            for sub in 0..16 {
                let bit = mask[sub / 8] >> (7 - sub % 8) & 1;
                let color = if bit == 1 { p1 } else { p0 };
                self.fill_rect(x + (sub % 4) * 2, y + (sub / 4) * 2, 2, 2, color)?;
            }
        } else {
            let mask = cursor.read_exact(BLOCK_EDGE)?;
            for row in 0..BLOCK_EDGE {
                let dst = self.row_mut(x, y + row)?;
                for col in 0..BLOCK_EDGE {
                    let bit = mask[row] >> (7 - col) & 1;
                    dst[col] = if bit == 1 { p1 } else { p0 };
                }
            }
        }
        Ok(())
    }

    /// Code 8: per-pixel two-color patterns at quadrant or half-block
    /// granularity; the second group's color pair picks the split axis.
    fn pattern_two_color_fine(&mut self, x: usize, y: usize, cursor: &mut Cursor<'_>) -> Result<()> {
        let head = cursor.read_exact(2)?;
        let (p0, p1) = (head[0], head[1]);
        if p0 <= p1 {
            // Four 4x4 quadrants, each with its own color pair and 16 bits.
            for quadrant in 0..4 {
                let (c0, c1) = if quadrant == 0 {
                    (p0, p1)
                } else {
                    let pair = cursor.read_exact(2)?;
                    (pair[0], pair[1])
                };
                let mask = cursor.read_exact(2)?;
                let qx = x + (quadrant % 2) * 4;
                let qy = y + (quadrant / 2) * 4;
                for i in 0..16 {
                    let bit = mask[i / 8] >> (7 - i % 8) & 1;
                    self.put_pixel(qx + i % 4, qy + i / 4, if bit == 1 { c1 } else { c0 })?;
                }
            }
        } else {
            let mask0: [u8; 4] = cursor.read_exact(4)?.try_into().unwrap();
            let pair = cursor.read_exact(2)?;
            let (c2, c3) = (pair[0], pair[1]);
            let mask1: [u8; 4] = cursor.read_exact(4)?.try_into().unwrap();
            let left_right = c2 <= c3;
            let groups = [(p0, p1, mask0), (c2, c3, mask1)];
            for (half, (c0, c1, mask)) in groups.iter().enumerate() {
                let (hx, hy, cols) = if left_right {
                    (x + half * 4, y, 4)
                } else {
                    (x, y + half * 4, 8)
                };
                for i in 0..32 {
                    let bit = mask[i / 8] >> (7 - i % 8) & 1;
                    self.put_pixel(hx + i % cols, hy + i / cols, if bit == 1 { *c1 } else { *c0 })?;
                }
            }
        }
        Ok(())
    }

    /// Code 9: four colors selected by 2-bit fields at pixel, 2x2, 2x1 or
    /// 1x2 granularity depending on the sample ordering.
    fn pattern_four_color(&mut self, x: usize, y: usize, cursor: &mut Cursor<'_>) -> Result<()> {
        let p: [u8; 4] = cursor.read_exact(4)?.try_into().unwrap();
        if p[0] <= p[1] && p[2] <= p[3] {
            let mask = cursor.read_exact(16)?;
            for i in 0..BLOCK_PIXELS {
                let idx = mask[i / 4] >> (6 - 2 * (i % 4)) & 3;
                self.put_pixel(x + i % 8, y + i / 8, p[idx as usize])?;
            }
        } else if p[0] <= p[1] {
            let mask = cursor.read_exact(4)?;
            for sub in 0..16 {
                let idx = mask[sub / 4] >> (6 - 2 * (sub % 4)) & 3;
                self.fill_rect(x + (sub % 4) * 2, y + (sub / 4) * 2, 2, 2, p[idx as usize])?;
            }
        } else if p[2] <= p[3] {
            let mask = cursor.read_exact(8)?;
            for sub in 0..32 {
                let idx = mask[sub / 4] >> (6 - 2 * (sub % 4)) & 3;
                self.fill_rect(x + (sub % 4) * 2, y + sub / 4, 2, 1, p[idx as usize])?;
            }
        } else {
            let mask = cursor.read_exact(8)?;
            for sub in 0..32 {
                let idx = mask[sub / 4] >> (6 - 2 * (sub % 4)) & 3;
                self.fill_rect(x + sub % 8, y + (sub / 8) * 2, 1, 2, p[idx as usize])?;
            }
        }
        Ok(())
    }

    /// Code 10: four-color patterns at quadrant or half-block granularity.
    fn pattern_four_color_fine(&mut self, x: usize, y: usize, cursor: &mut Cursor<'_>) -> Result<()> {
        let head: [u8; 4] = cursor.read_exact(4)?.try_into().unwrap();
        if head[0] <= head[1] {
            for quadrant in 0..4 {
                let colors: [u8; 4] = if quadrant == 0 {
                    head
                } else {
                    cursor.read_exact(4)?.try_into().unwrap()
                };
                let mask = cursor.read_exact(4)?;
                let qx = x + (quadrant % 2) * 4;
                let qy = y + (quadrant / 2) * 4;
                for i in 0..16 {
                    let idx = mask[i / 4] >> (6 - 2 * (i % 4)) & 3;
                    self.put_pixel(qx + i % 4, qy + i / 4, colors[idx as usize])?;
                }
            }
        } else {
            let mask0: [u8; 8] = cursor.read_exact(8)?.try_into().unwrap();
            let colors1: [u8; 4] = cursor.read_exact(4)?.try_into().unwrap();
            let mask1: [u8; 8] = cursor.read_exact(8)?.try_into().unwrap();
            let left_right = colors1[0] <= colors1[1];
            let groups = [(head, mask0), (colors1, mask1)];
            for (half, (colors, mask)) in groups.iter().enumerate() {
                let (hx, hy, cols) = if left_right {
                    (x + half * 4, y, 4)
                } else {
                    (x, y + half * 4, 8)
                };
                for i in 0..32 {
                    let idx = mask[i / 4] >> (6 - 2 * (i % 4)) & 3;
                    self.put_pixel(hx + i % cols, hy + i / cols, colors[idx as usize])?;
                }
            }
        }
        Ok(())
    }

    fn copy_from_previous(&mut self, x: usize, y: usize, dx: isize, dy: isize) -> Result<()> {
        let (sx, sy) = self.source_origin(x, y, dx, dy)?;
        for row in 0..BLOCK_EDGE {
            let src_start = (sy + row) * self.stride + sx;
            let dst_start = (y + row) * self.stride + x;
            let (src, dst) = (&self.previous, &mut self.current);
            dst[dst_start..dst_start + BLOCK_EDGE]
                .copy_from_slice(&src[src_start..src_start + BLOCK_EDGE]);
        }
        Ok(())
    }

    fn copy_within_current(&mut self, x: usize, y: usize, dx: isize, dy: isize) -> Result<()> {
        let (sx, sy) = self.source_origin(x, y, dx, dy)?;
        // Row-at-a-time staging keeps overlapping regions well defined.
        let mut staged = [[0u8; BLOCK_EDGE]; BLOCK_EDGE];
        for row in 0..BLOCK_EDGE {
            let src_start = (sy + row) * self.stride + sx;
            staged[row].copy_from_slice(&self.current[src_start..src_start + BLOCK_EDGE]);
        }
        for row in 0..BLOCK_EDGE {
            let dst_start = (y + row) * self.stride + x;
            self.current[dst_start..dst_start + BLOCK_EDGE].copy_from_slice(&staged[row]);
        }
        Ok(())
    }

    fn source_origin(&self, x: usize, y: usize, dx: isize, dy: isize) -> Result<(usize, usize)> {
        let sx = x as isize + dx;
        let sy = y as isize + dy;
        ensure!(
            sx >= 0
                && sy >= 0
                && sx as usize + BLOCK_EDGE <= self.stride
                && sy as usize + BLOCK_EDGE <= self.height,
            "motion source ({dx},{dy}) from cell ({x},{y}) leaves the frame"
        );
        Ok((sx as usize, sy as usize))
    }

    fn row_mut(&mut self, x: usize, y: usize) -> Result<&mut [u8]> {
        ensure!(
            x + BLOCK_EDGE <= self.stride && y < self.height,
            "row write at ({x},{y}) leaves the frame"
        );
        let start = y * self.stride + x;
        Ok(&mut self.current[start..start + BLOCK_EDGE])
    }

    fn put_pixel(&mut self, x: usize, y: usize, value: u8) -> Result<()> {
        ensure!(
            x < self.stride && y < self.height,
            "pixel write at ({x},{y}) leaves the frame"
        );
        self.current[y * self.stride + x] = value;
        Ok(())
    }

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, value: u8) -> Result<()> {
        ensure!(
            x + w <= self.stride && y + h <= self.height,
            "fill at ({x},{y}) size {w}x{h} leaves the frame"
        );
        for row in y..y + h {
            let start = row * self.stride + x;
            self.current[start..start + w].fill(value);
        }
        Ok(())
    }
}

impl Default for VideoBlockCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset table for codes 2 and 3, derived by formula instead of a literal
/// table: bytes below 56 map to a near-right band, the rest to a wider band
/// further down.
fn long_offset(byte: u8) -> (isize, isize) {
    let b = byte as isize;
    if b < 56 {
        (8 + b % 7, b / 7)
    } else {
        (-14 + (b - 56) % 29, 8 + (b - 56) / 29)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack one 4-bit code per block, low nibble first.
    fn pack_map(codes: &[u8]) -> Vec<u8> {
        let mut map = vec![0u8; codes.len().div_ceil(2)];
        for (i, code) in codes.iter().enumerate() {
            map[i / 2] |= (code & 0x0F) << ((i % 2) * 4);
        }
        map
    }

    fn single_block_codec() -> VideoBlockCodec {
        let mut codec = VideoBlockCodec::new();
        codec.configure(1, 1, false, None).unwrap();
        codec
    }

    fn decode_one(codec: &mut VideoBlockCodec, code: u8, data: &[u8], advance: bool) {
        codec.decode_frame(&pack_map(&[code]), data, advance).unwrap();
    }

    fn pixel(codec: &VideoBlockCodec, x: usize, y: usize) -> u8 {
        codec.current_frame()[y * codec.stride() + x]
    }

    #[test]
    fn code_11_raw_copy() {
        let mut codec = single_block_codec();
        let raw: Vec<u8> = (0u8..64).collect();
        decode_one(&mut codec, 0xB, &raw, false);
        assert_eq!(codec.current_frame(), raw.as_slice());
    }

    #[test]
    fn code_0_repaints_from_previous() {
        let mut codec = single_block_codec();
        let raw: Vec<u8> = (100u8..164).collect();
        decode_one(&mut codec, 0xB, &raw, false);
        // Advance swaps the pair; code 0 must repaint from what was current.
        decode_one(&mut codec, 0x0, &[], true);
        assert_eq!(codec.current_frame(), raw.as_slice());
    }

    #[test]
    fn code_1_leaves_cell_untouched() {
        let mut codec = single_block_codec();
        decode_one(&mut codec, 0xE, &[9], false);
        decode_one(&mut codec, 0x1, &[], false);
        assert!(codec.current_frame().iter().all(|&p| p == 9));
    }

    #[test]
    fn code_2_copies_within_current() {
        let mut codec = VideoBlockCodec::new();
        codec.configure(2, 1, false, None).unwrap();
        // Paint block 0 solid 7, block 1 solid 3.
        codec
            .decode_frame(&pack_map(&[0xE, 0xE]), &[7, 3], false)
            .unwrap();
        // Byte 0 encodes offset (8, 0): block 0 pulls from block 1.
        codec
            .decode_frame(&pack_map(&[0x2, 0x1]), &[0], false)
            .unwrap();
        assert_eq!(pixel(&codec, 0, 0), 3);
        assert_eq!(pixel(&codec, 8, 0), 3);
    }

    #[test]
    fn code_3_negates_the_offset() {
        let mut codec = VideoBlockCodec::new();
        codec.configure(2, 1, false, None).unwrap();
        codec
            .decode_frame(&pack_map(&[0xE, 0xE]), &[7, 3], false)
            .unwrap();
        // Block 1 pulls from (-8, 0), i.e. block 0.
        codec
            .decode_frame(&pack_map(&[0x1, 0x3]), &[0], false)
            .unwrap();
        assert_eq!(pixel(&codec, 8, 0), 7);
    }

    #[test]
    fn code_4_motion_from_previous() {
        let mut codec = VideoBlockCodec::new();
        codec.configure(2, 1, false, None).unwrap();
        codec
            .decode_frame(&pack_map(&[0xE, 0xE]), &[5, 6], false)
            .unwrap();
        // After the swap, pull block 1's old pixels into block 0:
        // dx = 8 is out of nibble range, so stage via dy = 0, dx = +7 is the
        // max; use code 5 for the exact copy instead and code 4 for (0,0).
        codec
            .decode_frame(&pack_map(&[0x4, 0x1]), &[0x88], false)
            .unwrap();
        // 0x88 decodes to dx = 0, dy = 0: same-position previous copy, but
        // nothing was advanced, so previous still holds zeros.
        assert_eq!(pixel(&codec, 0, 0), 0);
    }

    #[test]
    fn code_5_wide_motion_from_previous() {
        let mut codec = VideoBlockCodec::new();
        codec.configure(2, 1, false, None).unwrap();
        codec
            .decode_frame(&pack_map(&[0xE, 0xE]), &[5, 6], false)
            .unwrap();
        // Swap, then block 0 reads the old block 1 via (dx, dy) = (8, 0).
        codec
            .decode_frame(&pack_map(&[0x5, 0x1]), &[8, 0], true)
            .unwrap();
        assert_eq!(pixel(&codec, 0, 0), 6);
    }

    #[test]
    fn code_6_skips_following_cells() {
        let mut codec = VideoBlockCodec::new();
        codec.configure(3, 1, false, None).unwrap();
        codec
            .decode_frame(&pack_map(&[0xE, 0xE, 0xE]), &[1, 2, 3], false)
            .unwrap();
        // Skip cell 0's repaint and one follower; cell 2 repaints to 9.
        codec
            .decode_frame(&pack_map(&[0x6, 0x0, 0xE]), &[0x01, 9], false)
            .unwrap();
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 8, 0), 2);
        assert_eq!(pixel(&codec, 16, 0), 9);
    }

    #[test]
    fn code_7_per_pixel_variant() {
        let mut codec = single_block_codec();
        // p0 <= p1 selects the 8-byte per-pixel mask; rows alternate all-0
        // and all-1 bits.
        let mut data = vec![10, 20];
        data.extend_from_slice(&[0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF]);
        decode_one(&mut codec, 0x7, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 10);
        assert_eq!(pixel(&codec, 0, 1), 20);
        assert_eq!(pixel(&codec, 7, 7), 20);
    }

    #[test]
    fn code_7_subblock_variant() {
        let mut codec = single_block_codec();
        // p0 > p1 selects the 2-byte 2x2-sub-block mask. MSB of the first
        // byte covers the top-left sub-block.
        decode_one(&mut codec, 0x7, &[20, 10, 0x80, 0x00], false);
        assert_eq!(pixel(&codec, 0, 0), 10);
        assert_eq!(pixel(&codec, 1, 1), 10);
        assert_eq!(pixel(&codec, 2, 0), 20);
        assert_eq!(pixel(&codec, 7, 7), 20);
    }

    #[test]
    fn code_8_quadrant_variant() {
        let mut codec = single_block_codec();
        // Ascending head pair: four quadrant groups of 2 colors + 2 bytes.
        let data = [
            1, 2, 0x00, 0x00, // TL all color 1
            3, 4, 0xFF, 0xFF, // TR all color 4
            5, 6, 0x00, 0x00, // BL all color 5
            7, 8, 0xFF, 0xFF, // BR all color 8
        ];
        decode_one(&mut codec, 0x8, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 4, 0), 4);
        assert_eq!(pixel(&codec, 0, 4), 5);
        assert_eq!(pixel(&codec, 7, 7), 8);
    }

    #[test]
    fn code_8_half_variant_left_right() {
        let mut codec = single_block_codec();
        // Descending head pair selects halves; ascending second pair keeps
        // the split vertical (left/right).
        let data = [
            9, 1, 0x00, 0x00, 0x00, 0x00, // left half all 9
            2, 8, 0xFF, 0xFF, 0xFF, 0xFF, // right half all 8
        ];
        decode_one(&mut codec, 0x8, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 9);
        assert_eq!(pixel(&codec, 3, 7), 9);
        assert_eq!(pixel(&codec, 4, 0), 8);
        assert_eq!(pixel(&codec, 7, 7), 8);
    }

    #[test]
    fn code_8_half_variant_top_bottom() {
        let mut codec = single_block_codec();
        // Both pairs descending: horizontal split (top/bottom).
        let data = [
            9, 1, 0x00, 0x00, 0x00, 0x00, // top half all 9
            8, 2, 0xFF, 0xFF, 0xFF, 0xFF, // bottom half all 2
        ];
        decode_one(&mut codec, 0x8, &data, false);
        assert_eq!(pixel(&codec, 7, 3), 9);
        assert_eq!(pixel(&codec, 0, 4), 2);
    }

    #[test]
    fn code_9_per_pixel_variant() {
        let mut codec = single_block_codec();
        let mut data = vec![1, 2, 3, 4];
        // 2 bits per pixel, MSB first: 0b00_01_10_11 picks colors 1,2,3,4.
        data.extend_from_slice(&[0x1B; 16]);
        decode_one(&mut codec, 0x9, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 1, 0), 2);
        assert_eq!(pixel(&codec, 2, 0), 3);
        assert_eq!(pixel(&codec, 3, 0), 4);
    }

    #[test]
    fn code_9_subblock_variant() {
        let mut codec = single_block_codec();
        // p0 <= p1, p2 > p3: 2 bits per 2x2 sub-block, 4 mask bytes.
        let data = [1, 2, 9, 3, 0x1B, 0x1B, 0x1B, 0x1B];
        decode_one(&mut codec, 0x9, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 2, 1), 2);
        assert_eq!(pixel(&codec, 4, 0), 9);
        assert_eq!(pixel(&codec, 6, 1), 3);
    }

    #[test]
    fn code_9_wide_and_tall_variants() {
        // p0 > p1, p2 <= p3: 2x1 cells.
        let mut codec = single_block_codec();
        let data = [2, 1, 3, 4, 0x1B, 0x1B, 0x1B, 0x1B, 0, 0, 0, 0];
        decode_one(&mut codec, 0x9, &data[..12], false);
        assert_eq!(pixel(&codec, 0, 0), 2);
        assert_eq!(pixel(&codec, 1, 0), 2);
        assert_eq!(pixel(&codec, 2, 0), 1);

        // Both descending: 1x2 cells.
        let mut codec = single_block_codec();
        let data = [2, 1, 4, 3, 0x1B, 0x1B, 0x1B, 0x1B, 0x1B, 0x1B, 0x1B, 0x1B];
        decode_one(&mut codec, 0x9, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 2);
        assert_eq!(pixel(&codec, 0, 1), 2);
        assert_eq!(pixel(&codec, 1, 0), 1);
    }

    #[test]
    fn code_10_quadrant_variant() {
        let mut codec = single_block_codec();
        let mut data = vec![1, 2, 3, 4];
        data.extend_from_slice(&[0x00; 4]); // TL all color 1
        for base in [10u8, 20, 30] {
            data.extend_from_slice(&[base, base + 1, base + 2, base + 3]);
            data.extend_from_slice(&[0xFF; 4]); // all color base+3
        }
        decode_one(&mut codec, 0xA, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 4, 0), 13);
        assert_eq!(pixel(&codec, 0, 4), 23);
        assert_eq!(pixel(&codec, 4, 4), 33);
    }

    #[test]
    fn code_10_half_variant() {
        let mut codec = single_block_codec();
        let mut data = vec![5, 1, 2, 3]; // descending head: halves
        data.extend_from_slice(&[0x00; 8]); // first half all color 5
        data.extend_from_slice(&[6, 7, 8, 9]); // ascending: left/right split
        data.extend_from_slice(&[0xFF; 8]); // second half all color 9
        decode_one(&mut codec, 0xA, &data, false);
        assert_eq!(pixel(&codec, 0, 0), 5);
        assert_eq!(pixel(&codec, 3, 7), 5);
        assert_eq!(pixel(&codec, 4, 0), 9);
    }

    #[test]
    fn code_12_quadrant_fill() {
        let mut codec = single_block_codec();
        decode_one(&mut codec, 0xC, &[1, 2, 3, 4], false);
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 4, 0), 2);
        assert_eq!(pixel(&codec, 0, 4), 3);
        assert_eq!(pixel(&codec, 4, 4), 4);
    }

    #[test]
    fn code_13_band_fill() {
        let mut codec = single_block_codec();
        decode_one(&mut codec, 0xD, &[11, 22], false);
        assert_eq!(pixel(&codec, 0, 0), 11);
        assert_eq!(pixel(&codec, 7, 3), 11);
        assert_eq!(pixel(&codec, 0, 4), 22);
        assert_eq!(pixel(&codec, 7, 7), 22);
    }

    #[test]
    fn code_14_solid_fill() {
        let mut codec = single_block_codec();
        decode_one(&mut codec, 0xE, &[42], false);
        assert!(codec.current_frame().iter().all(|&p| p == 42));
    }

    #[test]
    fn code_15_alternating_row_pairs() {
        let mut codec = single_block_codec();
        decode_one(&mut codec, 0xF, &[1, 2], false);
        assert_eq!(pixel(&codec, 0, 0), 1);
        assert_eq!(pixel(&codec, 0, 1), 1);
        assert_eq!(pixel(&codec, 0, 2), 2);
        assert_eq!(pixel(&codec, 0, 3), 2);
        assert_eq!(pixel(&codec, 0, 4), 1);
        assert_eq!(pixel(&codec, 0, 6), 2);
    }

    #[test]
    fn swap_invariant_two_frame_sequence() {
        let mut codec = single_block_codec();
        let frame_a: Vec<u8> = (0u8..64).collect();
        decode_one(&mut codec, 0xB, &frame_a, false);
        // Second frame advances, then references "previous": it must see
        // exactly what current held before the swap.
        decode_one(&mut codec, 0x0, &[], true);
        assert_eq!(codec.current_frame(), frame_a.as_slice());
        assert_eq!(codec.previous_frame(), frame_a.as_slice());
    }

    #[test]
    fn raw_frame_replaces_every_pixel() {
        let mut codec = single_block_codec();
        decode_one(&mut codec, 0xE, &[7], false);
        let frame: Vec<u8> = (0u8..64).rev().collect();
        codec.decode_raw_frame(&frame, true).unwrap();
        assert_eq!(codec.current_frame(), frame.as_slice());
        // The swap preserved the previous frame for temporal codes.
        assert!(codec.previous_frame().iter().all(|&p| p == 7));
        codec.decode_raw_frame(&[0u8; 10], false).unwrap_err();
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut codec = single_block_codec();
        let err = codec.decode_frame(&pack_map(&[0xB]), &[0u8; 10], false);
        assert!(err.is_err());
    }

    #[test]
    fn motion_outside_frame_is_an_error() {
        let mut codec = single_block_codec();
        // dx = +7 from a 1x1-block frame always leaves the surface.
        let err = codec.decode_frame(&pack_map(&[0x4]), &[0xFF], false);
        assert!(err.is_err());
    }

    #[test]
    fn geometry_must_fit_surface() {
        let mut codec = VideoBlockCodec::new();
        assert!(codec.configure(10, 10, false, Some((64, 64))).is_err());
        assert!(codec.configure(8, 8, false, Some((64, 64))).is_ok());
    }
}
