//! Presentation seam between the interpreter and whatever displays frames.

use anyhow::Result;
use mve_formats::PaletteTable;

/// Borrowed view of a decoded frame, valid for the duration of one
/// `present_frame` call. Pixels are palette indices; hicolor hosts resolve
/// them through the palette's 1555 table. `palette_start`/`palette_count`
/// are the entry range the show-frame chunk asked to (re)install.
pub struct FrameView<'a> {
    pub pixels: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub hicolor: bool,
    pub palette: &'a PaletteTable,
    pub palette_start: usize,
    pub palette_count: usize,
}

pub trait PlaybackHost {
    fn present_frame(&mut self, frame: FrameView<'_>) -> Result<()>;

    /// Polled between chunks; returning true ends playback cleanly.
    fn poll_abort(&mut self) -> bool {
        false
    }
}

/// Host that records what was presented without displaying anything. Used
/// by the headless player and the playback tests.
#[derive(Debug, Default)]
pub struct CountingHost {
    pub frames: u64,
    pub abort_after: Option<u64>,
    pub last_frame: Vec<u8>,
    pub last_size: (usize, usize),
    pub last_palette_range: (usize, usize),
}

impl PlaybackHost for CountingHost {
    fn present_frame(&mut self, frame: FrameView<'_>) -> Result<()> {
        self.frames += 1;
        self.last_size = (frame.width, frame.height);
        self.last_palette_range = (frame.palette_start, frame.palette_count);
        self.last_frame.clear();
        self.last_frame.extend_from_slice(frame.pixels);
        Ok(())
    }

    fn poll_abort(&mut self) -> bool {
        self.abort_after.is_some_and(|limit| self.frames >= limit)
    }
}
