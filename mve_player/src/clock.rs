//! Virtual playback clock.
//!
//! The clock only does microsecond arithmetic; the session owns the real
//! sleep. That keeps the drop/present policy testable against simulated
//! elapsed times.

use anyhow::{Result, ensure};

/// Playback speed requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeedMode {
    #[default]
    Normal,
    /// Decode as fast as possible; ahead-of-schedule waits are skipped.
    Fast,
}

/// Tracks the per-frame deadline and the one-owed-frame drop policy.
#[derive(Debug)]
pub struct ClockEngine {
    period_us: u64,
    next_due_us: u64,
    armed: bool,
    drop_owed: bool,
    frames_dropped: u64,
}

impl ClockEngine {
    /// `rate_us` and `divider` come straight from the create-timer chunk;
    /// the frame period is their product in microseconds.
    pub fn new(rate_us: u32, divider: u16) -> Result<Self> {
        let period_us = u64::from(rate_us) * u64::from(divider);
        ensure!(period_us > 0, "timer period of zero ({rate_us} x {divider})");
        Ok(Self {
            period_us,
            next_due_us: 0,
            armed: false,
            drop_owed: false,
            frames_dropped: 0,
        })
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Signed distance from the next deadline: negative means ahead of
    /// schedule, positive means late. The first call arms the clock at
    /// `now_us` so the first frame is always on time.
    pub fn wait_level(&mut self, now_us: u64) -> i64 {
        if !self.armed {
            self.armed = true;
            self.next_due_us = now_us;
        }
        now_us as i64 - self.next_due_us as i64
    }

    /// Whether the caller is more than a full frame behind schedule.
    pub fn is_late(&self, now_us: u64) -> bool {
        self.armed && now_us > self.next_due_us + self.period_us
    }

    /// A drop may only be recorded when none is owed; once recorded, the
    /// owed flag forces the next frame through even if it is also late.
    pub fn drop_owed(&self) -> bool {
        self.drop_owed
    }

    pub fn mark_frame_dropped(&mut self) {
        self.drop_owed = true;
        self.frames_dropped += 1;
    }

    pub fn mark_frame_presented(&mut self) {
        self.drop_owed = false;
    }

    /// Move the deadline one frame forward.
    pub fn advance(&mut self) {
        self.next_due_us += self.period_us;
    }

    /// Shift every future deadline, used when playback is held.
    pub fn defer(&mut self, held_us: u64) {
        self.next_due_us += held_us;
    }
}
