//! Grow-only staging buffers shared across the interpreter.
//!
//! One lane stages the record currently being walked, the other holds the
//! active decoding map, which has to outlive the record that carried it.
//! Lanes keep their capacity across reuse so steady-state playback stops
//! allocating after the largest record has been seen. The audio subsystem's
//! pooled allocation is the PCM ring owned by the decoder, not a lane here.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLane {
    Record,
    DecodingMap,
}

#[derive(Debug, Default)]
pub struct MemoryPool {
    record: Vec<u8>,
    map: Vec<u8>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lane(&self, lane: PoolLane) -> &[u8] {
        match lane {
            PoolLane::Record => &self.record,
            PoolLane::DecodingMap => &self.map,
        }
    }

    pub fn lane_mut(&mut self, lane: PoolLane) -> &mut Vec<u8> {
        match lane {
            PoolLane::Record => &mut self.record,
            PoolLane::DecodingMap => &mut self.map,
        }
    }

    /// Copy a slice of the staged record into the decoding-map lane, so the
    /// map survives the record buffer being refilled.
    pub fn stage_map_from_record(&mut self, range: Range<usize>) {
        let (record, map) = (&self.record, &mut self.map);
        map.clear();
        map.extend_from_slice(&record[range]);
    }

    #[cfg(test)]
    fn lane_capacity(&self, lane: PoolLane) -> usize {
        match lane {
            PoolLane::Record => self.record.capacity(),
            PoolLane::DecodingMap => self.map.capacity(),
        }
    }

    /// Drop the backing allocations. Used on teardown only.
    pub fn shrink(&mut self) {
        self.record = Vec::new();
        self.map = Vec::new();
    }
}
