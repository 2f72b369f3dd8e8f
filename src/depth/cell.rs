//! Single-word published depth reading.
//!
//! The consumer loop is the only writer; any thread may poll. Depth and
//! availability are packed into one `AtomicU64` so a reader never sees a
//! depth from one tick paired with the flag from another.

use std::sync::atomic::{AtomicU64, Ordering};

/// `(depth, has_depth)` pair exposed to collaborators
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DepthReading {
    pub depth: f32,
    pub has_depth: bool,
}

impl DepthReading {
    pub fn new(depth: f32, has_depth: bool) -> Self {
        Self { depth, has_depth }
    }

    /// The reading if it is currently available
    pub fn available(self) -> Option<Self> {
        self.has_depth.then_some(self)
    }

    fn pack(self) -> u64 {
        (u64::from(self.depth.to_bits()) << 32) | u64::from(self.has_depth)
    }

    fn unpack(word: u64) -> Self {
        Self {
            depth: f32::from_bits((word >> 32) as u32),
            has_depth: word & 1 == 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct DepthCell {
    word: AtomicU64,
}

impl DepthCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, reading: DepthReading) {
        self.word.store(reading.pack(), Ordering::Release);
    }

    pub fn load(&self) -> DepthReading {
        DepthReading::unpack(self.word.load(Ordering::Acquire))
    }
}
