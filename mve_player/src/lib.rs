//! Interplay MVE playback engine: a pull-driven interpreter over the
//! record/chunk stream, backed by the codecs in `mve_formats`.

pub mod clock;
pub mod host;
pub mod pool;
pub mod session;

pub use clock::{ClockEngine, SpeedMode};
pub use host::{CountingHost, FrameView, PlaybackHost};
pub use pool::{MemoryPool, PoolLane};
pub use session::{FaultCode, PlaybackFault, Session, StepOutcome};
