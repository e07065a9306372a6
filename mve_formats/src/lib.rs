pub mod audio;
pub mod chunk;
pub mod palette;
pub mod video;

pub use audio::{AudioDecoder, AudioParams, AudioRing, delta_expansion_table};
pub use chunk::{Chunk, ChunkOpcode, ChunkWalker, RecordHeader, RecordKind, StreamHeader};
pub use palette::{PALETTE_ENTRIES, PaletteTable};
pub use video::{BLOCK_EDGE, VideoBlockCodec};
