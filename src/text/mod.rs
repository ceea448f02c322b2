//! Text preparation for the TTS backend

pub mod chunker;

pub use chunker::{chunk_line, chunk_text, chunk_text_with, word_count, ChunkLimits};
