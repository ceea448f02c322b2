//! Data passed between the pipeline stages and handed back to the caller

pub mod types;

pub use types::{
    Chunk, LineResults, ProductionArtifact, SegmentReport, SegmentStatus, SynthesisOutcome,
    SynthesisResult,
};
