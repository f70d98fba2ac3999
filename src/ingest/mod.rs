//! Ingest normalisation, multiline reassembly, and source routing (spec §4.1, §4.2).

pub mod multiline;
pub mod normalize;
pub mod pipeline;
pub mod router;

pub use pipeline::{IngestOutcome, IngestPipeline};
pub use router::{RouterSnapshot, SourceRouter};
