//! Progressive structured output from streaming model responses.

pub mod extractor;
pub mod frames;

pub use extractor::{ExtractorEvent, ObjectExtractor, extract_objects};
pub use frames::FALLBACK_KEY;
