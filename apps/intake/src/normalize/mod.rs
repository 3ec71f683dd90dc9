// Normalization engine: turns the parser's nested JSON into a flat, confidence-annotated
// record set. Pure and schema-less; no I/O in this module.

pub mod classify;
pub mod engine;
pub mod record;

pub use engine::normalize_document;
pub use record::{AnnotatedField, RecordSet};
