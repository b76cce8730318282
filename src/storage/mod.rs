//! Storage for completed exports.
//!
//! Nothing survives a run except the files in the output directory, which
//! are also the sole input when a later run resumes.

pub mod local;

// Re-export for convenience
pub use local::{OutputDirectory, is_partial};
