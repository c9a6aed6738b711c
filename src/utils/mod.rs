//! Generic utility primitives with zero domain knowledge.
//!
//! - `io` - File I/O with consistent error handling
//! - `path` - Lexical path normalization and relative path rendering

pub mod io;
pub mod path;
