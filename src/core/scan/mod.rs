//! Reference discovery: walk the tree, extract references line by line, resolve
//! each against the filesystem.

mod cancel;
pub mod matchers;
mod resolve;
mod scanner;
pub mod walker;

pub use cancel::CancellationToken;
pub use matchers::{Candidate, RelationshipMatcher, MATCHERS};
pub use resolve::{resolve, Resolution};
pub use scanner::{extract_file, scan, score_confidence, split_lines, ScanIssue, ScanOutcome};
