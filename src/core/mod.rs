// Domain modules
pub mod graph;
pub mod heal;
pub mod manager;
pub mod relationship;
pub mod scan;
pub mod update;

pub mod error;

// Public modules for CLI access
pub mod defaults;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use graph::{IntegrityReport, RelationshipGraph};
pub use manager::Manager;
pub use relationship::{Relationship, RelationshipType};
pub use update::{MoveRequest, UpdatePlan};
