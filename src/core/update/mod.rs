//! Move planning and transactional execution.

pub mod executor;
pub mod plan;

pub use executor::{execute, DiskOps, ExecutionSummary, FileOps};
pub use plan::{plan, render_reference, MoveRequest, Operation, PlanWarning, PlannedEdit, UpdatePlan};
