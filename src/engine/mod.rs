//! Execution engine for stackplan
//!
//! The CLI side of a run:
//! 1. Displaying - Render the changeset
//! 2. Executing - Drive stackgraph's executor with progress and confirmation

pub mod differ;
pub mod executor;

pub use differ::display_changeset;
pub use executor::{ExecuteOptions, confirm_proceed, execute, print_summary};
