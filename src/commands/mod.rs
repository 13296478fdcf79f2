pub mod apply;
pub mod graph;
pub mod plan;
pub mod state;
pub mod validate;
