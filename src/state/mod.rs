//! Run-scoped pipeline state and its process-wide manager.

mod manager;
mod pipeline;

pub use manager::StateManager;
pub use pipeline::PipelineState;
