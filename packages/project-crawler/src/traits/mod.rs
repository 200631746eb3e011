//! Trait seams between the orchestrator and its collaborators.

pub mod fetcher;
pub mod renderer;
pub mod store;
