//! Data types shared across the crawler.

pub mod config;
pub mod manifest;
pub mod project;
pub mod session;
pub mod task;
