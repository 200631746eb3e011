//! Checkpoint store implementations.

pub mod csv;
pub mod dry_run;
pub mod memory;

pub use self::csv::{read_seeds, CsvCheckpointStore, SeedImport};
pub use dry_run::DryRunStore;
pub use memory::MemoryStore;
