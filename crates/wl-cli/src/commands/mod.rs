//! CLI subcommand implementations.

pub mod sources;
pub mod sync;
pub mod table;
