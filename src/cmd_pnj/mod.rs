//! Subcommand modules for the `pnj` binary.

pub mod nj;
pub mod reconcile;
pub mod resolve;
