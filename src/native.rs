//! In-process engine cores.
//!
//! The real search and evaluation of each backend is outside this crate. What
//! lives here is the minimum a backend needs to hold up its end of the UCI
//! conversation: identification, options, a position, and a one-ply move
//! choice, on top of process-wide tables that are built exactly once.

mod profile;
mod tables;
mod uci_core;

pub use profile::{ARASAN, LC0, OptionKind, Profile, STOCKFISH, UciOption};
pub use tables::{Tables, build_count, tables};
pub use uci_core::{CoreError, Flow, UciCore};
