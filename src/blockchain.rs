// Thin re-export module: implementation is in `blockchain/core.rs`, split
// into block, validation, state and chain submodules.

pub mod core;
pub use core::*;
