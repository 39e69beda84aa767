//! Daybook core: domain records and the multi-device sync engine.
//!
//! The engine in [`sync`] reconciles independently-mutated local datasets
//! across devices through a shared blob store, using an append-only operation
//! log, last-write-wins conflict resolution, and soft-delete propagation.
//! Storage and transport are behind traits so the engine stays independent of
//! Diesel and HTTP concerns.

pub mod errors;
pub mod records;
pub mod sync;

pub use errors::{Error, Result};
