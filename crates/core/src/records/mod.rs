//! Domain records synchronized across devices.
//!
//! Every record carries the sync envelope (`version`, `device_id`,
//! `sync_status`, `deleted`, `created_at`, `updated_at`) maintained by the
//! storage layer on each mutation.

mod category;
mod entry;
mod goal;

pub use category::*;
pub use entry::*;
pub use goal::*;
