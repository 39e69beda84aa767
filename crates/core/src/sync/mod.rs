//! Multi-device sync: wire models, merge logic, engine orchestration.

mod engine;
mod guard;
mod memory;
mod merge;
mod model;
mod scheduler;
mod store;
mod transport;

pub use engine::*;
pub use guard::*;
pub use memory::*;
pub use merge::*;
pub use model::*;
pub use scheduler::*;
pub use store::*;
pub use transport::*;
