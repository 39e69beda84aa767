pub mod model;
pub mod repository;

pub use model::EntryDB;
pub use repository::EntryRepository;
