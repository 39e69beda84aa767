pub mod model;
pub mod repository;

pub use model::CategoryDB;
pub use repository::CategoryRepository;
