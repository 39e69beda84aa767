pub mod model;
pub mod repository;

pub use model::GoalDB;
pub use repository::GoalRepository;
