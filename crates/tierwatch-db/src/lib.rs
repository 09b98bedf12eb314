pub mod character_repository;
pub mod config;
pub mod database;
pub mod job_repository;

pub use character_repository::CharacterRepository;
pub use config::DatabaseConfig;
pub use database::Database;
pub use job_repository::ScoringJobRepository;
